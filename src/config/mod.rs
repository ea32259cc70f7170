//! Configuration management for the roulette engine
//!
//! This module handles loading and validating configuration from TOML files
//! and environment variables. The resulting [`Config`] is built once at
//! startup and passed explicitly to the engine and providers.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::history::HistoryConfig;
use crate::provider::http::HttpConfig;
use crate::resilience::breaker::BreakerConfig;
use crate::selector::SelectionStrategy;
use crate::utils::retry::RetryConfig;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`Config`]
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range or inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Spin orchestration settings
    pub engine: EngineConfig,

    /// Retry behavior for transient provider failures
    pub retry: RetryConfig,

    /// Circuit breaker thresholds and cooldowns
    pub breaker: BreakerConfig,

    /// Result cache sizing and TTL
    pub cache: CacheConfig,

    /// Seen-history window used to build exclusion sets
    pub history: HistoryConfig,

    /// Shared HTTP client settings for web-backed providers
    pub http: HttpConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Configured providers, in registration order
    pub providers: Vec<ProviderConfig>,
}

/// Spin orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overall deadline for one spin, across all providers
    pub request_timeout_ms: u64,

    /// Deadline for a single provider call attempt
    pub provider_timeout_ms: u64,

    /// Count used when a request asks for zero items
    pub default_count: usize,

    /// Upper bound on items per spin
    pub max_count: usize,

    /// Minimum number of items asked from a provider; surplus fills the cache
    pub prefetch: usize,

    /// Number of candidates fetched concurrently (1 = sequential)
    pub fan_out: usize,

    /// Candidate ordering strategy
    pub strategy: SelectionStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            provider_timeout_ms: 3_000,
            default_count: 1,
            max_count: 10,
            prefetch: 10,
            fan_out: 1,
            strategy: SelectionStrategy::Ordered,
        }
    }
}

impl EngineConfig {
    /// Get the overall spin deadline as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Get the per-call provider deadline as Duration
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directives for this crate's targets; `verbose` forces debug
    pub fn filter_directives(&self, verbose: bool) -> String {
        let (level, fallback) = if verbose {
            ("debug", "info")
        } else {
            (self.level.as_str(), "warn")
        };
        format!("media_roulette={level},roulette={level},{fallback}")
    }
}

/// Kind of provider backing a `[[providers]]` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Lorem Picsum photo list API
    Picsum,
    /// Reddit subreddit listings
    Reddit,
    /// Booru image boards (HTML scrape)
    Booru,
    /// Static word list feeding queries to another provider
    Corpus,
}

/// One `[[providers]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider id
    pub id: String,

    /// Which implementation to build
    pub kind: ProviderKind,

    /// Static selection weight (higher is preferred)
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Whether the provider starts enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Override the implementation's query capability
    #[serde(default)]
    pub supports_query: Option<bool>,

    /// Override the implementation's pagination capability
    #[serde(default)]
    pub supports_pagination: Option<bool>,

    /// Override the upstream base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Allow NSFW items
    #[serde(default)]
    pub allow_nsfw: bool,

    /// Listing sort (reddit: hot, new, top)
    #[serde(default)]
    pub sort: Option<String>,

    /// Page range to draw from (picsum)
    #[serde(default)]
    pub pages: Option<u32>,

    /// Default subreddits when no query is given (reddit)
    #[serde(default)]
    pub subreddits: Vec<String>,

    /// Board ids to restrict to (booru)
    #[serde(default)]
    pub boards: Vec<String>,

    /// Inline corpus entries (corpus)
    #[serde(default)]
    pub words: Vec<String>,

    /// Newline-delimited corpus file (corpus)
    #[serde(default)]
    pub corpus_file: Option<PathBuf>,

    /// Provider id that receives corpus-built queries (corpus)
    #[serde(default)]
    pub inner: Option<String>,
}

fn default_weight() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    /// Minimal entry with defaults for everything but id and kind
    pub fn new(id: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            kind,
            weight: default_weight(),
            enabled: true,
            supports_query: None,
            supports_pagination: None,
            base_url: None,
            allow_nsfw: false,
            sort: None,
            pages: None,
            subreddits: Vec::new(),
            boards: Vec::new(),
            words: Vec::new(),
            corpus_file: None,
            inner: None,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

impl Config {
    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override selected values from `ROULETTE_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        fn env<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
        }

        if let Some(v) = env("ROULETTE_REQUEST_TIMEOUT_MS") {
            self.engine.request_timeout_ms = v;
        }
        if let Some(v) = env("ROULETTE_PROVIDER_TIMEOUT_MS") {
            self.engine.provider_timeout_ms = v;
        }
        if let Some(v) = env("ROULETTE_FAN_OUT") {
            self.engine.fan_out = v;
        }
        if let Some(v) = env("ROULETTE_MAX_RETRIES") {
            self.retry.max_retries = v;
        }
        if let Some(v) = env("ROULETTE_BREAKER_THRESHOLD") {
            self.breaker.failure_threshold = v;
        }
        if let Some(v) = env("ROULETTE_BREAKER_COOLDOWN_MS") {
            self.breaker.cooldown_ms = v;
        }
        if let Some(v) = env("ROULETTE_CACHE_TTL_SECS") {
            self.cache.ttl_secs = v;
        }
        if let Some(v) = env("ROULETTE_CACHE_CAPACITY") {
            self.cache.capacity = v;
        }
        if let Ok(v) = std::env::var("ROULETTE_USER_AGENT") {
            self.http.user_agent = Some(v);
        }
        if let Ok(v) = std::env::var("ROULETTE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("ROULETTE_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.engine.request_timeout_ms == 0 || self.engine.provider_timeout_ms == 0 {
            return invalid("engine timeouts must be greater than 0".into());
        }
        if self.engine.max_count == 0 {
            return invalid("engine.max_count must be greater than 0".into());
        }
        if self.engine.default_count == 0 || self.engine.default_count > self.engine.max_count {
            return invalid("engine.default_count must be between 1 and max_count".into());
        }
        if self.engine.fan_out == 0 {
            return invalid("engine.fan_out must be at least 1".into());
        }
        let worst_call = self.retry.worst_case(self.engine.provider_timeout());
        if worst_call >= self.engine.request_timeout() {
            return invalid(format!(
                "one provider with retries can take {}ms, which does not fit in \
                 engine.request_timeout_ms = {}",
                worst_call.as_millis(),
                self.engine.request_timeout_ms
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return invalid("retry.backoff_multiplier must be >= 1.0".into());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return invalid("retry.jitter must be within 0.0..=1.0".into());
        }
        if self.breaker.failure_threshold == 0 {
            return invalid("breaker.failure_threshold must be greater than 0".into());
        }
        if self.breaker.cooldown_ms == 0 || self.breaker.max_cooldown_ms < self.breaker.cooldown_ms
        {
            return invalid("breaker cooldowns must satisfy 0 < cooldown_ms <= max_cooldown_ms".into());
        }
        if self.breaker.cooldown_multiplier < 1.0 {
            return invalid("breaker.cooldown_multiplier must be >= 1.0".into());
        }
        if self.cache.capacity == 0 {
            return invalid("cache.capacity must be greater than 0".into());
        }
        if self.history.window_size == 0 {
            return invalid("history.window_size must be greater than 0".into());
        }
        if self.http.requests_per_second == 0 {
            return invalid("http.requests_per_second must be greater than 0".into());
        }

        let mut ids = HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return invalid("provider id must not be empty".into());
            }
            if !ids.insert(provider.id.as_str()) {
                return invalid(format!("duplicate provider id '{}'", provider.id));
            }
        }

        for provider in self.providers.iter().filter(|p| p.kind == ProviderKind::Corpus) {
            let Some(inner) = provider.inner.as_deref() else {
                return invalid(format!("corpus provider '{}' needs an inner provider", provider.id));
            };
            match self.providers.iter().find(|p| p.id == inner) {
                None => {
                    return invalid(format!(
                        "corpus provider '{}' references unknown provider '{inner}'",
                        provider.id
                    ))
                }
                Some(target) if target.kind == ProviderKind::Corpus => {
                    return invalid(format!(
                        "corpus provider '{}' cannot wrap another corpus provider",
                        provider.id
                    ))
                }
                Some(_) => {}
            }
            if provider.words.is_empty() && provider.corpus_file.is_none() {
                return invalid(format!(
                    "corpus provider '{}' needs words or a corpus_file",
                    provider.id
                ));
            }
        }

        Ok(())
    }
}
