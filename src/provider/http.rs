//! Shared HTTP fetcher for web-backed providers
//!
//! One client and one rate limiter are shared by every API-backed and
//! scrape-backed provider. Features:
//! - User-Agent rotation (or a fixed configured agent)
//! - Rate limiting with governor
//! - Status classification into [`FetchError`]
//!
//! Retrying is not done here; the resilience wrapper owns retries so
//! that every attempt is visible to the circuit breaker accounting.

use crate::utils::error::FetchError;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT},
    Client,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Accept header for JSON APIs
pub const ACCEPT_JSON: &str = "application/json";

/// Accept header for HTML pages
pub const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Fixed User-Agent; rotates through a built-in pool when unset
    pub user_agent: Option<String>,

    /// Transport-level timeout in milliseconds
    pub timeout_ms: u64,

    /// Maximum requests per second across all web-backed providers
    pub requests_per_second: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_ms: 8_000,
            requests_per_second: 5,
        }
    }
}

/// Rate-limited HTTP fetcher
pub struct HttpFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Fixed user agent, if configured
    user_agent: Option<HeaderValue>,
}

impl HttpFetcher {
    /// Create a fetcher from configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .gzip(true)
            .build()?;

        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        let user_agent = config
            .user_agent
            .as_deref()
            .and_then(|ua| HeaderValue::from_str(ua).ok());

        Ok(Self {
            client,
            rate_limiter,
            user_agent,
        })
    }

    /// Fetch a URL and return its body as text
    ///
    /// # Errors
    ///
    /// Non-success statuses are classified with [`FetchError::from_status`];
    /// transport timeouts become `FetchError::Timeout`.
    pub async fn get_text(&self, url: &str, accept: &'static str) -> Result<String, FetchError> {
        reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

        self.rate_limiter.until_ready().await;

        debug!(url = %url, "Fetching");
        let response = self
            .client
            .get(url)
            .headers(self.build_headers(accept))
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }

        response.text().await.map_err(Self::classify)
    }

    /// Fetch a URL and deserialize its JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let body = self.get_text(url, ACCEPT_JSON).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    fn classify(err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(err)
        }
    }

    /// Build request headers
    fn build_headers(&self, accept: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| HeaderValue::from_static(random_user_agent()));
        headers.insert(USER_AGENT, user_agent);
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        headers
    }
}

/// Get a random user agent from the pool
fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0])
}
