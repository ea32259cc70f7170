//! Media providers
//!
//! Every source of media implements [`MediaProvider`]. The engine only
//! depends on this contract; the concrete providers below are built from
//! `[[providers]]` configuration entries by [`build_providers`].
//!
//! - [`picsum`] - Lorem Picsum list API (API-backed)
//! - [`reddit`] - subreddit listings (API-backed)
//! - [`booru`] - image board random pages (scrape-backed)
//! - [`corpus`] - word list feeding queries to another provider (corpus-backed)

pub mod booru;
pub mod corpus;
pub mod http;
pub mod picsum;
pub mod reddit;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, ProviderConfig, ProviderKind};
use crate::error::{Error, Result};
use crate::models::{Capabilities, MediaItem};
use crate::registry::ProviderEntry;
use crate::utils::error::ProviderError;

use self::booru::BooruProvider;
use self::corpus::CorpusProvider;
use self::http::HttpFetcher;
use self::picsum::PicsumProvider;
use self::reddit::RedditProvider;

/// Result type for provider calls
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A pluggable source of media items
///
/// Implementations must not return `Ok` with an empty list: "nothing
/// matched" is `ProviderError::NoResults`. Apart from their own network
/// I/O, implementations are side-effect free.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Stable provider id, also the scope of item identifiers
    fn id(&self) -> &str;

    /// What the provider supports
    fn capabilities(&self) -> Capabilities;

    /// Fetch up to `count` items, optionally filtered by `query`
    async fn fetch(&self, query: Option<&str>, count: usize) -> ProviderResult<Vec<MediaItem>>;

    /// Registered provider this one forwards its calls to
    ///
    /// The resilience wrapper admits and records calls against both ids.
    fn delegate(&self) -> Option<&str> {
        None
    }
}

/// Apply capability overrides from configuration
fn effective_capabilities(config: &ProviderConfig, native: Capabilities) -> Capabilities {
    Capabilities {
        supports_query: config.supports_query.unwrap_or(native.supports_query),
        supports_pagination: config
            .supports_pagination
            .unwrap_or(native.supports_pagination),
    }
}

/// Build every configured provider, in configuration order
///
/// Corpus providers are wired to their inner provider after all other
/// providers exist.
pub fn build_providers(config: &Config) -> Result<Vec<ProviderEntry>> {
    let fetcher = Arc::new(HttpFetcher::new(&config.http)?);

    let mut built: HashMap<String, Arc<dyn MediaProvider>> = HashMap::new();
    for entry in &config.providers {
        let provider: Arc<dyn MediaProvider> = match entry.kind {
            ProviderKind::Picsum => Arc::new(PicsumProvider::from_config(entry, Arc::clone(&fetcher))),
            ProviderKind::Reddit => Arc::new(RedditProvider::from_config(entry, Arc::clone(&fetcher))),
            ProviderKind::Booru => Arc::new(BooruProvider::from_config(entry, Arc::clone(&fetcher))?),
            // Needs its inner provider, built in the second pass.
            ProviderKind::Corpus => continue,
        };
        built.insert(entry.id.clone(), provider);
    }

    for entry in config.providers.iter().filter(|p| p.kind == ProviderKind::Corpus) {
        let inner_id = entry
            .inner
            .as_deref()
            .ok_or_else(|| Error::config(format!("corpus provider '{}' needs inner", entry.id)))?;
        let inner = built.get(inner_id).cloned().ok_or_else(|| {
            Error::config(format!(
                "corpus provider '{}' references unknown provider '{inner_id}'",
                entry.id
            ))
        })?;
        let provider = CorpusProvider::from_config(entry, inner)?;
        built.insert(entry.id.clone(), Arc::new(provider));
    }

    config
        .providers
        .iter()
        .map(|entry| {
            let provider = built
                .remove(&entry.id)
                .ok_or_else(|| Error::config(format!("provider '{}' was not built", entry.id)))?;
            let capabilities = effective_capabilities(entry, provider.capabilities());
            Ok(ProviderEntry::new(provider, entry.weight)
                .with_enabled(entry.enabled)
                .with_capabilities(capabilities))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_overrides() {
        let mut entry = ProviderConfig::new("p", ProviderKind::Picsum);
        let native = Capabilities::new(false, true);
        assert_eq!(effective_capabilities(&entry, native), native);

        entry.supports_pagination = Some(false);
        entry.supports_query = Some(true);
        assert_eq!(
            effective_capabilities(&entry, native),
            Capabilities::new(true, false)
        );
    }

    #[test]
    fn test_build_providers_in_config_order() {
        let mut config = Config::default();
        let mut corpus = ProviderConfig::new("words", ProviderKind::Corpus);
        corpus.words = vec!["pics".into()];
        corpus.inner = Some("reddit".into());
        config.providers = vec![
            corpus,
            ProviderConfig::new("picsum", ProviderKind::Picsum).with_weight(10),
            ProviderConfig::new("reddit", ProviderKind::Reddit),
            ProviderConfig::new("booru", ProviderKind::Booru),
        ];

        let built = build_providers(&config).unwrap();
        let ids: Vec<&str> = built.iter().map(|b| b.provider.id()).collect();
        assert_eq!(ids, vec!["words", "picsum", "reddit", "booru"]);
        assert_eq!(built[1].weight, 10);
        assert!(built[0].capabilities.supports_query);
        assert!(!built[1].capabilities.supports_query);
    }
}
