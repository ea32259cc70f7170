//! Corpus-backed provider
//!
//! Holds a static list of words (for example subreddit names) and, when a
//! request carries no query, draws one of them as the query for an inner
//! provider. Items keep the inner provider's scope so exclusion and
//! deduplication see one identity per item.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{MediaProvider, ProviderResult};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::models::{Capabilities, MediaItem};
use crate::utils::error::ProviderError;

pub struct CorpusProvider {
    id: String,
    words: Vec<String>,
    inner: Arc<dyn MediaProvider>,
}

/// Parse a newline-delimited corpus, skipping blanks and `#` comments
pub fn parse_corpus(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Load a corpus file
pub fn load_corpus(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::with_source(format!("Failed to read corpus file {}", path.display()), e)
    })?;
    Ok(parse_corpus(&content))
}

impl CorpusProvider {
    pub fn new(
        id: impl Into<String>,
        words: Vec<String>,
        inner: Arc<dyn MediaProvider>,
    ) -> Result<Self> {
        let id = id.into();
        if words.is_empty() {
            return Err(Error::config(format!("corpus provider '{id}' has an empty corpus")));
        }
        Ok(Self { id, words, inner })
    }

    /// Build from configuration, merging inline words with the corpus file
    pub fn from_config(config: &ProviderConfig, inner: Arc<dyn MediaProvider>) -> Result<Self> {
        let mut words: Vec<String> = config
            .words
            .iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        if let Some(path) = &config.corpus_file {
            words.extend(load_corpus(path)?);
        }
        let mut seen = HashSet::new();
        words.retain(|w| seen.insert(w.clone()));
        Self::new(&config.id, words, inner)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn draw(&self) -> Option<&str> {
        self.words
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }
}

#[async_trait]
impl MediaProvider for CorpusProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(true, self.inner.capabilities().supports_pagination)
    }

    async fn fetch(&self, query: Option<&str>, count: usize) -> ProviderResult<Vec<MediaItem>> {
        let query = match query {
            Some(q) => q.to_string(),
            None => self.draw().ok_or(ProviderError::NoResults)?.to_string(),
        };

        debug!(provider = %self.id, inner = %self.inner.id(), query = %query, "Drawing from corpus");
        let items = self.inner.fetch(Some(&query), count).await?;
        Ok(items.into_iter().map(|item| item.with_via(&self.id)).collect())
    }

    fn delegate(&self) -> Option<&str> {
        Some(self.inner.id())
    }
}
