//! API-backed provider for the Lorem Picsum photo list
//!
//! Draws a random page of `/v2/list` and returns photos from it in random
//! order. The API has no search, so queries are unsupported.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::http::HttpFetcher;
use super::{MediaProvider, ProviderResult};
use crate::config::ProviderConfig;
use crate::models::{Capabilities, MediaItem, MediaKind};
use crate::utils::error::ProviderError;

const DEFAULT_BASE_URL: &str = "https://picsum.photos";
const DEFAULT_PAGES: u32 = 30;
const PAGE_SIZE: usize = 30;

/// One entry of the list endpoint
#[derive(Debug, Deserialize)]
struct PicsumPhoto {
    id: String,
    author: String,
    url: String,
    download_url: String,
}

pub struct PicsumProvider {
    id: String,
    base_url: String,
    pages: u32,
    fetcher: Arc<HttpFetcher>,
}

impl PicsumProvider {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, fetcher: Arc<HttpFetcher>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pages: DEFAULT_PAGES,
            fetcher,
        }
    }

    pub fn from_config(config: &ProviderConfig, fetcher: Arc<HttpFetcher>) -> Self {
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let mut provider = Self::new(&config.id, base_url, fetcher);
        provider.pages = config.pages.unwrap_or(DEFAULT_PAGES).max(1);
        provider
    }

    fn list_url(&self, page: u32) -> String {
        format!("{}/v2/list?page={page}&limit={PAGE_SIZE}", self.base_url)
    }

    fn into_item(&self, photo: PicsumPhoto) -> MediaItem {
        MediaItem::from_url(&self.id, photo.id, photo.download_url)
            .with_kind(MediaKind::Image)
            .with_title(format!("Photo by {}", photo.author))
            .with_source_page(photo.url)
    }
}

#[async_trait]
impl MediaProvider for PicsumProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(false, true)
    }

    async fn fetch(&self, query: Option<&str>, count: usize) -> ProviderResult<Vec<MediaItem>> {
        if query.is_some() {
            return Err(ProviderError::unsupported("picsum does not support queries"));
        }

        let page = rand::thread_rng().gen_range(1..=self.pages);
        debug!(provider = %self.id, page = page, "Fetching picsum page");

        let mut photos: Vec<PicsumPhoto> = self.fetcher.get_json(&self.list_url(page)).await?;
        if photos.is_empty() {
            return Err(ProviderError::NoResults);
        }

        photos.shuffle(&mut rand::thread_rng());
        Ok(photos
            .into_iter()
            .take(count)
            .map(|photo| self.into_item(photo))
            .collect())
    }
}
