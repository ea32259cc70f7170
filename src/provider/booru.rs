//! Scrape-backed provider for booru image boards
//!
//! Each call loads a board's "random post" page and extracts the media
//! URL from it. The query picks a board by id or display name; unknown
//! names fall back to a random board.

use async_trait::async_trait;
use futures::future::join_all;
use rand::seq::SliceRandom;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::http::{HttpFetcher, ACCEPT_HTML};
use super::{MediaProvider, ProviderResult};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::models::{Capabilities, MediaItem};
use crate::utils::error::ProviderError;
use crate::utils::resolve_url;

/// Random pages loaded per call
const MAX_PAGES_PER_CALL: usize = 3;

const RANDOM_PATH: &str = "/index.php?page=post&s=random";

/// A supported image board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Board {
    pub id: &'static str,
    pub display_name: &'static str,
    pub base_url: &'static str,
    pub nsfw: bool,
}

pub const BOARDS: &[Board] = &[
    Board {
        id: "safebooru",
        display_name: "Safebooru",
        base_url: "https://safebooru.org",
        nsfw: false,
    },
    Board {
        id: "gelbooru",
        display_name: "Gelbooru",
        base_url: "https://gelbooru.com",
        nsfw: true,
    },
    Board {
        id: "rule34",
        display_name: "Rule34",
        base_url: "https://rule34.xxx",
        nsfw: true,
    },
    Board {
        id: "tbib",
        display_name: "TBIB",
        base_url: "https://tbib.org",
        nsfw: true,
    },
];

impl Board {
    /// Find a board by id or display name, case-insensitively
    pub fn find(name: &str) -> Option<&'static Board> {
        let name = name.trim();
        BOARDS
            .iter()
            .find(|b| b.id.eq_ignore_ascii_case(name) || b.display_name.eq_ignore_ascii_case(name))
    }
}

/// Extract the media URL from a post page
///
/// Tries the `og:image` meta tag first, then the `#image` element.
pub fn extract_media_url(html: &str, page_url: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let og = Selector::parse(r#"meta[property="og:image"]"#).ok()?;
    let from_meta = document
        .select(&og)
        .filter_map(|e| e.value().attr("content"))
        .find(|c| !c.trim().is_empty());

    let src = match from_meta {
        Some(content) => content.to_string(),
        None => {
            let image = Selector::parse("#image").ok()?;
            document
                .select(&image)
                .filter_map(|e| e.value().attr("src"))
                .find(|s| !s.trim().is_empty())?
                .to_string()
        }
    };

    resolve_url(page_url, &src)
}

/// Stable id for a scraped item, derived from its media URL
fn item_id(media_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(media_url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

pub struct BooruProvider {
    id: String,
    boards: Vec<&'static Board>,
    /// Replaces every board's host, used to point at a mock server
    base_url: Option<String>,
    fetcher: Arc<HttpFetcher>,
}

impl BooruProvider {
    /// Create a provider over the given boards
    pub fn new(id: impl Into<String>, boards: Vec<&'static Board>, fetcher: Arc<HttpFetcher>) -> Self {
        Self {
            id: id.into(),
            boards,
            base_url: None,
            fetcher,
        }
    }

    /// Build from configuration
    ///
    /// An empty `boards` list means every board the NSFW setting allows.
    pub fn from_config(config: &ProviderConfig, fetcher: Arc<HttpFetcher>) -> Result<Self> {
        let boards: Vec<&'static Board> = if config.boards.is_empty() {
            BOARDS
                .iter()
                .filter(|b| config.allow_nsfw || !b.nsfw)
                .collect()
        } else {
            config
                .boards
                .iter()
                .map(|name| {
                    Board::find(name).ok_or_else(|| {
                        Error::config(format!("provider '{}': unknown board '{name}'", config.id))
                    })
                })
                .collect::<Result<_>>()?
        };

        if boards.is_empty() {
            return Err(Error::config(format!(
                "provider '{}' has no usable boards",
                config.id
            )));
        }

        let mut provider = Self::new(&config.id, boards, fetcher);
        provider.base_url = config
            .base_url
            .as_ref()
            .map(|u| u.trim_end_matches('/').to_string());
        Ok(provider)
    }

    fn random_url(&self, board: &Board) -> String {
        let host = self.base_url.as_deref().unwrap_or(board.base_url);
        format!("{host}{RANDOM_PATH}")
    }

    /// Pick the board for this call
    fn select_board(&self, query: Option<&str>) -> ProviderResult<&'static Board> {
        if let Some(name) = query {
            match Board::find(name) {
                Some(board) if self.boards.contains(&board) => return Ok(board),
                Some(board) => {
                    return Err(ProviderError::unsupported(format!(
                        "board '{}' is not enabled",
                        board.id
                    )))
                }
                None => debug!(provider = %self.id, board = %name, "Unknown board, using random"),
            }
        }

        self.boards
            .choose(&mut rand::thread_rng())
            .copied()
            .ok_or(ProviderError::NoResults)
    }

    async fn fetch_page(&self, board: &'static Board) -> ProviderResult<MediaItem> {
        let page_url = self.random_url(board);
        let html = self.fetcher.get_text(&page_url, ACCEPT_HTML).await?;

        let media_url = extract_media_url(&html, &page_url).ok_or(ProviderError::NoResults)?;
        Ok(MediaItem::from_url(&self.id, item_id(&media_url), media_url)
            .with_title(format!("Random {} picture", board.display_name))
            .with_source_page(page_url)
            .with_nsfw(board.nsfw))
    }
}

#[async_trait]
impl MediaProvider for BooruProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(true, false)
    }

    async fn fetch(&self, query: Option<&str>, count: usize) -> ProviderResult<Vec<MediaItem>> {
        let board = self.select_board(query)?;
        let pages = count.clamp(1, MAX_PAGES_PER_CALL);

        let results = join_all((0..pages).map(|_| self.fetch_page(board))).await;

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut first_error = None;
        for result in results {
            match result {
                Ok(item) => {
                    if seen.insert(item.id().to_string()) {
                        items.push(item);
                    }
                }
                Err(e) => {
                    warn!(provider = %self.id, board = board.id, error = %e, "Board page failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if items.is_empty() {
            return Err(first_error.unwrap_or(ProviderError::NoResults));
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::provider::http::HttpConfig;

    fn fetcher() -> Arc<HttpFetcher> {
        Arc::new(HttpFetcher::new(&HttpConfig::default()).unwrap())
    }

    #[test]
    fn test_find_board() {
        assert_eq!(Board::find("SAFEBOORU").map(|b| b.id), Some("safebooru"));
        assert_eq!(Board::find("Rule34").map(|b| b.id), Some("rule34"));
        assert_eq!(Board::find("unknown"), None);
    }

    #[test]
    fn test_extract_og_image() {
        let html = r#"<html><head>
            <meta property="og:image" content="https://img.example.org/images/1/abc.png">
            </head><body><img id="image" src="/ignored.png"></body></html>"#;
        assert_eq!(
            extract_media_url(html, "https://safebooru.org/index.php?page=post&s=view&id=1"),
            Some("https://img.example.org/images/1/abc.png".to_string())
        );
    }

    #[test]
    fn test_extract_image_fallback_resolves_relative() {
        let page = "https://safebooru.org/index.php?page=post&s=view&id=1";

        let root_relative = r#"<html><body><img id="image" src="/images/1/abc.jpg"></body></html>"#;
        assert_eq!(
            extract_media_url(root_relative, page),
            Some("https://safebooru.org/images/1/abc.jpg".to_string())
        );

        let protocol_relative =
            r#"<html><body><img id="image" src="//cdn.safebooru.org/abc.gif"></body></html>"#;
        assert_eq!(
            extract_media_url(protocol_relative, page),
            Some("https://cdn.safebooru.org/abc.gif".to_string())
        );
    }

    #[test]
    fn test_extract_nothing() {
        assert_eq!(extract_media_url("<html><body></body></html>", "https://x.org/"), None);
    }

    #[test]
    fn test_item_id_is_stable() {
        let a = item_id("https://img.example.org/a.png");
        assert_eq!(a.len(), 16);
        assert_eq!(a, item_id("https://img.example.org/a.png"));
        assert_ne!(a, item_id("https://img.example.org/b.png"));
    }

    #[test]
    fn test_default_boards_respect_nsfw() {
        let config = ProviderConfig::new("booru", ProviderKind::Booru);
        let provider = BooruProvider::from_config(&config, fetcher()).unwrap();
        assert_eq!(provider.boards.len(), 1);
        assert_eq!(provider.boards[0].id, "safebooru");

        let mut config = config;
        config.allow_nsfw = true;
        let provider = BooruProvider::from_config(&config, fetcher()).unwrap();
        assert_eq!(provider.boards.len(), BOARDS.len());
    }

    #[test]
    fn test_unknown_configured_board() {
        let mut config = ProviderConfig::new("booru", ProviderKind::Booru);
        config.boards = vec!["nowhere".into()];
        assert!(BooruProvider::from_config(&config, fetcher()).is_err());
    }

    #[test]
    fn test_select_board() {
        let config = ProviderConfig::new("booru", ProviderKind::Booru);
        let provider = BooruProvider::from_config(&config, fetcher()).unwrap();

        assert_eq!(provider.select_board(Some("safebooru")).unwrap().id, "safebooru");
        assert_eq!(provider.select_board(Some("whatever")).unwrap().id, "safebooru");
        assert!(matches!(
            provider.select_board(Some("rule34")),
            Err(ProviderError::Unsupported { .. })
        ));
    }
}
