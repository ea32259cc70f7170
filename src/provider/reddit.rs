//! API-backed provider for subreddit listings
//!
//! The query names the subreddit; without one a subreddit is drawn from
//! the configured defaults. Only media posts survive: direct images and
//! gifs, plus reddit-hosted video through its fallback URL.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use super::http::HttpFetcher;
use super::{MediaProvider, ProviderResult};
use crate::config::ProviderConfig;
use crate::models::{Capabilities, MediaItem, MediaKind};
use crate::utils::error::ProviderError;

const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
const DEFAULT_SUBREDDITS: &[&str] = &["pics", "EarthPorn", "aww", "itookapicture"];
const SORTS: &[&str] = &["hot", "top", "new"];
const POST_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    over_18: bool,
    #[serde(default)]
    stickied: bool,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    post_hint: Option<String>,
    #[serde(default)]
    media: Option<PostMedia>,
}

#[derive(Debug, Deserialize)]
struct PostMedia {
    reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Deserialize)]
struct RedditVideo {
    fallback_url: String,
}

pub struct RedditProvider {
    id: String,
    base_url: String,
    sort: Option<String>,
    subreddits: Vec<String>,
    allow_nsfw: bool,
    fetcher: Arc<HttpFetcher>,
}

/// Subreddit names are 2-21 word characters
fn is_valid_subreddit(name: &str) -> bool {
    static SUBREDDIT_RE: OnceLock<Regex> = OnceLock::new();
    let re = SUBREDDIT_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_]{2,21}$").expect("Invalid regex pattern"));
    re.is_match(name)
}

impl RedditProvider {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, fetcher: Arc<HttpFetcher>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sort: None,
            subreddits: DEFAULT_SUBREDDITS.iter().map(|s| s.to_string()).collect(),
            allow_nsfw: false,
            fetcher,
        }
    }

    pub fn from_config(config: &ProviderConfig, fetcher: Arc<HttpFetcher>) -> Self {
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let mut provider = Self::new(&config.id, base_url, fetcher);
        provider.sort = config.sort.clone();
        provider.allow_nsfw = config.allow_nsfw;
        if !config.subreddits.is_empty() {
            provider.subreddits = config.subreddits.clone();
        }
        provider
    }

    fn listing_url(&self, subreddit: &str, sort: &str) -> String {
        let time = if sort == "top" { "&t=week" } else { "" };
        format!(
            "{}/r/{subreddit}/{sort}.json?limit={POST_LIMIT}&raw_json=1{time}",
            self.base_url
        )
    }

    /// Turn a post into a media item, if it carries media we can serve
    fn media_item(&self, post: Post) -> Option<MediaItem> {
        if post.stickied || (post.over_18 && !self.allow_nsfw) {
            return None;
        }

        let video = post
            .media
            .and_then(|m| m.reddit_video)
            .map(|v| v.fallback_url);

        let (url, kind) = match (post.is_video, video, post.url) {
            (true, Some(fallback), _) => (fallback, MediaKind::Video),
            (_, _, Some(url)) => {
                let kind = MediaKind::from_url(&url);
                let looks_like_media = post.post_hint.as_deref() == Some("image")
                    || kind != MediaKind::Image
                    || has_image_extension(&url);
                if !looks_like_media {
                    return None;
                }
                (url, kind)
            }
            _ => return None,
        };

        let mut item = MediaItem::from_url(&self.id, post.id, url)
            .with_kind(kind)
            .with_title(post.title)
            .with_nsfw(post.over_18);
        if let Some(permalink) = post.permalink {
            item = item.with_source_page(format!("https://www.reddit.com{permalink}"));
        }
        Some(item)
    }
}

fn has_image_extension(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    [".jpg", ".jpeg", ".png", ".webp"]
        .iter()
        .any(|ext| path.ends_with(ext))
}

#[async_trait]
impl MediaProvider for RedditProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(true, true)
    }

    async fn fetch(&self, query: Option<&str>, count: usize) -> ProviderResult<Vec<MediaItem>> {
        let (subreddit, sort) = {
            let mut rng = rand::thread_rng();
            let subreddit = match query {
                Some(q) => q.trim().trim_start_matches("r/").to_string(),
                None => self
                    .subreddits
                    .choose(&mut rng)
                    .cloned()
                    .ok_or(ProviderError::NoResults)?,
            };
            let sort = match &self.sort {
                Some(sort) => sort.clone(),
                None => SORTS.choose(&mut rng).copied().unwrap_or("hot").to_string(),
            };
            (subreddit, sort)
        };

        if !is_valid_subreddit(&subreddit) {
            return Err(ProviderError::NoResults);
        }

        debug!(provider = %self.id, subreddit = %subreddit, sort = %sort, "Fetching listing");
        let listing: Listing = self
            .fetcher
            .get_json(&self.listing_url(&subreddit, &sort))
            .await?;

        let mut items: Vec<MediaItem> = listing
            .data
            .children
            .into_iter()
            .filter_map(|child| self.media_item(child.data))
            .collect();

        if items.is_empty() {
            return Err(ProviderError::NoResults);
        }

        items.shuffle(&mut rand::thread_rng());
        items.truncate(count);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::http::HttpConfig;

    fn provider() -> RedditProvider {
        let fetcher = Arc::new(HttpFetcher::new(&HttpConfig::default()).unwrap());
        RedditProvider::new("reddit", "https://reddit.example", fetcher)
    }

    fn post(json: &str) -> Post {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_valid_subreddit() {
        assert!(is_valid_subreddit("EarthPorn"));
        assert!(is_valid_subreddit("itookapicture"));
        assert!(!is_valid_subreddit("a"));
        assert!(!is_valid_subreddit("../etc"));
        assert!(!is_valid_subreddit("two words"));
    }

    #[test]
    fn test_listing_url() {
        let p = provider();
        assert_eq!(
            p.listing_url("pics", "hot"),
            "https://reddit.example/r/pics/hot.json?limit=50&raw_json=1"
        );
        assert!(p.listing_url("pics", "top").ends_with("&t=week"));
    }

    #[test]
    fn test_image_post_is_kept() {
        let item = provider()
            .media_item(post(
                r#"{"id":"abc","title":"Sunset","url":"https://i.redd.it/abc.jpg",
                    "permalink":"/r/pics/comments/abc/sunset/","post_hint":"image"}"#,
            ))
            .unwrap();
        assert_eq!(item.key().to_string(), "reddit:abc");
        assert_eq!(item.kind(), MediaKind::Image);
        assert_eq!(
            item.source_page(),
            Some("https://www.reddit.com/r/pics/comments/abc/sunset/")
        );
    }

    #[test]
    fn test_hosted_video_uses_fallback() {
        let item = provider()
            .media_item(post(
                r#"{"id":"v1","title":"Clip","url":"https://v.redd.it/v1","is_video":true,
                    "media":{"reddit_video":{"fallback_url":"https://v.redd.it/v1/DASH_720.mp4"}}}"#,
            ))
            .unwrap();
        assert_eq!(item.kind(), MediaKind::Video);
        assert_eq!(item.url(), Some("https://v.redd.it/v1/DASH_720.mp4"));
    }

    #[test]
    fn test_filtered_posts() {
        let p = provider();
        assert!(p
            .media_item(post(r#"{"id":"s","title":"Rules","stickied":true,"url":"https://i.redd.it/s.png"}"#))
            .is_none());
        assert!(p
            .media_item(post(r#"{"id":"n","title":"x","over_18":true,"url":"https://i.redd.it/n.png"}"#))
            .is_none());
        assert!(p
            .media_item(post(r#"{"id":"t","title":"Discussion","url":"https://www.reddit.com/r/pics/comments/t/"}"#))
            .is_none());
    }

    #[tokio::test]
    async fn test_invalid_subreddit_is_no_results() {
        let err = provider().fetch(Some("not valid!"), 1).await.unwrap_err();
        assert_eq!(err, ProviderError::NoResults);
    }
}
