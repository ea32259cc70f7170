// Core data structures for the roulette engine

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::utils::error::ProviderError;

/// Kind of media an item points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Gif,
    Video,
}

impl MediaKind {
    /// Guess the kind from a URL's file extension, defaulting to image
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
        let ext = path.rsplit('.').next().unwrap_or("");
        match ext {
            "gif" | "gifv" => Self::Gif,
            "mp4" | "webm" | "mov" | "mkv" | "m3u8" => Self::Video,
            _ => Self::Image,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Gif => "gif",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the media itself lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaContent {
    /// Canonical URL of the media
    Url(String),
    /// Inline payload (generated or locally read media)
    Bytes { data: Bytes, mime: String },
}

/// Globally unique identity of an item: provider scope plus the
/// provider-local identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub provider: String,
    pub id: String,
}

impl ItemKey {
    pub fn new(provider: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            id: id.into(),
        }
    }

    /// Parse the `provider:id` form produced by `Display`
    pub fn parse(s: &str) -> Option<Self> {
        let (provider, id) = s.split_once(':')?;
        if provider.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(provider, id))
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.id)
    }
}

/// A single fetched media item
///
/// Immutable once shared: fields are private and the `with_*` builders
/// consume the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    id: String,
    provider: String,
    content: MediaContent,
    kind: MediaKind,
    title: Option<String>,
    source_page: Option<String>,
    nsfw: bool,
    fetched_at: DateTime<Utc>,
    /// Provider that served the item on behalf of `provider`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    via: Option<String>,
}

impl MediaItem {
    /// Create an item pointing at a URL, guessing the kind from the URL
    pub fn from_url(
        provider: impl Into<String>,
        id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let kind = MediaKind::from_url(&url);
        Self {
            id: id.into(),
            provider: provider.into(),
            content: MediaContent::Url(url),
            kind,
            title: None,
            source_page: None,
            nsfw: false,
            fetched_at: Utc::now(),
            via: None,
        }
    }

    /// Create an item carrying its payload inline
    pub fn from_bytes(
        provider: impl Into<String>,
        id: impl Into<String>,
        data: Bytes,
        mime: impl Into<String>,
        kind: MediaKind,
    ) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            content: MediaContent::Bytes {
                data,
                mime: mime.into(),
            },
            kind,
            title: None,
            source_page: None,
            nsfw: false,
            fetched_at: Utc::now(),
            via: None,
        }
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source_page(mut self, page: impl Into<String>) -> Self {
        self.source_page = Some(page.into());
        self
    }

    pub fn with_nsfw(mut self, nsfw: bool) -> Self {
        self.nsfw = nsfw;
        self
    }

    pub fn with_via(mut self, provider: impl Into<String>) -> Self {
        self.via = Some(provider.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(&self.provider, &self.id)
    }

    pub fn content(&self) -> &MediaContent {
        &self.content
    }

    /// URL of the media, if it is not an inline payload
    pub fn url(&self) -> Option<&str> {
        match &self.content {
            MediaContent::Url(url) => Some(url),
            MediaContent::Bytes { .. } => None,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn source_page(&self) -> Option<&str> {
        self.source_page.as_deref()
    }

    pub fn is_nsfw(&self) -> bool {
        self.nsfw
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn via(&self) -> Option<&str> {
        self.via.as_deref()
    }

    /// Every registered provider the item passed through
    pub fn served_by(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.provider.as_str()).chain(self.via.as_deref())
    }
}

/// Who asked for a spin
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: String,
    pub guild_id: Option<String>,
}

impl Requester {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            guild_id: None,
        }
    }

    pub fn in_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }
}

/// One request for media
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub requester: Requester,
    /// Optional category/query filter
    pub query: Option<String>,
    /// Items the requester has already seen
    pub exclusions: HashSet<ItemKey>,
    /// Number of items wanted
    pub count: usize,
    /// Restrict the spin to one provider
    pub provider: Option<String>,
}

impl Request {
    pub fn new(requester: Requester) -> Self {
        Self {
            requester,
            query: None,
            exclusions: HashSet::new(),
            count: 1,
            provider: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn excluding(mut self, keys: impl IntoIterator<Item = ItemKey>) -> Self {
        self.exclusions.extend(keys);
        self
    }

    pub fn pinned_to(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Whether an item was already seen by this requester
    pub fn is_excluded(&self, item: &MediaItem) -> bool {
        self.exclusions.contains(&item.key())
    }
}

/// What a provider can do beyond returning random items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// Accepts a category/query filter
    pub supports_query: bool,
    /// Can page through results for more variety
    pub supports_pagination: bool,
}

impl Capabilities {
    pub fn new(supports_query: bool, supports_pagination: bool) -> Self {
        Self {
            supports_query,
            supports_pagination,
        }
    }
}

/// Circuit-breaker health of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Closed,
    HalfOpen,
    Open,
}

impl HealthState {
    /// Lower rank is preferred when ordering candidates
    pub fn rank(&self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::HalfOpen => 1,
            Self::Open => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::HalfOpen => "half_open",
            Self::Open => "open",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a registered provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub capabilities: Capabilities,
    pub weight: u32,
    pub enabled: bool,
    pub health: HealthState,
    pub consecutive_failures: u32,
    pub last_failure: Option<DateTime<Utc>>,
}

/// A failure attributed to one provider during a spin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: ProviderError,
}

fn serialize_error<S: serde::Serializer>(err: &ProviderError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&err.to_string())
}

impl ProviderFailure {
    pub fn new(provider: impl Into<String>, error: ProviderError) -> Self {
        Self {
            provider: provider.into(),
            error,
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

/// Successful spin
#[derive(Debug, Clone, Serialize)]
pub struct SpinSuccess {
    /// Items in the order they were accepted
    pub items: Vec<MediaItem>,
    /// Providers that contributed items, in contribution order
    pub providers: Vec<String>,
    /// Whether any item was served from the result cache
    pub cache_hit: bool,
    /// Count the request asked for
    pub requested: usize,
    /// Failures seen on the way to success
    pub failures: Vec<ProviderFailure>,
}

impl SpinSuccess {
    /// Fewer items than requested were available
    pub fn is_partial(&self) -> bool {
        self.items.len() < self.requested
    }
}

/// Why a spin produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustReason {
    /// Every provider answered, none had usable media
    NoMedia,
    /// At least one provider was failing or excluded by policy
    Unavailable,
    /// The request named a provider or filter that cannot serve it
    Rejected,
    /// The overall request deadline expired
    TimedOut,
}

/// Failed spin carrying per-provider causes in attempt order
#[derive(Debug, Clone, Serialize)]
pub struct SpinExhausted {
    pub errors: Vec<ProviderFailure>,
    pub timed_out: bool,
}

impl SpinExhausted {
    pub fn reason(&self) -> ExhaustReason {
        if self.timed_out {
            return ExhaustReason::TimedOut;
        }
        let any_infrastructure = self
            .errors
            .iter()
            .any(|f| !matches!(f.error, ProviderError::NoResults) && !f.error.is_rejection());
        if any_infrastructure {
            ExhaustReason::Unavailable
        } else if self.errors.iter().any(|f| f.error.is_rejection()) {
            ExhaustReason::Rejected
        } else {
            ExhaustReason::NoMedia
        }
    }
}

/// Result of a spin
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success(SpinSuccess),
    Exhausted(SpinExhausted),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Items of a successful spin, empty otherwise
    pub fn items(&self) -> &[MediaItem] {
        match self {
            Self::Success(s) => &s.items,
            Self::Exhausted(_) => &[],
        }
    }

    /// Per-provider failures recorded during the spin
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            Self::Success(s) => &s.failures,
            Self::Exhausted(e) => &e.errors,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(s) if s.is_partial() => "partial",
            Self::Success(_) => "success",
            Self::Exhausted(e) => match e.reason() {
                ExhaustReason::NoMedia => "no_media",
                ExhaustReason::Unavailable => "unavailable",
                ExhaustReason::Rejected => "rejected",
                ExhaustReason::TimedOut => "timed_out",
            },
        }
    }
}
