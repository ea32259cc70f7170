//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Normalize a user-supplied query for use as a cache key and provider input
///
/// Returns `None` for blank queries so that "no filter" has one spelling.
pub fn normalize_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    let normalized = normalize_whitespace(query).to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Resolve a possibly relative `src` attribute against the page it came from
///
/// Handles protocol-relative (`//host/x.png`) and root-relative (`/x.png`)
/// sources as well as already absolute ones.
pub fn resolve_url(page_url: &str, src: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() {
        return None;
    }

    if let Some(rest) = src.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }

    match Url::parse(src) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(page_url)
            .ok()
            .and_then(|base| base.join(src).ok())
            .map(|u| u.to_string()),
        Err(_) => None,
    }
}

/// Truncate text to a maximum length
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
