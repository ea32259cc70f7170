//! Bounded seen-history for building exclusion sets
//!
//! Each scope (a user, or a guild) keeps a sliding window of the item keys
//! it was shown. The window is bounded both by size and by age, so history
//! never grows without limit. The command layer records items after a
//! successful spin and reads the exclusion set when building the next
//! request.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use crate::models::{ItemKey, MediaItem};

/// Seen-history settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum keys remembered per scope
    pub window_size: usize,

    /// Entries older than this are forgotten (0 disables age expiry)
    pub max_age_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_size: 500,
            max_age_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone)]
struct Seen {
    key: ItemKey,
    at: DateTime<Utc>,
}

/// Per-scope sliding window of shown items
#[derive(Debug)]
pub struct SeenHistory {
    config: HistoryConfig,
    scopes: DashMap<String, VecDeque<Seen>>,
}

impl SeenHistory {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            scopes: DashMap::new(),
        }
    }

    /// Remember items shown to `scope`
    pub fn record<'a>(&self, scope: &str, items: impl IntoIterator<Item = &'a MediaItem>) {
        self.record_at(scope, items.into_iter().map(MediaItem::key), Utc::now());
    }

    /// Remember keys at an explicit time
    pub fn record_at(&self, scope: &str, keys: impl IntoIterator<Item = ItemKey>, at: DateTime<Utc>) {
        let mut window = self.scopes.entry(scope.to_string()).or_default();
        for key in keys {
            window.retain(|seen| seen.key != key);
            window.push_back(Seen { key, at });
        }
        while window.len() > self.config.window_size {
            window.pop_front();
        }
    }

    /// Keys seen by `scope` that are still inside the window
    pub fn exclusion_set(&self, scope: &str) -> HashSet<ItemKey> {
        self.exclusion_set_at(scope, Utc::now())
    }

    /// Same as [`exclusion_set`](Self::exclusion_set) evaluated at `now`,
    /// dropping entries that aged out
    pub fn exclusion_set_at(&self, scope: &str, now: DateTime<Utc>) -> HashSet<ItemKey> {
        let Some(mut window) = self.scopes.get_mut(scope) else {
            return HashSet::new();
        };

        if self.config.max_age_secs > 0 {
            let max_age = i64::try_from(self.config.max_age_secs).unwrap_or(i64::MAX);
            let cutoff = now - ChronoDuration::seconds(max_age);
            while window.front().is_some_and(|seen| seen.at < cutoff) {
                window.pop_front();
            }
        }

        window.iter().map(|seen| seen.key.clone()).collect()
    }

    /// Forget everything for `scope`
    pub fn clear(&self, scope: &str) {
        self.scopes.remove(scope);
    }

    /// Number of keys held for `scope`
    pub fn len(&self, scope: &str) -> usize {
        self.scopes.get(scope).map(|w| w.len()).unwrap_or(0)
    }
}
