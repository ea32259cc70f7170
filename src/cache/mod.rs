//! In-memory result cache
//!
//! Recently fetched items are kept per query key to absorb bursts and
//! rate-limited providers:
//! - TTL expiry is checked on read
//! - capacity is enforced by least-recently-used eviction
//! - entries are replaced wholesale, never mutated in place
//!
//! All keys share one `LruCache`, so the configured capacity bounds the
//! whole cache and recency is global.
//!
//! # Example
//!
//! ```rust,ignore
//! use media_roulette::cache::{CacheConfig, ResultCache};
//!
//! let cache = ResultCache::new(CacheConfig::default());
//! let key = ResultCache::key_for(Some("cats"), None);
//! cache.put_default(&key, items);
//! let cached = cache.get(&key);
//! ```

use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::metrics;
use crate::models::MediaItem;

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in seconds (default: 5 minutes)
    pub ttl_secs: u64,

    /// Maximum number of keys held
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            capacity: 256,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// One cached result set
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Items in fetch order
    pub items: Arc<Vec<MediaItem>>,
    /// When the entry stops being served
    pub expires_at: Instant,
}

impl CacheEntry {
    fn new(items: Vec<MediaItem>, ttl: Duration) -> Self {
        Self {
            items: Arc::new(items),
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0.0 when there were none
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// TTL + LRU cache of media items
#[derive(Debug)]
pub struct ResultCache {
    config: CacheConfig,
    entries: Mutex<LruCache<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Build the cache key for a query, optionally scoped to one provider
    ///
    /// The query is expected to be normalized already.
    pub fn key_for(query: Option<&str>, provider: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"q:");
        if let Some(q) = query {
            hasher.update(q.as_bytes());
        }
        hasher.update(b"\0p:");
        if let Some(p) = provider {
            hasher.update(p.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Look up live items for `key`
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<Arc<Vec<MediaItem>>> {
        let now = Instant::now();
        let mut entries = self.lock();

        let live = entries
            .get(key)
            .map(|entry| (!entry.is_expired(now)).then(|| Arc::clone(&entry.items)));
        let result = match live {
            Some(Some(items)) => Some(items),
            Some(None) => {
                entries.pop(key);
                drop(entries);
                self.count_evictions(1);
                None
            }
            None => None,
        };

        let hit = result.is_some();
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_cache_lookup(hit);
        debug!(key = %short(key), hit = hit, "Cache lookup");

        result
    }

    /// Store `items` under `key` for `ttl`, replacing any previous entry
    ///
    /// Storing an empty list removes the key.
    pub fn put(&self, key: &str, items: Vec<MediaItem>, ttl: Duration) {
        if items.is_empty() {
            self.invalidate(key);
            return;
        }

        let entry = CacheEntry::new(items, ttl);
        // `push` hands back the displaced entry: the old value for the same
        // key, or the least recently used one when the cache is full.
        let evicted = match self.lock().push(key.to_string(), entry) {
            Some((old_key, _)) => old_key != key,
            None => false,
        };
        if evicted {
            self.count_evictions(1);
        }
    }

    /// Store with the configured TTL
    pub fn put_default(&self, key: &str, items: Vec<MediaItem>) {
        self.put(key, items, self.config.ttl());
    }

    /// Remove one key
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().pop(key).is_some()
    }

    /// Remove everything
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of held entries, including expired ones not yet read
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn count_evictions(&self, count: usize) {
        if count > 0 {
            self.evictions.fetch_add(count as u64, Ordering::Relaxed);
            metrics::record_cache_evictions(count);
        }
    }

    /// Lock the entries, recovering the data if a holder panicked
    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn short(key: &str) -> &str {
    &key[..key.len().min(12)]
}
