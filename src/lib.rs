//! media-roulette - Media source aggregation and selection engine
//!
//! Serves randomized media items from several pluggable sources behind a
//! single `spin` operation, with per-provider resilience and a shared
//! result cache.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`provider`] - Provider trait and concrete providers
//! - [`registry`] - Configured providers and their health
//! - [`resilience`] - Timeout, retry and circuit breaking
//! - [`cache`] - TTL + LRU result cache
//! - [`selector`] - Candidate ordering, exclusion and dedup
//! - [`engine`] - The `spin` orchestrator
//! - [`history`] - Seen-history used to build exclusion sets
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use media_roulette::config::Config;
//! use media_roulette::engine::RouletteEngine;
//! use media_roulette::models::{Request, Requester};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let engine = RouletteEngine::from_config(&config)?;
//!     let outcome = engine
//!         .spin(&Request::new(Requester::user("42")).with_query("cats"))
//!         .await;
//!     println!("{}", outcome.label());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod metrics;
pub mod models;
pub mod provider;
pub mod registry;
pub mod resilience;
pub mod selector;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::engine::RouletteEngine;
    pub use crate::error::{Error, ErrorCategory, Result, RouletteErrorTrait};
    pub use crate::history::SeenHistory;
    pub use crate::models::{ItemKey, MediaItem, Outcome, Request, Requester};
    pub use crate::provider::MediaProvider;
    pub use crate::registry::{ProviderEntry, ProviderRegistry};
}

// Direct re-exports for convenience
pub use engine::RouletteEngine;
pub use models::{MediaItem, Outcome, Request};
