//! Common test utilities

use async_trait::async_trait;
use media_roulette::config::Config;
use media_roulette::engine::RouletteEngine;
use media_roulette::models::{Capabilities, MediaItem};
use media_roulette::provider::{MediaProvider, ProviderResult};
use media_roulette::registry::{ProviderEntry, ProviderRegistry};
use media_roulette::utils::error::ProviderError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a fake provider does on one call
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Behavior {
    /// Return items with these ids
    Items(Vec<String>),
    /// Return `count` freshly numbered items
    Fresh,
    /// Fail with this error
    Fail(ProviderError),
    /// Sleep, then return freshly numbered items
    Slow(Duration),
    /// Never answer
    Hang,
}

/// Scripted provider; the last behavior repeats once the script runs out
pub struct FakeProvider {
    id: String,
    capabilities: Capabilities,
    script: Mutex<VecDeque<Behavior>>,
    calls: AtomicUsize,
    queries: Mutex<Vec<Option<String>>>,
}

#[allow(dead_code)]
impl FakeProvider {
    pub fn new(id: &str, script: Vec<Behavior>) -> Arc<Self> {
        Self::with_capabilities(id, Capabilities::new(true, true), script)
    }

    pub fn with_capabilities(id: &str, capabilities: Capabilities, script: Vec<Behavior>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            capabilities,
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn items(id: &str, ids: &[&str]) -> Arc<Self> {
        Self::new(
            id,
            vec![Behavior::Items(ids.iter().map(|s| s.to_string()).collect())],
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<Option<String>> {
        self.queries.lock().unwrap().clone()
    }

    fn next_behavior(&self) -> Behavior {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or(Behavior::Fresh)
        }
    }

    fn fresh(&self, call: usize, count: usize) -> Vec<MediaItem> {
        (0..count)
            .map(|i| {
                MediaItem::from_url(
                    self.id.as_str(),
                    format!("{call}-{i}"),
                    format!("https://{}.test/{call}-{i}.png", self.id),
                )
            })
            .collect()
    }
}

#[async_trait]
impl MediaProvider for FakeProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn fetch(&self, query: Option<&str>, count: usize) -> ProviderResult<Vec<MediaItem>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.map(str::to_string));

        match self.next_behavior() {
            Behavior::Items(ids) => Ok(ids
                .iter()
                .map(|id| {
                    MediaItem::from_url(
                        self.id.as_str(),
                        id.as_str(),
                        format!("https://{}.test/{id}.png", self.id),
                    )
                })
                .collect()),
            Behavior::Fresh => Ok(self.fresh(call, count)),
            Behavior::Fail(error) => Err(error),
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.fresh(call, count))
            }
            Behavior::Hang => std::future::pending().await,
        }
    }
}

/// Config tuned for scenario tests: no retries, small prefetch, short
/// timeouts, threshold 2
#[allow(dead_code)]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.engine.request_timeout_ms = 2_000;
    config.engine.provider_timeout_ms = 500;
    config.engine.prefetch = 1;
    config.retry.max_retries = 0;
    config.retry.jitter = 0.0;
    config.breaker.failure_threshold = 2;
    config.breaker.cooldown_ms = 1_000;
    config.breaker.max_cooldown_ms = 8_000;
    config
}

/// Engine over the given providers and weights, registered in order
#[allow(dead_code)]
pub fn engine_with(config: &Config, providers: Vec<(Arc<FakeProvider>, u32)>) -> RouletteEngine {
    let registry = Arc::new(ProviderRegistry::new(config.breaker.clone()));
    for (provider, weight) in providers {
        registry
            .register(ProviderEntry::new(provider, weight))
            .unwrap();
    }
    RouletteEngine::new(config, registry)
}
