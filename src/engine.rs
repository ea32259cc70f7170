//! Roulette engine
//!
//! [`RouletteEngine::spin`] is the single entry point for the command
//! layer. One spin:
//! 1. serves what it can from the result cache, filtered by exclusions
//! 2. asks the selector for an ordered candidate list
//! 3. calls candidates through the resilience wrapper until the requested
//!    count is met, feeding every fresh answer back into the cache
//! 4. returns `Success` or `Exhausted`, never a raw provider error
//!
//! The whole spin is bounded by the configured request timeout. When it
//! fires, in-flight provider calls are dropped and reported as timeouts.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::ResultCache;
use crate::config::{Config, EngineConfig};
use crate::error::Result;
use crate::metrics;
use crate::models::{
    MediaItem, Outcome, ProviderDescriptor, ProviderFailure, Request, SpinExhausted, SpinSuccess,
};
use crate::provider::build_providers;
use crate::registry::ProviderRegistry;
use crate::resilience::Resilience;
use crate::selector::{Accumulator, Selector};
use crate::utils::error::ProviderError;
use crate::utils::normalize_query;

/// Mutable state of one spin, kept outside the deadline-bounded future so
/// it survives cancellation
struct SpinState<'a> {
    accumulator: Accumulator<'a>,
    failures: Vec<ProviderFailure>,
    /// Candidates not yet answered, in call order
    pending: Vec<String>,
}

/// Orchestrates cache, selector, resilience and registry
#[derive(Debug)]
pub struct RouletteEngine {
    registry: Arc<ProviderRegistry>,
    resilience: Resilience,
    cache: Arc<ResultCache>,
    selector: Selector,
    config: EngineConfig,
}

impl RouletteEngine {
    /// Engine over an already populated registry
    pub fn new(config: &Config, registry: Arc<ProviderRegistry>) -> Self {
        let resilience = Resilience::new(
            Arc::clone(&registry),
            config.retry.clone(),
            config.engine.provider_timeout(),
        );

        Self {
            registry,
            resilience,
            cache: Arc::new(ResultCache::new(config.cache.clone())),
            selector: Selector::new(config.engine.strategy),
            config: config.engine.clone(),
        }
    }

    /// Validate `config`, build its providers and register them
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ProviderRegistry::new(config.breaker.clone()));
        for entry in build_providers(config)? {
            registry.register(entry)?;
        }
        info!(providers = registry.len(), "Roulette engine ready");

        Ok(Self::new(config, registry))
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Snapshot of every provider and its health
    pub fn health(&self) -> Vec<ProviderDescriptor> {
        self.registry.list(false)
    }

    /// Enable or disable a provider; returns false for unknown ids
    pub fn set_enabled(&self, provider: &str, enabled: bool) -> bool {
        self.registry.set_enabled(provider, enabled)
    }

    /// Number of items a request will actually receive at most
    pub fn effective_count(&self, request: &Request) -> usize {
        match request.count {
            0 => self.config.default_count,
            n => n.min(self.config.max_count),
        }
    }

    /// Serve one request
    pub async fn spin(&self, request: &Request) -> Outcome {
        let span = info_span!(
            "spin",
            spin_id = %Uuid::new_v4(),
            user = %request.requester.user_id,
        );
        let started = Instant::now();

        let outcome = self.run(request).instrument(span.clone()).await;

        span.in_scope(|| match &outcome {
            Outcome::Success(success) => info!(
                items = success.items.len(),
                requested = success.requested,
                providers = ?success.providers,
                cache_hit = success.cache_hit,
                "Spin succeeded"
            ),
            Outcome::Exhausted(exhausted) => warn!(
                reason = ?exhausted.reason(),
                errors = exhausted.errors.len(),
                "Spin exhausted"
            ),
        });
        metrics::record_spin(outcome.label(), started.elapsed().as_secs_f64());

        outcome
    }

    async fn run(&self, request: &Request) -> Outcome {
        let wanted = self.effective_count(request);
        let query = normalize_query(request.query.as_deref());
        let cache_key = ResultCache::key_for(query.as_deref(), request.provider.as_deref());

        let mut state = SpinState {
            accumulator: Accumulator::new(&request.exclusions, wanted),
            failures: Vec::new(),
            pending: Vec::new(),
        };

        let cache_hit = self.serve_from_cache(&cache_key, &mut state);
        if state.accumulator.is_full() {
            debug!(items = state.accumulator.len(), "Served entirely from cache");
            return Self::finish(state, wanted, true, false);
        }

        let selection = {
            let descriptors = self.registry.list(false);
            let mut rng = rand::thread_rng();
            self.selector.select(request, &descriptors, &mut rng)
        };
        state.failures.extend(selection.skipped);

        let ask = self.config.prefetch.max(state.accumulator.remaining());
        let timed_out = tokio::time::timeout(
            self.config.request_timeout(),
            self.fetch_candidates(&selection.candidates, query.as_deref(), ask, &cache_key, &mut state),
        )
        .await
        .is_err();

        if timed_out {
            // Buffered calls run in candidate order: the first `fan_out`
            // unanswered candidates were in flight.
            let in_flight = self.config.fan_out.max(1).min(state.pending.len());
            for provider in state.pending.drain(..in_flight) {
                warn!(provider = %provider, "Spin deadline reached, abandoning call");
                state
                    .failures
                    .push(ProviderFailure::new(provider, ProviderError::Timeout));
            }
        }

        Self::finish(state, wanted, cache_hit, timed_out)
    }

    /// Offer cached items; returns whether any were accepted
    fn serve_from_cache(&self, key: &str, state: &mut SpinState<'_>) -> bool {
        let Some(cached) = self.cache.get(key) else {
            return false;
        };

        let usable = cached
            .iter()
            .filter(|item| item.served_by().all(|id| self.registry.is_enabled(id)))
            .cloned();
        let accepted = state.accumulator.offer_all(usable);
        debug!(cached = cached.len(), accepted = accepted, "Cache hit");

        accepted > 0
    }

    async fn fetch_candidates(
        &self,
        candidates: &[ProviderDescriptor],
        query: Option<&str>,
        ask: usize,
        cache_key: &str,
        state: &mut SpinState<'_>,
    ) {
        state.pending = candidates.iter().map(|d| d.id.clone()).collect();

        let mut answers = stream::iter(candidates.iter().map(|descriptor| {
            let id = descriptor.id.as_str();
            async move { (id, self.resilience.fetch(id, query, ask).await) }
        }))
        .buffered(self.config.fan_out.max(1));

        let mut fresh: Vec<MediaItem> = Vec::new();
        while let Some((id, result)) = answers.next().await {
            if let Some(pos) = state.pending.iter().position(|p| p == id) {
                state.pending.remove(pos);
            }

            match result {
                Ok(items) => {
                    fresh.extend(items.iter().cloned());
                    self.cache.put_default(cache_key, fresh.clone());

                    let accepted = state.accumulator.offer_all(items);
                    debug!(provider = %id, accepted = accepted, "Provider answered");
                    if accepted == 0 {
                        // Everything was already seen or already taken.
                        state
                            .failures
                            .push(ProviderFailure::new(id, ProviderError::NoResults));
                    }
                }
                Err(error) => {
                    debug!(provider = %id, error = %error, "Candidate failed");
                    state.failures.push(ProviderFailure::new(id, error));
                }
            }

            if state.accumulator.is_full() {
                break;
            }
        }

        // Calls still buffered are dropped, not timed out.
        state.pending.clear();
    }

    fn finish(state: SpinState<'_>, wanted: usize, cache_hit: bool, timed_out: bool) -> Outcome {
        let SpinState {
            accumulator,
            failures,
            ..
        } = state;
        let (items, providers) = accumulator.into_parts();

        if items.is_empty() {
            return Outcome::Exhausted(SpinExhausted {
                errors: failures,
                timed_out,
            });
        }

        Outcome::Success(SpinSuccess {
            items,
            providers,
            cache_hit,
            requested: wanted,
            failures,
        })
    }
}
