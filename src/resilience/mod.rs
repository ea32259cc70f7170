//! Resilience wrapper around provider calls
//!
//! Every provider call made by the engine goes through [`Resilience::fetch`]:
//! - the provider's circuit breaker admits or short-circuits the call
//! - each attempt runs under a fixed per-call deadline
//! - transient failures (`Unavailable`, `Timeout`) are retried with
//!   exponential backoff and jitter
//! - the final result is recorded once against the breaker
//!
//! A half-open trial gets exactly one attempt. If the caller abandons a
//! trial (for example when the spin deadline fires), the trial slot is
//! handed back so the next call can try again.

pub mod breaker;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::metrics;
use crate::models::MediaItem;
use crate::registry::ProviderRegistry;
use crate::utils::error::ProviderError;
use crate::utils::retry::{with_retry_if, RetryConfig};

use self::breaker::Admission;

/// Returns an unfinished trial slot to the breaker when dropped
struct TrialGuard<'a> {
    registry: &'a ProviderRegistry,
    provider: &'a str,
    armed: bool,
}

impl TrialGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(provider = %self.provider, "Trial call abandoned, releasing slot");
            self.registry.release_trial(self.provider);
        }
    }
}

/// Timeout, retry and circuit breaking for provider calls
#[derive(Debug, Clone)]
pub struct Resilience {
    registry: Arc<ProviderRegistry>,
    retry: RetryConfig,
    call_timeout: Duration,
}

impl Resilience {
    pub fn new(registry: Arc<ProviderRegistry>, retry: RetryConfig, call_timeout: Duration) -> Self {
        Self {
            registry,
            retry,
            call_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Call a provider with resilience applied
    ///
    /// An `Ok` result always holds at least one item; an empty answer is
    /// reported as `NoResults`.
    pub async fn fetch(
        &self,
        provider_id: &str,
        query: Option<&str>,
        count: usize,
    ) -> Result<Vec<MediaItem>, ProviderError> {
        let result = self.call(provider_id, query, count).await;

        let label = match &result {
            Ok(_) => "success",
            Err(e) => e.label(),
        };
        metrics::record_provider_call(provider_id, label);

        result
    }

    async fn call(
        &self,
        provider_id: &str,
        query: Option<&str>,
        count: usize,
    ) -> Result<Vec<MediaItem>, ProviderError> {
        let provider = self.registry.provider(provider_id).ok_or_else(|| {
            ProviderError::UnknownProvider {
                id: provider_id.to_string(),
            }
        })?;

        // A delegating provider also needs its delegate's admission.
        let mut guards = vec![self.admit(provider_id)?];
        if let Some(delegate) = provider.delegate() {
            guards.push(self.admit(delegate)?);
        }

        let retry = if guards.iter().any(|g| g.armed) {
            RetryConfig::disabled()
        } else {
            self.retry.clone()
        };

        let call_timeout = self.call_timeout;
        let result = with_retry_if(
            &retry,
            |attempt| {
                let provider = Arc::clone(&provider);
                async move {
                    debug!(provider = %provider_id, attempt = attempt, "Calling provider");
                    match tokio::time::timeout(call_timeout, provider.fetch(query, count)).await {
                        Ok(Ok(items)) if items.is_empty() => Err(ProviderError::NoResults),
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout),
                    }
                }
            },
            ProviderError::is_transient,
        )
        .await;

        for guard in &mut guards {
            self.record(guard.provider, &result);
            guard.disarm();
        }

        result
    }

    fn admit<'a>(&'a self, provider_id: &'a str) -> Result<TrialGuard<'a>, ProviderError> {
        let admission = self.registry.admit(provider_id).inspect_err(|e| {
            debug!(provider = %provider_id, reason = %e, "Call short-circuited");
        })?;

        Ok(TrialGuard {
            registry: &self.registry,
            provider: provider_id,
            armed: admission == Admission::Trial,
        })
    }

    fn record(&self, provider_id: &str, result: &Result<Vec<MediaItem>, ProviderError>) {
        match result {
            Ok(items) => {
                debug!(provider = %provider_id, items = items.len(), "Provider call succeeded");
                self.registry.record_success(provider_id);
            }
            Err(e) if e.counts_toward_breaker() => {
                warn!(provider = %provider_id, error = %e, "Provider call failed");
                self.registry.record_failure(provider_id);
            }
            Err(e) => {
                debug!(provider = %provider_id, reason = %e, "Provider had nothing usable");
                self.registry.record_neutral(provider_id);
            }
        }
    }
}
