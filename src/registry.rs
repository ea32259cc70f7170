//! Provider registry
//!
//! Holds every configured provider together with its weight, enable flag
//! and circuit breaker. Slots live in a sharded concurrent map, so health
//! updates for one provider never wait on another provider's traffic.
//!
//! Breaker state is only changed through [`admit`](ProviderRegistry::admit)
//! and the `record_*` methods, which the resilience wrapper calls.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics;
use crate::models::{Capabilities, HealthState, ProviderDescriptor};
use crate::provider::MediaProvider;
use crate::resilience::breaker::{Admission, BreakerConfig, CircuitBreaker};
use crate::utils::error::ProviderError;

/// A provider ready to be registered
pub struct ProviderEntry {
    pub provider: Arc<dyn MediaProvider>,
    pub weight: u32,
    pub enabled: bool,
    pub capabilities: Capabilities,
}

impl ProviderEntry {
    /// Entry using the provider's own capabilities, enabled
    pub fn new(provider: Arc<dyn MediaProvider>, weight: u32) -> Self {
        let capabilities = provider.capabilities();
        Self {
            provider,
            weight,
            enabled: true,
            capabilities,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

struct ProviderSlot {
    provider: Arc<dyn MediaProvider>,
    weight: u32,
    enabled: bool,
    capabilities: Capabilities,
    breaker: CircuitBreaker,
    order: usize,
}

impl ProviderSlot {
    fn descriptor(&self, id: &str, now: Instant) -> ProviderDescriptor {
        ProviderDescriptor {
            id: id.to_string(),
            capabilities: self.capabilities,
            weight: self.weight,
            enabled: self.enabled,
            health: self.breaker.health(now),
            consecutive_failures: self.breaker.consecutive_failures(),
            last_failure: self.breaker.last_failure(),
        }
    }
}

/// Thread-safe set of providers and their health
pub struct ProviderRegistry {
    slots: DashMap<String, ProviderSlot>,
    breaker_config: BreakerConfig,
    next_order: AtomicUsize,
}

impl ProviderRegistry {
    pub fn new(breaker_config: BreakerConfig) -> Self {
        Self {
            slots: DashMap::new(),
            breaker_config,
            next_order: AtomicUsize::new(0),
        }
    }

    /// Add a provider; ids must be unique
    pub fn register(&self, entry: ProviderEntry) -> Result<()> {
        let id = entry.provider.id().to_string();
        if id.trim().is_empty() {
            return Err(Error::config("provider id must not be empty"));
        }

        match self.slots.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(Error::config(format!("provider '{id}' is already registered")))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(ProviderSlot {
                    provider: entry.provider,
                    weight: entry.weight,
                    enabled: entry.enabled,
                    capabilities: entry.capabilities,
                    breaker: CircuitBreaker::new(self.breaker_config.clone()),
                    order: self.next_order.fetch_add(1, Ordering::Relaxed),
                });
                info!(
                    provider = %id,
                    weight = entry.weight,
                    enabled = entry.enabled,
                    "Registered provider"
                );
                Ok(())
            }
        }
    }

    /// Descriptors in registration order
    pub fn list(&self, enabled_only: bool) -> Vec<ProviderDescriptor> {
        let now = Instant::now();
        let mut ordered: Vec<(usize, ProviderDescriptor)> = self
            .slots
            .iter()
            .filter(|slot| !enabled_only || slot.enabled)
            .map(|slot| (slot.order, slot.descriptor(slot.key(), now)))
            .collect();
        ordered.sort_by_key(|(order, _)| *order);
        ordered.into_iter().map(|(_, d)| d).collect()
    }

    pub fn descriptor(&self, id: &str) -> Option<ProviderDescriptor> {
        self.slots
            .get(id)
            .map(|slot| slot.descriptor(id, Instant::now()))
    }

    pub fn provider(&self, id: &str) -> Option<Arc<dyn MediaProvider>> {
        self.slots.get(id).map(|slot| Arc::clone(&slot.provider))
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.slots.get(id).is_some_and(|slot| slot.enabled)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Enable or disable a provider; returns false for unknown ids
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let Some(mut slot) = self.slots.get_mut(id) else {
            return false;
        };
        if slot.enabled != enabled {
            slot.enabled = enabled;
            info!(provider = %id, enabled = enabled, "Provider toggled");
        }
        true
    }

    /// Ask the provider's breaker whether a call may proceed
    ///
    /// # Errors
    ///
    /// `Disabled` for switched-off providers, `CircuitOpen` while the
    /// breaker rejects calls, `Unavailable` for unknown ids.
    pub fn admit(&self, id: &str) -> std::result::Result<Admission, ProviderError> {
        let Some(mut slot) = self.slots.get_mut(id) else {
            return Err(ProviderError::UnknownProvider { id: id.to_string() });
        };
        if !slot.enabled {
            return Err(ProviderError::Disabled);
        }

        match slot.breaker.admit(Instant::now()) {
            Admission::Rejected => Err(ProviderError::CircuitOpen),
            Admission::Trial => {
                drop(slot);
                info!(provider = %id, "Circuit half-open, allowing trial call");
                metrics::record_breaker_transition(id, HealthState::HalfOpen.as_str());
                Ok(Admission::Trial)
            }
            Admission::Allowed => Ok(Admission::Allowed),
        }
    }

    /// Record a successful call
    pub fn record_success(&self, id: &str) {
        let transition = self
            .slots
            .get_mut(id)
            .and_then(|mut slot| slot.breaker.on_success());
        Self::log_transition(id, transition);
    }

    /// Record a call that answered without usable media
    pub fn record_neutral(&self, id: &str) {
        let transition = self
            .slots
            .get_mut(id)
            .and_then(|mut slot| slot.breaker.on_neutral());
        Self::log_transition(id, transition);
    }

    /// Record a transient failure
    pub fn record_failure(&self, id: &str) {
        let now = Instant::now();
        let transition = self.slots.get_mut(id).and_then(|mut slot| {
            let transition = slot.breaker.on_failure(now);
            debug!(
                provider = %id,
                consecutive_failures = slot.breaker.consecutive_failures(),
                "Provider failure recorded"
            );
            transition
        });
        Self::log_transition(id, transition);
    }

    /// Give back a trial slot whose call was abandoned
    pub fn release_trial(&self, id: &str) {
        if let Some(mut slot) = self.slots.get_mut(id) {
            slot.breaker.release_trial();
        }
    }

    /// Time of the provider's last recorded failure
    pub fn last_failure(&self, id: &str) -> Option<DateTime<Utc>> {
        self.slots.get(id).and_then(|slot| slot.breaker.last_failure())
    }

    fn log_transition(id: &str, transition: Option<HealthState>) {
        let Some(state) = transition else {
            return;
        };
        match state {
            HealthState::Open => warn!(provider = %id, "Circuit opened"),
            HealthState::Closed => info!(provider = %id, "Circuit closed"),
            HealthState::HalfOpen => info!(provider = %id, "Circuit half-open"),
        }
        metrics::record_breaker_transition(id, state.as_str());
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list(false))
            .finish()
    }
}
