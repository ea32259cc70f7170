//! Candidate selection and result accumulation
//!
//! [`Selector`] turns a request and the registry's descriptors into an
//! ordered list of providers to try. [`Accumulator`] collects the items
//! those providers return, enforcing the requester's exclusion set and
//! dropping duplicates across providers.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::HashSet;
use tracing::debug;

use crate::models::{HealthState, ItemKey, MediaItem, ProviderDescriptor, ProviderFailure, Request};
use crate::utils::error::ProviderError;
use crate::utils::normalize_query;

// ============================================================================
// Selection Strategy
// ============================================================================

/// How candidates are ordered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionStrategy {
    /// Weight descending, then health, then registration order
    #[default]
    Ordered,
    /// Weighted random order: a provider's chance to come first is
    /// proportional to its weight
    Weighted,
}

// ============================================================================
// Selector
// ============================================================================

/// Ordered candidates for one spin
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Providers to try, in order
    pub candidates: Vec<ProviderDescriptor>,
    /// Providers left out for policy reasons, reported as failures
    pub skipped: Vec<ProviderFailure>,
}

impl Selection {
    pub fn candidate_ids(&self) -> Vec<&str> {
        self.candidates.iter().map(|d| d.id.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Selector {
    strategy: SelectionStrategy,
}

impl Selector {
    pub fn new(strategy: SelectionStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    /// Choose candidates for `request` among `descriptors` (registration order)
    ///
    /// Disabled providers and providers unable to serve the query are left
    /// out silently. Open providers are left out and reported as
    /// `CircuitOpen`. A request pinned to one provider yields exactly that
    /// provider or an explanation of why it cannot be used.
    pub fn select<R: Rng + ?Sized>(
        &self,
        request: &Request,
        descriptors: &[ProviderDescriptor],
        rng: &mut R,
    ) -> Selection {
        let has_query = normalize_query(request.query.as_deref()).is_some();

        if let Some(pinned) = request.provider.as_deref() {
            return Self::select_pinned(pinned, has_query, descriptors);
        }

        let mut selection = Selection::default();
        let mut eligible: Vec<&ProviderDescriptor> = Vec::new();
        for descriptor in descriptors {
            if !descriptor.enabled {
                continue;
            }
            if has_query && !descriptor.capabilities.supports_query {
                continue;
            }
            if descriptor.health == HealthState::Open {
                selection
                    .skipped
                    .push(ProviderFailure::new(&descriptor.id, ProviderError::CircuitOpen));
                continue;
            }
            eligible.push(descriptor);
        }

        match self.strategy {
            SelectionStrategy::Ordered => {
                // Stable sort keeps registration order as the last tie-break.
                eligible.sort_by_key(|d| (Reverse(d.weight), d.health.rank()));
            }
            SelectionStrategy::Weighted => weighted_shuffle(&mut eligible, rng),
        }

        selection.candidates = eligible.into_iter().cloned().collect();
        debug!(
            strategy = ?self.strategy,
            candidates = ?selection.candidate_ids(),
            skipped = selection.skipped.len(),
            "Candidates selected"
        );
        selection
    }

    fn select_pinned(pinned: &str, has_query: bool, descriptors: &[ProviderDescriptor]) -> Selection {
        let Some(descriptor) = descriptors.iter().find(|d| d.id == pinned) else {
            return Selection {
                candidates: Vec::new(),
                skipped: vec![ProviderFailure::new(
                    pinned,
                    ProviderError::UnknownProvider {
                        id: pinned.to_string(),
                    },
                )],
            };
        };

        let refusal = if !descriptor.enabled {
            Some(ProviderError::Disabled)
        } else if descriptor.health == HealthState::Open {
            Some(ProviderError::CircuitOpen)
        } else if has_query && !descriptor.capabilities.supports_query {
            Some(ProviderError::unsupported(format!(
                "provider '{pinned}' does not support queries"
            )))
        } else {
            None
        };

        match refusal {
            Some(error) => Selection {
                candidates: Vec::new(),
                skipped: vec![ProviderFailure::new(pinned, error)],
            },
            None => Selection {
                candidates: vec![descriptor.clone()],
                skipped: Vec::new(),
            },
        }
    }
}

/// Weighted random permutation (Efraimidis-Spirakis)
///
/// Each provider draws `u^(1/w)` and providers are sorted by that key
/// descending. Zero-weight providers go last in registration order.
fn weighted_shuffle<R: Rng + ?Sized>(items: &mut Vec<&ProviderDescriptor>, rng: &mut R) {
    let mut keyed: Vec<(f64, &ProviderDescriptor)> = items
        .iter()
        .map(|d| {
            let key = if d.weight == 0 {
                -1.0
            } else {
                let u: f64 = rng.gen_range(f64::EPSILON..1.0);
                u.powf(1.0 / f64::from(d.weight))
            };
            (key, *d)
        })
        .collect();

    keyed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    *items = keyed.into_iter().map(|(_, d)| d).collect();
}

// ============================================================================
// Accumulator
// ============================================================================

/// Collects items for one spin
///
/// Items in the exclusion set and items already accepted (by identity
/// across providers) are rejected. Accepting stops once the wanted count
/// is reached.
#[derive(Debug)]
pub struct Accumulator<'a> {
    exclusions: &'a HashSet<ItemKey>,
    wanted: usize,
    seen: HashSet<ItemKey>,
    items: Vec<MediaItem>,
    providers: Vec<String>,
}

impl<'a> Accumulator<'a> {
    pub fn new(exclusions: &'a HashSet<ItemKey>, wanted: usize) -> Self {
        Self {
            exclusions,
            wanted,
            seen: HashSet::new(),
            items: Vec::with_capacity(wanted),
            providers: Vec::new(),
        }
    }

    /// Offer one item; returns whether it was accepted
    pub fn offer(&mut self, item: MediaItem) -> bool {
        if self.is_full() {
            return false;
        }
        let key = item.key();
        if self.exclusions.contains(&key) || !self.seen.insert(key) {
            return false;
        }
        if !self.providers.iter().any(|p| p == item.provider()) {
            self.providers.push(item.provider().to_string());
        }
        self.items.push(item);
        true
    }

    /// Offer items in order; returns how many were accepted
    pub fn offer_all(&mut self, items: impl IntoIterator<Item = MediaItem>) -> usize {
        let mut accepted = 0;
        for item in items {
            if self.is_full() {
                break;
            }
            if self.offer(item) {
                accepted += 1;
            }
        }
        accepted
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.wanted
    }

    pub fn remaining(&self) -> usize {
        self.wanted.saturating_sub(self.items.len())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    /// Accepted items and the provider scopes they came from, in order
    pub fn into_parts(self) -> (Vec<MediaItem>, Vec<String>) {
        (self.items, self.providers)
    }
}
