//! Per-provider circuit breaker
//!
//! The breaker is an explicit tagged state with timestamps rather than a
//! set of flags. It reads `tokio::time::Instant`, so tests can drive the
//! cooldown with a paused clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::models::HealthState;

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Initial time the circuit stays open
    pub cooldown_ms: u64,

    /// Growth factor applied each time a half-open trial fails
    pub cooldown_multiplier: f64,

    /// Cap on the grown cooldown
    pub max_cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_ms: 30_000,
            cooldown_multiplier: 2.0,
            max_cooldown_ms: 300_000,
        }
    }
}

impl BreakerConfig {
    /// Cooldown after the circuit has been reopened `reopen_count` times
    pub fn cooldown(&self, reopen_count: u32) -> Duration {
        let grown = self.cooldown_ms as f64 * self.cooldown_multiplier.powi(reopen_count as i32);
        let capped = if grown.is_finite() {
            (grown as u64).min(self.max_cooldown_ms)
        } else {
            self.max_cooldown_ms
        };
        Duration::from_millis(capped)
    }
}

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through
    Closed { consecutive_failures: u32 },
    /// Calls are rejected until `until`
    Open { until: Instant, reopen_count: u32 },
    /// One trial call decides between Closed and Open
    HalfOpen {
        trial_in_flight: bool,
        reopen_count: u32,
    },
}

/// Decision for an incoming call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Normal call in the Closed state
    Allowed,
    /// The single half-open trial call
    Trial,
    /// Short-circuited, the provider must not be invoked
    Rejected,
}

/// Circuit breaker for one provider
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: BreakerState,
    last_failure: Option<DateTime<Utc>>,
    times_opened: u64,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: BreakerState::Closed {
                consecutive_failures: 0,
            },
            last_failure: None,
            times_opened: 0,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Health as seen at `now`: an Open breaker whose cooldown elapsed
    /// reports HalfOpen since its next call would be the trial
    pub fn health(&self, now: Instant) -> HealthState {
        match self.state {
            BreakerState::Closed { .. } => HealthState::Closed,
            BreakerState::Open { until, .. } if now >= until => HealthState::HalfOpen,
            BreakerState::Open { .. } => HealthState::Open,
            BreakerState::HalfOpen { .. } => HealthState::HalfOpen,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        match self.state {
            BreakerState::Closed {
                consecutive_failures,
            } => consecutive_failures,
            _ => self.config.failure_threshold,
        }
    }

    pub fn last_failure(&self) -> Option<DateTime<Utc>> {
        self.last_failure
    }

    pub fn times_opened(&self) -> u64 {
        self.times_opened
    }

    /// Decide whether a call may proceed
    pub fn admit(&mut self, now: Instant) -> Admission {
        match self.state {
            BreakerState::Closed { .. } => Admission::Allowed,
            BreakerState::Open {
                until,
                reopen_count,
            } => {
                if now >= until {
                    self.state = BreakerState::HalfOpen {
                        trial_in_flight: true,
                        reopen_count,
                    };
                    Admission::Trial
                } else {
                    Admission::Rejected
                }
            }
            BreakerState::HalfOpen {
                trial_in_flight: true,
                ..
            } => Admission::Rejected,
            BreakerState::HalfOpen {
                trial_in_flight: false,
                reopen_count,
            } => {
                self.state = BreakerState::HalfOpen {
                    trial_in_flight: true,
                    reopen_count,
                };
                Admission::Trial
            }
        }
    }

    /// Record a successful call; returns the new state if it changed
    pub fn on_success(&mut self) -> Option<HealthState> {
        match self.state {
            BreakerState::Closed { .. } => {
                self.state = BreakerState::Closed {
                    consecutive_failures: 0,
                };
                None
            }
            BreakerState::HalfOpen { .. } => {
                self.state = BreakerState::Closed {
                    consecutive_failures: 0,
                };
                Some(HealthState::Closed)
            }
            // A call admitted before the circuit opened; the open decision stands.
            BreakerState::Open { .. } => None,
        }
    }

    /// Record a call that answered without a usable result but without a
    /// transport failure (e.g. no results). Closed counters are untouched;
    /// a half-open trial that got an answer closes the circuit.
    pub fn on_neutral(&mut self) -> Option<HealthState> {
        match self.state {
            BreakerState::HalfOpen { .. } => self.on_success(),
            _ => None,
        }
    }

    /// Record a transient failure; returns the new state if it changed
    pub fn on_failure(&mut self, now: Instant) -> Option<HealthState> {
        self.last_failure = Some(Utc::now());
        match self.state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.config.failure_threshold {
                    self.open(now, 0);
                    Some(HealthState::Open)
                } else {
                    self.state = BreakerState::Closed {
                        consecutive_failures: failures,
                    };
                    None
                }
            }
            BreakerState::HalfOpen { reopen_count, .. } => {
                self.open(now, reopen_count.saturating_add(1));
                Some(HealthState::Open)
            }
            BreakerState::Open { .. } => None,
        }
    }

    /// Give back a half-open trial slot whose call never completed
    pub fn release_trial(&mut self) {
        if let BreakerState::HalfOpen {
            trial_in_flight: true,
            reopen_count,
        } = self.state
        {
            self.state = BreakerState::HalfOpen {
                trial_in_flight: false,
                reopen_count,
            };
        }
    }

    fn open(&mut self, now: Instant, reopen_count: u32) {
        self.state = BreakerState::Open {
            until: now + self.config.cooldown(reopen_count),
            reopen_count,
        };
        self.times_opened += 1;
    }
}
