//! Retry utilities for resilient provider calls
//!
//! Exponential backoff with jitter. The retry loop is generic over the
//! error type so that providers keep their own taxonomy and the caller
//! decides which errors are worth another attempt.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first call)
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,

    /// Fraction of the computed delay added as random jitter (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom max retries
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a retry configuration with custom delays and no jitter
    pub fn with_delays(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier: 2.0,
            jitter: 0.0,
        }
    }

    /// A configuration that never retries
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before `attempt` without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let delay_ms = if attempt == 0 {
            0
        } else {
            let exponential =
                self.base_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
            (exponential as u64).min(self.max_delay_ms)
        };

        Duration::from_millis(delay_ms)
    }

    /// Longest time one retried call can take when every attempt runs
    /// into `attempt_timeout`, counting maximal jitter
    pub fn worst_case(&self, attempt_timeout: Duration) -> Duration {
        (1..=self.max_retries).fold(attempt_timeout, |total, attempt| {
            let base = self.base_delay(attempt).as_millis() as f64;
            let jittered = (base * (1.0 + self.jitter.clamp(0.0, 1.0))) as u64;
            total + attempt_timeout + Duration::from_millis(jittered.min(self.max_delay_ms))
        })
    }

    /// Delay before `attempt` with jitter applied, never above `max_delay_ms`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if base.is_zero() || self.jitter <= 0.0 {
            return base;
        }

        let spread = base.as_millis() as f64 * self.jitter.min(1.0);
        let extra = rand::thread_rng().gen_range(0.0..=spread);
        let total = (base.as_millis() as f64 + extra) as u64;
        Duration::from_millis(total.min(self.max_delay_ms))
    }
}

/// Execute an operation with retry logic, retrying only errors accepted
/// by `should_retry`
///
/// The first error that `should_retry` rejects is returned immediately;
/// otherwise the last error is returned once attempts run out.
///
/// # Example
///
/// ```no_run
/// use media_roulette::utils::retry::{with_retry_if, RetryConfig};
///
/// # async fn fetch() -> Result<u32, String> { Ok(1) }
/// # #[tokio::main]
/// # async fn main() {
/// let config = RetryConfig::default();
/// let value = with_retry_if(&config, |_| fetch(), |e: &String| e.contains("network")).await;
/// # }
/// ```
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = config.calculate_delay(attempt);
            debug!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying operation after delay"
            );
            tokio::time::sleep(delay).await;
        }

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if !should_retry(&e) {
                    debug!(error = %e, "Non-retryable error encountered");
                    return Err(e);
                }
                if attempt >= config.max_retries {
                    warn!(
                        attempt = attempt,
                        max_retries = config.max_retries,
                        error = %e,
                        "Operation failed, retries exhausted"
                    );
                    return Err(e);
                }

                warn!(
                    attempt = attempt,
                    max_retries = config.max_retries,
                    error = %e,
                    "Operation failed, will retry"
                );
                attempt += 1;
            }
        }
    }
}
