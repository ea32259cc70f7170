//! Prometheus metrics for the roulette engine
//!
//! This module provides metrics tracking for:
//! - Spins: outcome counts and end-to-end duration
//! - Providers: call results and circuit breaker transitions
//! - Cache: hits, misses and evictions
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for spin-level metrics
struct SpinMetrics {
    spins: CounterVec,
    spin_duration: HistogramVec,
}

/// Container for provider and cache metrics
struct ProviderMetrics {
    calls: CounterVec,
    breaker_transitions: CounterVec,
    cache_hits: Counter,
    cache_misses: Counter,
    cache_evictions: Counter,
}

/// Global storage for spin metrics
static SPIN_METRICS: OnceLock<SpinMetrics> = OnceLock::new();

/// Global storage for provider metrics
static PROVIDER_METRICS: OnceLock<ProviderMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = media_roulette::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let spin = SpinMetrics {
        spins: register_counter_vec!(
            "roulette_spins_total",
            "Total spins by outcome",
            &["outcome"]
        )?,
        spin_duration: register_histogram_vec!(
            "roulette_spin_duration_seconds",
            "End-to-end spin duration in seconds",
            &["outcome"],
            vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
        )?,
    };

    let provider = ProviderMetrics {
        calls: register_counter_vec!(
            "roulette_provider_calls_total",
            "Provider calls by provider and result",
            &["provider", "result"]
        )?,
        breaker_transitions: register_counter_vec!(
            "roulette_breaker_transitions_total",
            "Circuit breaker transitions by provider and new state",
            &["provider", "state"]
        )?,
        cache_hits: register_counter!("roulette_cache_hits_total", "Result cache hits")?,
        cache_misses: register_counter!("roulette_cache_misses_total", "Result cache misses")?,
        cache_evictions: register_counter!(
            "roulette_cache_evictions_total",
            "Result cache entries evicted by capacity or expiry"
        )?,
    };

    SPIN_METRICS
        .set(spin)
        .map_err(|_| "Spin metrics already initialized")?;
    PROVIDER_METRICS
        .set(provider)
        .map_err(|_| "Provider metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SPIN_METRICS.get().is_some() && PROVIDER_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a finished spin
pub fn record_spin(outcome: &str, duration_secs: f64) {
    let Some(m) = SPIN_METRICS.get() else {
        return;
    };

    m.spins.with_label_values(&[outcome]).inc();
    m.spin_duration
        .with_label_values(&[outcome])
        .observe(duration_secs);
}

/// Record the result of one wrapped provider call
pub fn record_provider_call(provider: &str, result: &str) {
    if let Some(m) = PROVIDER_METRICS.get() {
        m.calls.with_label_values(&[provider, result]).inc();
    }
}

/// Record a circuit breaker transition
pub fn record_breaker_transition(provider: &str, state: &str) {
    if let Some(m) = PROVIDER_METRICS.get() {
        m.breaker_transitions
            .with_label_values(&[provider, state])
            .inc();
    }
}

/// Record a cache lookup
pub fn record_cache_lookup(hit: bool) {
    let Some(m) = PROVIDER_METRICS.get() else {
        return;
    };

    if hit {
        m.cache_hits.inc();
    } else {
        m.cache_misses.inc();
    }
}

/// Record evicted cache entries
pub fn record_cache_evictions(count: usize) {
    if count == 0 {
        return;
    }
    if let Some(m) = PROVIDER_METRICS.get() {
        m.cache_evictions.inc_by(count as f64);
    }
}

// ============================================================================
// Tests
// ============================================================================
