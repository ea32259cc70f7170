//! Scenario tests for the roulette engine
//!
//! Every test runs on tokio's paused clock, so provider delays and
//! timeouts resolve instantly and deterministically.

mod common;

use common::{engine_with, test_config, Behavior, FakeProvider};
use media_roulette::config::Config;
use media_roulette::engine::RouletteEngine;
use media_roulette::models::{
    Capabilities, ExhaustReason, HealthState, ItemKey, Outcome, Request, Requester, SpinExhausted,
    SpinSuccess,
};
use media_roulette::provider::corpus::CorpusProvider;
use media_roulette::registry::{ProviderEntry, ProviderRegistry};
use media_roulette::utils::error::ProviderError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn request() -> Request {
    Request::new(Requester::user("u1").in_guild("g1"))
}

fn expect_success(outcome: Outcome) -> SpinSuccess {
    match outcome {
        Outcome::Success(success) => success,
        Outcome::Exhausted(e) => panic!("expected success, got exhausted: {:?}", e.errors),
    }
}

fn expect_exhausted(outcome: Outcome) -> SpinExhausted {
    match outcome {
        Outcome::Exhausted(exhausted) => exhausted,
        Outcome::Success(s) => panic!("expected exhausted, got {} items", s.items.len()),
    }
}

fn failure_providers(failures: &[media_roulette::models::ProviderFailure]) -> Vec<&str> {
    failures.iter().map(|f| f.provider.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_timeout_falls_through_to_next_weight() {
    let a = FakeProvider::new("a", vec![Behavior::Hang]);
    let b = FakeProvider::items("b", &["b1"]);
    let c = FakeProvider::items("c", &["c1"]);
    let config = test_config();
    let engine = engine_with(&config, vec![(a.clone(), 10), (b.clone(), 5), (c.clone(), 1)]);

    let success = expect_success(engine.spin(&request().with_count(1)).await);

    assert_eq!(success.items.len(), 1);
    assert_eq!(success.items[0].key(), ItemKey::new("b", "b1"));
    assert_eq!(success.providers, vec!["b"]);
    assert_eq!(success.failures.len(), 1);
    assert_eq!(success.failures[0].provider, "a");
    assert_eq!(success.failures[0].error, ProviderError::Timeout);
    assert_eq!(c.calls(), 0);

    // One failure is below the threshold of two.
    let a_health = engine.registry().descriptor("a").unwrap();
    assert_eq!(a_health.health, HealthState::Closed);
    assert_eq!(a_health.consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_default_config_leaves_room_for_fallback() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let a = FakeProvider::new("a", vec![Behavior::Hang]);
    let b = FakeProvider::items("b", &["b1", "b2", "b3", "b4", "b5"]);
    let c = FakeProvider::items("c", &["c1"]);
    let engine = engine_with(&config, vec![(a.clone(), 10), (b.clone(), 5), (c.clone(), 1)]);

    let success = expect_success(engine.spin(&request()).await);

    assert_eq!(success.providers, vec!["b"]);
    assert_eq!(failure_providers(&success.failures), vec!["a"]);
    assert_eq!(success.failures[0].error, ProviderError::Timeout);
    assert_eq!(a.calls() as u32, config.retry.max_retries + 1);
    assert_eq!(b.calls(), 1);
    assert_eq!(c.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_all_open_short_circuits_without_calls() {
    let a = FakeProvider::new("a", vec![Behavior::Fail(ProviderError::unavailable("down"))]);
    let b = FakeProvider::new("b", vec![Behavior::Fail(ProviderError::unavailable("down"))]);
    let config = test_config();
    let engine = engine_with(&config, vec![(a.clone(), 2), (b.clone(), 1)]);

    for _ in 0..2 {
        expect_exhausted(engine.spin(&request()).await);
    }
    assert_eq!(a.calls(), 2);
    assert_eq!(b.calls(), 2);

    let started = tokio::time::Instant::now();
    let exhausted = expect_exhausted(engine.spin(&request()).await);

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(a.calls(), 2);
    assert_eq!(b.calls(), 2);
    assert_eq!(failure_providers(&exhausted.errors), vec!["a", "b"]);
    assert!(exhausted
        .errors
        .iter()
        .all(|f| f.error == ProviderError::CircuitOpen));
    assert_eq!(exhausted.reason(), ExhaustReason::Unavailable);
}

#[tokio::test(start_paused = true)]
async fn test_count_is_merged_across_providers() {
    let a = FakeProvider::items("a", &["1", "2"]);
    let b = FakeProvider::new("b", vec![Behavior::Fresh]);
    let config = test_config();
    let engine = engine_with(&config, vec![(a.clone(), 10), (b.clone(), 5)]);

    let success = expect_success(engine.spin(&request().with_count(3)).await);

    assert_eq!(success.items.len(), 3);
    assert!(!success.is_partial());
    assert_eq!(success.providers, vec!["a", "b"]);
    let keys: HashSet<ItemKey> = success.items.iter().map(|i| i.key()).collect();
    assert_eq!(keys.len(), 3);
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_candidate_order_is_stable_across_spins() {
    let a = FakeProvider::new("a", vec![Behavior::Fail(ProviderError::NoResults)]);
    let b = FakeProvider::new("b", vec![Behavior::Fail(ProviderError::NoResults)]);
    let c = FakeProvider::new("c", vec![Behavior::Fail(ProviderError::NoResults)]);
    let config = test_config();
    let engine = engine_with(&config, vec![(c.clone(), 1), (a.clone(), 5), (b.clone(), 5)]);

    let first = expect_exhausted(engine.spin(&request()).await);
    let second = expect_exhausted(engine.spin(&request()).await);

    assert_eq!(failure_providers(&first.errors), vec!["a", "b", "c"]);
    assert_eq!(
        failure_providers(&first.errors),
        failure_providers(&second.errors)
    );
    assert_eq!(first.reason(), ExhaustReason::NoMedia);
}

#[tokio::test(start_paused = true)]
async fn test_no_results_never_trips_breaker() {
    let a = FakeProvider::new("a", vec![Behavior::Fail(ProviderError::NoResults)]);
    let config = test_config();
    let engine = engine_with(&config, vec![(a.clone(), 1)]);

    for _ in 0..10 {
        expect_exhausted(engine.spin(&request()).await);
    }

    let descriptor = engine.registry().descriptor("a").unwrap();
    assert_eq!(descriptor.health, HealthState::Closed);
    assert_eq!(descriptor.consecutive_failures, 0);
    assert_eq!(a.calls(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_excluded_items_are_never_returned() {
    let a = FakeProvider::items("a", &["1", "2", "3"]);
    let b = FakeProvider::items("b", &["1"]);
    let config = test_config();
    let engine = engine_with(&config, vec![(a.clone(), 10), (b.clone(), 1)]);

    let excluded = [ItemKey::new("a", "1"), ItemKey::new("a", "2")];
    let success = expect_success(
        engine
            .spin(&request().with_count(2).excluding(excluded.clone()))
            .await,
    );

    let keys: Vec<ItemKey> = success.items.iter().map(|i| i.key()).collect();
    assert_eq!(keys, vec![ItemKey::new("a", "3"), ItemKey::new("b", "1")]);
    assert!(keys.iter().all(|k| !excluded.contains(k)));
}

#[tokio::test(start_paused = true)]
async fn test_fully_excluded_answer_counts_as_no_results() {
    let a = FakeProvider::items("a", &["1"]);
    let config = test_config();
    let engine = engine_with(&config, vec![(a.clone(), 1)]);

    let exhausted = expect_exhausted(
        engine
            .spin(&request().excluding([ItemKey::new("a", "1")]))
            .await,
    );

    assert_eq!(exhausted.errors.len(), 1);
    assert_eq!(exhausted.errors[0].error, ProviderError::NoResults);
    assert_eq!(exhausted.reason(), ExhaustReason::NoMedia);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_trial_after_cooldown() {
    let a = FakeProvider::new(
        "a",
        vec![
            Behavior::Fail(ProviderError::unavailable("down")),
            Behavior::Fail(ProviderError::unavailable("down")),
            Behavior::Fresh,
        ],
    );
    let b = FakeProvider::new("b", vec![Behavior::Fresh]);
    let config = test_config();
    let engine = engine_with(&config, vec![(a.clone(), 10), (b.clone(), 1)]);

    // Each spin must reach the providers, not the cache.
    for _ in 0..2 {
        engine.cache().clear();
        expect_success(engine.spin(&request()).await);
    }
    assert_eq!(
        engine.registry().descriptor("a").unwrap().health,
        HealthState::Open
    );

    // While open, "a" is skipped and reported.
    engine.cache().clear();
    let success = expect_success(engine.spin(&request()).await);
    assert_eq!(a.calls(), 2);
    assert_eq!(success.providers, vec!["b"]);
    assert_eq!(success.failures[0].error, ProviderError::CircuitOpen);

    tokio::time::advance(Duration::from_millis(1_000)).await;
    assert_eq!(
        engine.registry().descriptor("a").unwrap().health,
        HealthState::HalfOpen
    );

    engine.cache().clear();
    let success = expect_success(engine.spin(&request()).await);
    assert_eq!(a.calls(), 3);
    assert_eq!(success.providers, vec!["a"]);
    assert_eq!(
        engine.registry().descriptor("a").unwrap().health,
        HealthState::Closed
    );
}

#[tokio::test(start_paused = true)]
async fn test_overall_deadline_abandons_in_flight_calls() {
    let a = FakeProvider::new("a", vec![Behavior::Hang]);
    let b = FakeProvider::new("b", vec![Behavior::Hang]);
    let mut config = test_config();
    config.engine.request_timeout_ms = 300;
    config.engine.provider_timeout_ms = 1_000;
    config.engine.fan_out = 2;
    let engine = engine_with(&config, vec![(a.clone(), 2), (b.clone(), 1)]);

    let started = tokio::time::Instant::now();
    let exhausted = expect_exhausted(engine.spin(&request()).await);

    assert_eq!(started.elapsed(), Duration::from_millis(300));
    assert!(exhausted.timed_out);
    assert_eq!(exhausted.reason(), ExhaustReason::TimedOut);
    assert_eq!(failure_providers(&exhausted.errors), vec!["a", "b"]);
    assert!(exhausted
        .errors
        .iter()
        .all(|f| f.error == ProviderError::Timeout));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_with_some_items_is_partial_success() {
    let a = FakeProvider::items("a", &["1"]);
    let b = FakeProvider::new("b", vec![Behavior::Hang]);
    let mut config = test_config();
    config.engine.request_timeout_ms = 300;
    config.engine.provider_timeout_ms = 1_000;
    let engine = engine_with(&config, vec![(a.clone(), 2), (b.clone(), 1)]);

    let success = expect_success(engine.spin(&request().with_count(2)).await);

    assert!(success.is_partial());
    assert_eq!(success.items.len(), 1);
    assert_eq!(success.failures.len(), 1);
    assert_eq!(success.failures[0].provider, "b");
    assert_eq!(success.failures[0].error, ProviderError::Timeout);
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_takes_first_candidate_answers_in_order() {
    let a = FakeProvider::new("a", vec![Behavior::Slow(Duration::from_millis(200))]);
    let b = FakeProvider::new("b", vec![Behavior::Slow(Duration::from_millis(50))]);
    let mut config = test_config();
    config.engine.fan_out = 2;
    let engine = engine_with(&config, vec![(a.clone(), 2), (b.clone(), 1)]);

    let success = expect_success(engine.spin(&request().with_count(1)).await);

    assert_eq!(success.providers, vec!["a"]);
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pinned_provider() {
    let a = FakeProvider::new("a", vec![Behavior::Fresh]);
    let plain = FakeProvider::with_capabilities("plain", Capabilities::new(false, false), vec![]);
    let config = test_config();
    let engine = engine_with(&config, vec![(a.clone(), 10), (plain.clone(), 1)]);

    let success = expect_success(engine.spin(&request().pinned_to("plain")).await);
    assert_eq!(success.providers, vec!["plain"]);
    assert_eq!(a.calls(), 0);

    let exhausted = expect_exhausted(
        engine
            .spin(&request().pinned_to("plain").with_query("cats"))
            .await,
    );
    assert!(matches!(
        exhausted.errors[0].error,
        ProviderError::Unsupported { .. }
    ));
    assert_eq!(exhausted.reason(), ExhaustReason::Rejected);

    let exhausted = expect_exhausted(engine.spin(&request().pinned_to("ghost")).await);
    assert_eq!(
        exhausted.errors[0].error,
        ProviderError::UnknownProvider { id: "ghost".into() }
    );
    assert_eq!(exhausted.reason(), ExhaustReason::Rejected);

    engine.set_enabled("a", false);
    let exhausted = expect_exhausted(engine.spin(&request().pinned_to("a")).await);
    assert_eq!(exhausted.errors[0].error, ProviderError::Disabled);
    assert_eq!(a.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_query_skips_incapable_providers() {
    let plain = FakeProvider::with_capabilities("plain", Capabilities::new(false, false), vec![]);
    let search = FakeProvider::new("search", vec![Behavior::Fresh]);
    let config = test_config();
    let engine = engine_with(&config, vec![(plain.clone(), 10), (search.clone(), 1)]);

    let success = expect_success(engine.spin(&request().with_query("  Cats  ")).await);

    assert_eq!(success.providers, vec!["search"]);
    assert_eq!(plain.calls(), 0);
    assert_eq!(search.queries(), vec![Some("cats".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_is_filtered_by_exclusions() {
    let a = FakeProvider::items("a", &["1", "2"]);
    let mut config = test_config();
    config.engine.prefetch = 2;
    let engine = engine_with(&config, vec![(a.clone(), 1)]);

    let first = expect_success(engine.spin(&request().with_query("cats")).await);
    assert!(!first.cache_hit);
    assert_eq!(first.items[0].id(), "1");

    let second = expect_success(
        engine
            .spin(
                &request()
                    .with_query("CATS")
                    .excluding([ItemKey::new("a", "1")]),
            )
            .await,
    );
    assert!(second.cache_hit);
    assert_eq!(second.items[0].id(), "2");
    assert_eq!(a.calls(), 1);

    // Both cached items seen: falls through to a live fetch.
    let third = engine
        .spin(
            &request()
                .with_query("cats")
                .excluding([ItemKey::new("a", "1"), ItemKey::new("a", "2")]),
        )
        .await;
    assert!(!third.is_success());
    assert_eq!(a.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_provider_is_not_called() {
    let a = FakeProvider::new("a", vec![Behavior::Fresh]);
    let b = FakeProvider::new("b", vec![Behavior::Fresh]);
    let config = test_config();
    let engine = engine_with(&config, vec![(a.clone(), 10), (b.clone(), 1)]);

    assert!(engine.set_enabled("a", false));
    let success = expect_success(engine.spin(&request()).await);

    assert_eq!(success.providers, vec!["b"]);
    assert!(success.failures.is_empty());
    assert_eq!(a.calls(), 0);
    assert!(!engine.health().iter().find(|d| d.id == "a").unwrap().enabled);
}

#[tokio::test(start_paused = true)]
async fn test_seen_history_drives_exclusions_across_spins() {
    use media_roulette::history::{HistoryConfig, SeenHistory};

    let a = FakeProvider::items("a", &["1", "2", "3"]);
    let engine = engine_with(&test_config(), vec![(a.clone(), 1)]);
    let history = SeenHistory::new(HistoryConfig::default());

    let mut shown = Vec::new();
    for _ in 0..3 {
        let request = request().excluding(history.exclusion_set("g1"));
        let success = expect_success(engine.spin(&request).await);
        assert_eq!(success.items.len(), 1);
        history.record("g1", &success.items);
        shown.push(success.items[0].id().to_string());
    }
    shown.sort();
    assert_eq!(shown, vec!["1", "2", "3"]);

    let request = request().excluding(history.exclusion_set("g1"));
    let exhausted = expect_exhausted(engine.spin(&request).await);
    assert_eq!(exhausted.reason(), ExhaustReason::NoMedia);

    history.clear("g1");
    let request = self::request().excluding(history.exclusion_set("g1"));
    assert_eq!(expect_success(engine.spin(&request).await).items.len(), 1);
}

/// Corpus "words" (weight 10) feeding queries to `inner` (weight 1)
fn corpus_engine(config: &Config, inner: Arc<FakeProvider>) -> RouletteEngine {
    let registry = Arc::new(ProviderRegistry::new(config.breaker.clone()));
    let corpus = CorpusProvider::new("words", vec!["cats".to_string()], inner.clone()).unwrap();
    registry
        .register(ProviderEntry::new(Arc::new(corpus), 10))
        .unwrap();
    registry.register(ProviderEntry::new(inner, 1)).unwrap();
    RouletteEngine::new(config, registry)
}

#[tokio::test(start_paused = true)]
async fn test_corpus_respects_disabled_delegate() {
    let inner = FakeProvider::new("inner", vec![Behavior::Fresh]);
    let engine = corpus_engine(&test_config(), inner.clone());
    engine.set_enabled("inner", false);

    let exhausted = expect_exhausted(engine.spin(&request()).await);

    assert_eq!(inner.calls(), 0);
    assert_eq!(failure_providers(&exhausted.errors), vec!["words"]);
    assert_eq!(exhausted.errors[0].error, ProviderError::Disabled);
    // The corpus itself was not charged for its delegate being off.
    let words = engine.registry().descriptor("words").unwrap();
    assert_eq!(words.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_corpus_failures_open_the_delegate_breaker() {
    let inner = FakeProvider::new("inner", vec![Behavior::Fail(ProviderError::unavailable("down"))]);
    let engine = corpus_engine(&test_config(), inner.clone());

    for _ in 0..2 {
        expect_exhausted(engine.spin(&request().pinned_to("words")).await);
    }
    assert_eq!(inner.calls(), 2);
    assert_eq!(
        engine.registry().descriptor("inner").unwrap().health,
        HealthState::Open
    );
}

#[tokio::test(start_paused = true)]
async fn test_corpus_short_circuits_on_open_delegate() {
    let inner = FakeProvider::new("inner", vec![Behavior::Fail(ProviderError::unavailable("down"))]);
    let engine = corpus_engine(&test_config(), inner.clone());

    for _ in 0..2 {
        expect_exhausted(engine.spin(&request().pinned_to("inner")).await);
    }
    assert_eq!(
        engine.registry().descriptor("words").unwrap().health,
        HealthState::Closed
    );

    let exhausted = expect_exhausted(engine.spin(&request().pinned_to("words")).await);

    assert_eq!(failure_providers(&exhausted.errors), vec!["words"]);
    assert_eq!(exhausted.errors[0].error, ProviderError::CircuitOpen);
    assert_eq!(inner.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cached_corpus_items_follow_the_corpus_flag() {
    let mut config = test_config();
    config.engine.prefetch = 4;
    let inner = FakeProvider::new("inner", vec![Behavior::Fresh]);
    let engine = corpus_engine(&config, inner.clone());

    let first = expect_success(engine.spin(&request()).await);
    assert_eq!(first.items[0].via(), Some("words"));
    assert_eq!(inner.queries()[0].as_deref(), Some("cats"));

    engine.set_enabled("words", false);
    let second = expect_success(engine.spin(&request()).await);

    assert!(!second.cache_hit);
    assert_eq!(inner.calls(), 2);
    assert_eq!(second.items[0].via(), None);
}
