//! Integration tests for the refresh cycle
//!
//! Single-flight scheduling, duplicate suppression and the end-to-end
//! score → persist → select → enrich flow over `MemoryResultStore`

mod common;

use common::*;
use signal_refresh::{
    should_suppress, Action, EnrichmentStatus, MemoryResultStore, PipelineConfig, ProviderError,
    RefreshSystemBuilder, SignalAction, SingleFlightGuard, TriggerStatus,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// A second start is refused until the first run finishes
#[test]
fn test_single_flight_try_start() {
    let guard = SingleFlightGuard::new("refresh");

    assert!(guard.try_start());
    assert!(guard.is_running());
    assert!(!guard.try_start(), "Second start must be refused");

    guard.finish();
    assert!(!guard.is_running());
    assert!(guard.try_start());
}

/// Dropping a permit releases the guard, including on early return
#[test]
fn test_run_permit_releases_on_drop() {
    let guard = SingleFlightGuard::new("refresh");

    fn failing_run(guard: &SingleFlightGuard) -> Result<(), &'static str> {
        let _permit = guard.acquire().ok_or("busy")?;
        Err("upstream exploded")
    }

    assert_eq!(failing_run(&guard), Err("upstream exploded"));
    assert!(!guard.is_running());

    let permit = guard.acquire();
    assert!(permit.is_some());
    assert!(guard.acquire().is_none());
    drop(permit);
    assert!(guard.acquire().is_some());
}

/// Records inside the window are suppressed, older ones are not
#[test]
fn test_duplicate_window() {
    let now = SystemTime::now();
    let window = Duration::from_millis(60_000);

    assert!(should_suppress(Some(now - Duration::from_millis(1_000)), now, window));
    assert!(!should_suppress(Some(now - Duration::from_millis(61_000)), now, window));
    assert!(!should_suppress(None, now, window));
}

/// Full cycle: failures isolated, results stored, top-K explained
#[tokio::test]
async fn test_end_to_end_cycle() {
    let scorer = Arc::new(
        FakeScorer::new()
            .with_score("ASSET1", SignalAction::Buy, 0.9, 0.5)
            .with_score("ASSET2", SignalAction::Sell, 0.5, 0.9)
            .with_failure("ASSET3", "exchange maintenance"),
    );
    let explainer = Arc::new(FakeExplainer::succeeding());
    let store = Arc::new(MemoryResultStore::new(work_items(6)));
    let config = PipelineConfig {
        enrichment_top_k: 2,
        ..fast_pipeline_config()
    };
    let system = build_system(config, scorer.clone(), explainer.clone(), store.clone());

    let report = system
        .cycle()
        .run_if_idle()
        .await
        .unwrap_or_else(|e| panic!("Cycle failed: {e}"))
        .unwrap_or_else(|| panic!("Cycle was skipped"));

    assert_eq!(report.items, 6);
    assert_eq!(report.scored, 5);
    assert_eq!(report.failed, 1);
    assert_eq!(report.suppressed, 0);
    assert_eq!(report.persisted, 5);
    assert_eq!(report.enriched, 2);
    assert_eq!(report.enrichment_failures, 0);
    assert!(!system.cycle().is_running());

    let results = store.results();
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.action() != Action::Error));

    let enrichments = store.enrichments();
    assert_eq!(enrichments.len(), 2);
    let explained: Vec<&str> = enrichments
        .iter()
        .filter_map(|e| e.explanation.as_ref().map(|x| x.text.as_str()))
        .collect();
    assert!(explained.contains(&"BUY on ASSET1"));
    assert!(explained.contains(&"SELL on ASSET2"));
    assert!(enrichments
        .iter()
        .all(|e| e.task.status == EnrichmentStatus::Succeeded));
}

/// Recent results are skipped and not enriched
#[tokio::test]
async fn test_cycle_suppresses_recent_results() {
    let scorer = Arc::new(
        FakeScorer::new()
            .with_score("ASSET1", SignalAction::Buy, 0.9, 0.9)
            .with_score("ASSET2", SignalAction::Sell, 0.4, 0.4),
    );
    let explainer = Arc::new(FakeExplainer::succeeding());
    let store = Arc::new(MemoryResultStore::new(work_items(2)));
    let now = SystemTime::now();
    store.record_prior("momentum:ASSET1", now - Duration::from_secs(1));
    store.record_prior("momentum:ASSET2", now - Duration::from_secs(61));

    let system = build_system(fast_pipeline_config(), scorer, explainer.clone(), store.clone());

    let report = system
        .cycle()
        .run_once()
        .await
        .unwrap_or_else(|e| panic!("Cycle failed: {e}"));

    assert_eq!(report.suppressed, 1);
    assert_eq!(report.persisted, 1);
    assert_eq!(store.results()[0].item.entity_id, "ASSET2");

    // Only the persisted SELL is explained
    assert_eq!(report.enriched, 1);
    assert_eq!(explainer.calls(), 1);

    // An immediate rerun lands inside the window for everything
    let rerun = system
        .cycle()
        .run_once()
        .await
        .unwrap_or_else(|e| panic!("Cycle failed: {e}"));
    assert_eq!(rerun.suppressed, 2);
    assert_eq!(rerun.persisted, 0);
    assert_eq!(rerun.enriched, 0);
}

/// Exhausted enrichment is stored as FAILED and does not fail the cycle
#[tokio::test]
async fn test_cycle_records_failed_enrichment() {
    let scorer = Arc::new(FakeScorer::new().with_score("ASSET1", SignalAction::Buy, 0.9, 0.9));
    let explainer = Arc::new(FakeExplainer::always_failing(ProviderError::transient(
        "model overloaded",
    )));
    let store = Arc::new(MemoryResultStore::new(work_items(1)));
    let config = PipelineConfig {
        max_enrichment_retries: 3,
        ..fast_pipeline_config()
    };
    let system = build_system(config, scorer, explainer.clone(), store.clone());

    let report = system
        .cycle()
        .run_once()
        .await
        .unwrap_or_else(|e| panic!("Cycle failed: {e}"));

    assert_eq!(report.enriched, 0);
    assert_eq!(report.enrichment_failures, 1);
    assert_eq!(explainer.calls(), 3);

    let result_id = store.results()[0].id;
    let record = store
        .enrichment(result_id)
        .unwrap_or_else(|| panic!("Enrichment outcome should be stored"));
    assert_eq!(record.task.status, EnrichmentStatus::Failed);
    assert_eq!(record.task.attempt, 3);
    assert!(record.explanation.is_none());
}

/// A failed enumeration aborts the cycle and releases the guard
#[tokio::test]
async fn test_enumeration_failure_releases_guard() {
    let system = RefreshSystemBuilder::new()
        .with_pipeline_config(fast_pipeline_config())
        .with_scoring(Arc::new(FakeScorer::new()))
        .with_enrichment(Arc::new(FakeExplainer::succeeding()))
        .with_store(Arc::new(BrokenStore))
        .build()
        .unwrap_or_else(|e| panic!("Failed to build refresh system: {e}"));

    let Err(err) = system.cycle().run_if_idle().await else {
        panic!("Enumeration failure should abort the cycle");
    };

    assert!(format!("{err:#}").contains("database unreachable"));
    assert!(!system.cycle().is_running());
}

/// Manual triggers are idempotent while a cycle is in flight
#[tokio::test]
async fn test_trigger_is_idempotent_while_running() {
    let scorer = Arc::new(FakeScorer::new().with_delay(Duration::from_millis(100)));
    let explainer = Arc::new(FakeExplainer::succeeding());
    let store = Arc::new(MemoryResultStore::new(work_items(3)));
    let system = build_system(fast_pipeline_config(), scorer.clone(), explainer, store.clone());

    assert_eq!(system.trigger_cycle_now(), TriggerStatus::Started);
    assert_eq!(system.trigger_cycle_now(), TriggerStatus::InProgress);
    assert_eq!(system.trigger_cycle_now(), TriggerStatus::InProgress);

    let skipped = system
        .cycle()
        .run_if_idle()
        .await
        .unwrap_or_else(|e| panic!("Skipped run should not error: {e}"));
    assert!(skipped.is_none());

    let finished = wait_for(|| !system.cycle().is_running(), 2000).await;
    assert!(finished, "Triggered cycle never finished");

    assert_eq!(scorer.calls(), 3, "Cycle body must run once");
    assert_eq!(store.results().len(), 3);

    // Guard released, a new trigger starts a new cycle
    assert_eq!(system.trigger_cycle_now(), TriggerStatus::Started);
}

/// The periodic schedule keeps running cycles until aborted
#[tokio::test]
async fn test_periodic_schedule() {
    let scorer = Arc::new(FakeScorer::new());
    let explainer = Arc::new(FakeExplainer::succeeding());
    let store = Arc::new(MemoryResultStore::new(work_items(2)));
    let config = PipelineConfig {
        duplicate_window: Duration::ZERO,
        ..fast_pipeline_config()
    };
    let system = build_system(config, scorer, explainer, store.clone());

    let schedule = system.spawn_periodic(Duration::from_millis(30));

    let ran_twice = wait_for(|| store.results().len() >= 4, 2000).await;
    schedule.abort();

    assert!(ran_twice, "Expected at least two scheduled cycles");
}

/// Source invalidation goes through the shared cache
#[tokio::test]
async fn test_invalidate_source() {
    let system = build_system(
        fast_pipeline_config(),
        Arc::new(FakeScorer::new()),
        Arc::new(FakeExplainer::succeeding()),
        Arc::new(MemoryResultStore::default()),
    );

    system
        .cache()
        .set("ticker:binance:BTCUSDT", serde_json::json!(1), None);
    system
        .cache()
        .set("ticker:kraken:XBTUSD", serde_json::json!(2), None);

    assert_eq!(system.invalidate_source("binance"), 1);
    assert!(system.cache().get("ticker:kraken:XBTUSD").is_some());
    assert!(system.health_check());
}
