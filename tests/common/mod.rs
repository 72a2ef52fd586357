//! Common utilities for integration tests
//!
//! Scripted scoring and enrichment providers with call counters, plus helpers
//! for building work items and a refresh system around them.

#![allow(dead_code)]

use anyhow::Result;
use signal_refresh::{
    async_trait, EnrichmentProvider, EnrichmentTask, Explanation, MemoryResultStore,
    PipelineConfig, ProviderError, RefreshSystem, RefreshSystemBuilder, ResultStore, Score,
    ScoredResult, ScoringProvider, SignalAction, WorkItem,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

/// Generate a unique cache key so tests never share entries
pub fn test_key(category: &str, name: &str) -> String {
    format!("{category}:test:{name}_{}", rand::random::<u32>())
}

/// Work items `momentum/ASSET1 .. momentum/ASSETn`
pub fn work_items(n: usize) -> Vec<WorkItem> {
    (1..=n)
        .map(|i| WorkItem::new("momentum", format!("ASSET{i}")))
        .collect()
}

/// Pipeline config with no pauses or backoff delays
pub fn fast_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        inter_batch_pause: Duration::ZERO,
        retry_base_delay: Duration::from_millis(1),
        ..PipelineConfig::default()
    }
}

/// Scoring provider answering from a script, `HOLD 0.5/0.5` by default
#[derive(Default)]
pub struct FakeScorer {
    scripted: HashMap<String, Result<Score, ProviderError>>,
    delay: Duration,
    calls: AtomicU32,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_score(mut self, entity: &str, action: SignalAction, score: f64, confidence: f64) -> Self {
        self.scripted
            .insert(entity.to_string(), Ok(Score::new(action, score, confidence)));
        self
    }

    pub fn with_failure(mut self, entity: &str, message: &str) -> Self {
        self.scripted
            .insert(entity.to_string(), Err(ProviderError::transient(message)));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `score` calls observed
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub async fn score_item(&self, item: &WorkItem) -> Result<Score, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now_running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.scripted
            .get(&item.entity_id)
            .cloned()
            .unwrap_or_else(|| Ok(Score::new(SignalAction::Hold, 0.5, 0.5)))
    }
}

#[async_trait]
impl ScoringProvider for FakeScorer {
    async fn score(&self, item: &WorkItem) -> Result<Score, ProviderError> {
        self.score_item(item).await
    }
}

/// Enrichment provider failing a fixed number of times before succeeding
pub struct FakeExplainer {
    failures_before_success: u32,
    failure: ProviderError,
    calls: AtomicU32,
}

impl FakeExplainer {
    pub fn succeeding() -> Self {
        Self::failing_times(0, ProviderError::transient("unused"))
    }

    pub fn failing_times(failures_before_success: u32, failure: ProviderError) -> Self {
        Self {
            failures_before_success,
            failure,
            calls: AtomicU32::new(0),
        }
    }

    pub fn always_failing(failure: ProviderError) -> Self {
        Self::failing_times(u32::MAX, failure)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn explain_result(&self, result: &ScoredResult) -> Result<Explanation, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_success {
            return Err(self.failure.clone());
        }
        Ok(Explanation {
            model: "fake-llm".to_string(),
            text: format!("{} on {}", result.action(), result.item.entity_id),
        })
    }
}

#[async_trait]
impl EnrichmentProvider for FakeExplainer {
    async fn explain(&self, result: &ScoredResult) -> Result<Explanation, ProviderError> {
        self.explain_result(result).await
    }
}

/// Store whose work-item listing always fails
pub struct BrokenStore;

#[async_trait]
impl ResultStore for BrokenStore {
    async fn list_work_items(&self) -> Result<Vec<WorkItem>> {
        Err(anyhow::anyhow!("database unreachable"))
    }

    async fn latest_result_at(&self, _dedup_key: &str) -> Result<Option<SystemTime>> {
        Ok(None)
    }

    async fn save_result(&self, _result: &ScoredResult) -> Result<()> {
        Ok(())
    }

    async fn save_enrichment(
        &self,
        _task: &EnrichmentTask,
        _explanation: Option<&Explanation>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Refresh system over the given collaborators
pub fn build_system(
    config: PipelineConfig,
    scorer: Arc<FakeScorer>,
    explainer: Arc<FakeExplainer>,
    store: Arc<MemoryResultStore>,
) -> RefreshSystem {
    RefreshSystemBuilder::new()
        .with_pipeline_config(config)
        .with_scoring(scorer)
        .with_enrichment(explainer)
        .with_store(store)
        .build()
        .unwrap_or_else(|e| panic!("Failed to build refresh system: {e}"))
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    use tokio::time::{Duration, Instant, sleep};

    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }

    false
}
