//! Refresh Cycle
//!
//! One run of the pipeline:
//!
//! ```text
//! single-flight guard
//!   → list work items (failure aborts the cycle, guard still released)
//!   → batch scoring (bounded concurrency, failures become ERROR results)
//!   → duplicate-window check, persist each surviving result
//!   → pick top-K persisted results
//!   → enrichment with retry/backoff, terminal state persisted per task
//! ```

use anyhow::{Context, Result};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::batch::{BatchConfig, BatchOrchestrator};
use crate::config::PipelineConfig;
use crate::dedup::should_suppress;
use crate::retry::{EnrichmentEngine, RetryPolicy};
use crate::run_guard::SingleFlightGuard;
use crate::selector::select_top_k;
use crate::traits::{EnrichmentProvider, ResultStore, ScoringProvider};
use crate::types::{EnrichmentTask, ScoredResult};

/// Job name used for the single-flight guard and logs
pub const REFRESH_JOB: &str = "signal-refresh";

/// Answer to a manual trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Started,
    InProgress,
}

/// Counters for one completed cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub items: usize,
    pub scored: usize,
    pub failed: usize,
    pub suppressed: usize,
    pub persisted: usize,
    pub store_errors: usize,
    pub enriched: usize,
    pub enrichment_failures: usize,
    pub elapsed: Duration,
}

impl CycleReport {
    fn new(cycle_id: Uuid) -> Self {
        Self {
            cycle_id,
            items: 0,
            scored: 0,
            failed: 0,
            suppressed: 0,
            persisted: 0,
            store_errors: 0,
            enriched: 0,
            enrichment_failures: 0,
            elapsed: Duration::ZERO,
        }
    }
}

pub struct RefreshCycle {
    config: PipelineConfig,
    orchestrator: BatchOrchestrator,
    engine: EnrichmentEngine,
    guard: SingleFlightGuard,
    scoring: Arc<dyn ScoringProvider>,
    enrichment: Arc<dyn EnrichmentProvider>,
    store: Arc<dyn ResultStore>,
}

impl RefreshCycle {
    pub fn new(
        config: PipelineConfig,
        scoring: Arc<dyn ScoringProvider>,
        enrichment: Arc<dyn EnrichmentProvider>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            orchestrator: BatchOrchestrator::new(BatchConfig::from(&config)),
            engine: EnrichmentEngine::new(RetryPolicy::from(&config)),
            guard: SingleFlightGuard::new(REFRESH_JOB),
            config,
            scoring,
            enrichment,
            store,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn guard(&self) -> &SingleFlightGuard {
        &self.guard
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Run a cycle on the current task unless one is already running.
    ///
    /// `Ok(None)` means the call was skipped.
    pub async fn run_if_idle(&self) -> Result<Option<CycleReport>> {
        let Some(_permit) = self.guard.acquire() else {
            return Ok(None);
        };
        self.run_once().await.map(Some)
    }

    /// Start a cycle in the background unless one is already running.
    ///
    /// Idempotent while a cycle is in flight. Must be called from within a
    /// Tokio runtime.
    pub fn trigger_cycle_now(self: &Arc<Self>) -> TriggerStatus {
        let Some(permit) = self.guard.acquire() else {
            return TriggerStatus::InProgress;
        };

        let cycle = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = cycle.run_once().await {
                let message = format!("{e:#}");
                error!(error = %message, "Refresh cycle aborted");
            }
        });
        TriggerStatus::Started
    }

    /// Trigger a cycle every `period`, the first one immediately.
    ///
    /// Ticks landing on a running cycle are skipped by the single-flight guard.
    /// Abort the returned handle to stop scheduling.
    pub fn spawn_periodic(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cycle = Arc::clone(self);
        info!(period_ms = %period.as_millis(), "Scheduling periodic refresh");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if cycle.trigger_cycle_now() == TriggerStatus::InProgress {
                    debug!("Periodic tick skipped");
                }
            }
        })
    }

    /// Run the pipeline once, ignoring the single-flight guard.
    ///
    /// Only enumeration of work items can fail the cycle; per-item scoring,
    /// storage and enrichment failures are counted in the report.
    pub async fn run_once(&self) -> Result<CycleReport> {
        let start = Instant::now();
        let mut report = CycleReport::new(Uuid::new_v4());
        info!(cycle_id = %report.cycle_id, "Refresh cycle started");

        let items = self
            .store
            .list_work_items()
            .await
            .context("Failed to enumerate work items")?;
        report.items = items.len();

        let scoring = &self.scoring;
        let results = self
            .orchestrator
            .run(items, |item| async move { scoring.score(&item).await })
            .await;

        let persisted = self.persist(results, &mut report).await;

        let selected = select_top_k(&persisted, self.config.enrichment_top_k);
        let outcomes = join_all(selected.iter().map(|result| self.enrich_one(result))).await;
        report.enriched = outcomes.iter().filter(|ok| **ok).count();
        report.enrichment_failures = outcomes.len() - report.enriched;

        report.elapsed = start.elapsed();
        info!(
            cycle_id = %report.cycle_id,
            items = report.items,
            scored = report.scored,
            failed = report.failed,
            suppressed = report.suppressed,
            persisted = report.persisted,
            enriched = report.enriched,
            enrichment_failures = report.enrichment_failures,
            elapsed_ms = %report.elapsed.as_millis(),
            "Refresh cycle complete"
        );
        Ok(report)
    }

    /// Store every scored result outside the duplicate window
    async fn persist(
        &self,
        results: Vec<ScoredResult>,
        report: &mut CycleReport,
    ) -> Vec<ScoredResult> {
        let mut persisted = Vec::with_capacity(results.len());

        for result in results {
            if result.is_error() {
                report.failed += 1;
                continue;
            }
            report.scored += 1;

            let dedup_key = result.item.dedup_key();
            let prior = match self.store.latest_result_at(&dedup_key).await {
                Ok(prior) => prior,
                Err(e) => {
                    let message = format!("{e:#}");
                    warn!(key = %dedup_key, error = %message, "Prior result lookup failed");
                    None
                }
            };

            if should_suppress(prior, result.computed_at, self.config.duplicate_window) {
                report.suppressed += 1;
                debug!(key = %dedup_key, "Suppressed near-duplicate result");
                continue;
            }

            match self.store.save_result(&result).await {
                Ok(()) => {
                    report.persisted += 1;
                    persisted.push(result);
                }
                Err(e) => {
                    report.store_errors += 1;
                    let message = format!("{e:#}");
                    warn!(key = %dedup_key, error = %message, "Failed to save result");
                }
            }
        }

        persisted
    }

    async fn enrich_one(&self, result: &ScoredResult) -> bool {
        let mut task = EnrichmentTask::for_result(result);
        let provider = &self.enrichment;

        let outcome = self
            .engine
            .enrich(&mut task, result, |r| async move { provider.explain(&r).await })
            .await;

        if let Err(e) = self.store.save_enrichment(&task, outcome.as_ref().ok()).await {
            let message = format!("{e:#}");
            warn!(result_id = %result.id, error = %message, "Failed to save enrichment outcome");
        }
        outcome.is_ok()
    }
}
