//! Batch Orchestrator
//!
//! Runs one async operation per work item with bounded concurrency. Items are
//! split into sequential batches of `concurrency`; a batch runs concurrently
//! and must fully settle before the next starts, with a fixed pause in between
//! to stay under upstream rate limits.
//!
//! A failing item never aborts the batch: its error becomes an `ERROR` result.

use futures_util::future::join_all;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::types::{Score, ScoredResult, WorkItem};

/// Batch sizing and pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub concurrency: usize,
    pub inter_batch_pause: Duration,
    /// Items still running after this are recorded as failed
    pub item_timeout: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for BatchConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            inter_batch_pause: config.inter_batch_pause,
            item_timeout: config.item_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Score every item, returning exactly one result per input item.
    ///
    /// Results come back in input order here, but callers should rely on each
    /// result's `item` back-reference rather than position.
    pub async fn run<F, Fut, E>(&self, items: Vec<WorkItem>, op: F) -> Vec<ScoredResult>
    where
        F: Fn(WorkItem) -> Fut,
        Fut: Future<Output = Result<Score, E>>,
        E: Display,
    {
        let concurrency = self.config.concurrency.max(1);
        let total = items.len();
        let batch_count = total.div_ceil(concurrency);
        let start = Instant::now();
        let mut results = Vec::with_capacity(total);

        info!(items = total, concurrency, batches = batch_count, "Starting batch run");

        let mut remaining = items.into_iter().peekable();
        let mut batch_index = 0;
        while remaining.peek().is_some() {
            let batch: Vec<WorkItem> = remaining.by_ref().take(concurrency).collect();
            batch_index += 1;
            debug!(batch = batch_index, size = batch.len(), "Running batch");

            let settled = join_all(batch.into_iter().map(|item| self.run_item(item, &op))).await;
            results.extend(settled);

            if remaining.peek().is_some() && !self.config.inter_batch_pause.is_zero() {
                tokio::time::sleep(self.config.inter_batch_pause).await;
            }
        }

        let failed = results.iter().filter(|r| r.is_error()).count();
        info!(
            items = total,
            failed,
            elapsed_ms = %start.elapsed().as_millis(),
            "Batch run complete"
        );
        results
    }

    async fn run_item<F, Fut, E>(&self, item: WorkItem, op: &F) -> ScoredResult
    where
        F: Fn(WorkItem) -> Fut,
        Fut: Future<Output = Result<Score, E>>,
        E: Display,
    {
        let fut = op(item.clone());
        let outcome = match self.config.item_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(outcome) => outcome.map_err(|e| e.to_string()),
                Err(_) => Err(format!("timed out after {}ms", limit.as_millis())),
            },
            None => fut.await.map_err(|e| e.to_string()),
        };

        match outcome {
            Ok(score) => ScoredResult::scored(item, score),
            Err(error) => {
                warn!(item = %item, error = %error, "Work item failed");
                ScoredResult::failed(item, error)
            }
        }
    }
}

impl Default for BatchOrchestrator {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}
