//! In-memory `ResultStore`
//!
//! Process-local stand-in for the durable store, for tests, demos and
//! single-node deployments that do not need results to survive a restart.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::SystemTime;
use uuid::Uuid;

use crate::traits::ResultStore;
use crate::types::{EnrichmentTask, Explanation, ScoredResult, WorkItem};

/// Stored terminal state of an enrichment task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentRecord {
    pub task: EnrichmentTask,
    pub explanation: Option<Explanation>,
}

#[derive(Default)]
struct Inner {
    work_items: Vec<WorkItem>,
    results: Vec<ScoredResult>,
    latest: HashMap<String, SystemTime>,
    enrichments: HashMap<Uuid, EnrichmentRecord>,
}

#[derive(Default)]
pub struct MemoryResultStore {
    inner: Mutex<Inner>,
}

impl MemoryResultStore {
    pub fn new(work_items: Vec<WorkItem>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                work_items,
                ..Inner::default()
            }),
        }
    }

    pub fn set_work_items(&self, work_items: Vec<WorkItem>) {
        self.inner.lock().work_items = work_items;
    }

    /// Pretend a result for `dedup_key` was stored at `at`
    pub fn record_prior(&self, dedup_key: impl Into<String>, at: SystemTime) {
        self.inner.lock().latest.insert(dedup_key.into(), at);
    }

    pub fn results(&self) -> Vec<ScoredResult> {
        self.inner.lock().results.clone()
    }

    pub fn enrichment(&self, result_id: Uuid) -> Option<EnrichmentRecord> {
        self.inner.lock().enrichments.get(&result_id).cloned()
    }

    pub fn enrichments(&self) -> Vec<EnrichmentRecord> {
        self.inner.lock().enrichments.values().cloned().collect()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn list_work_items(&self) -> Result<Vec<WorkItem>> {
        Ok(self.inner.lock().work_items.clone())
    }

    async fn latest_result_at(&self, dedup_key: &str) -> Result<Option<SystemTime>> {
        Ok(self.inner.lock().latest.get(dedup_key).copied())
    }

    async fn save_result(&self, result: &ScoredResult) -> Result<()> {
        let mut inner = self.inner.lock();
        let latest = inner
            .latest
            .entry(result.item.dedup_key())
            .or_insert(result.computed_at);
        if *latest < result.computed_at {
            *latest = result.computed_at;
        }
        inner.results.push(result.clone());
        Ok(())
    }

    async fn save_enrichment(
        &self,
        task: &EnrichmentTask,
        explanation: Option<&Explanation>,
    ) -> Result<()> {
        self.inner.lock().enrichments.insert(
            task.result_id,
            EnrichmentRecord {
                task: task.clone(),
                explanation: explanation.cloned(),
            },
        );
        Ok(())
    }
}
