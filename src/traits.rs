//! Extension Traits
//!
//! Seams where callers plug in their own implementations:
//!
//! - `CacheBackend`: storage behind the keyed TTL cache
//! - `ScoringProvider`: upstream that turns a work item into a score
//! - `EnrichmentProvider`: upstream that explains a scored result
//! - `ResultStore`: durable storage the refresh cycle reads from and writes to
//!
//! # Example: Custom Scoring Provider
//!
//! ```rust,ignore
//! use signal_refresh::{async_trait, ProviderError, Score, ScoringProvider, SignalAction, WorkItem};
//!
//! struct MomentumScorer;
//!
//! #[async_trait]
//! impl ScoringProvider for MomentumScorer {
//!     async fn score(&self, item: &WorkItem) -> Result<Score, ProviderError> {
//!         Ok(Score::new(SignalAction::Hold, 0.5, 0.5))
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::time::{Duration, SystemTime};

use crate::error::ProviderError;
use crate::types::{EnrichmentTask, Explanation, Score, ScoredResult, WorkItem};

/// Storage behind [`CacheManager`](crate::CacheManager)
///
/// Backends hold values with a per-entry expiry. An entry past its expiry must
/// behave exactly like an absent one: `get` returns `None` and drops it.
///
/// Methods are synchronous so the cache manager can consult the backend inside
/// its per-key critical section without holding a lock across an `.await`.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the manager is shared across tasks.
pub trait CacheBackend: Send + Sync {
    /// Get an unexpired value, evicting the entry if it has expired
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    /// Store a value, replacing any previous entry for the key
    fn set_with_ttl(&self, key: &str, value: serde_json::Value, ttl: Duration);

    /// Remove one key; `true` when something was removed
    fn remove(&self, key: &str) -> bool;

    /// Remove every key containing `fragment`, returning how many were removed
    fn remove_matching(&self, fragment: &str) -> usize;

    /// Drop expired entries eagerly, returning how many were removed
    fn cleanup_expired(&self) -> usize;

    /// Drop everything
    fn clear(&self);

    /// Number of stored entries, expired ones not yet evicted included
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Round-trip a probe value through the backend
    fn health_check(&self) -> bool {
        let probe_key = "__health_check__";
        let probe = serde_json::json!({ "probe": true });

        self.set_with_ttl(probe_key, probe.clone(), Duration::from_secs(60));
        let ok = self.get(probe_key).as_ref() == Some(&probe);
        self.remove(probe_key);
        ok
    }

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Upstream that scores one work item
#[async_trait]
pub trait ScoringProvider: Send + Sync {
    /// Compute the signal for `item`.
    ///
    /// Implementations may use the shared cache for market data sub-fetches.
    async fn score(&self, item: &WorkItem) -> Result<Score, ProviderError>;
}

/// Upstream that writes a natural-language explanation for a result
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn explain(&self, result: &ScoredResult) -> Result<Explanation, ProviderError>;
}

/// Durable storage used by the refresh cycle
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Entities to score this cycle. Failure aborts the cycle.
    async fn list_work_items(&self) -> Result<Vec<WorkItem>>;

    /// Timestamp of the most recent stored result for a dedup key
    async fn latest_result_at(&self, dedup_key: &str) -> Result<Option<SystemTime>>;

    /// Persist one scored result
    async fn save_result(&self, result: &ScoredResult) -> Result<()>;

    /// Persist the terminal state of an enrichment task and its explanation, if any
    async fn save_enrichment(
        &self,
        task: &EnrichmentTask,
        explanation: Option<&Explanation>,
    ) -> Result<()>;
}
