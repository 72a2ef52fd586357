//! Signal Refresh
//!
//! A periodic data-refresh and derived-signal pipeline: score a bounded set of
//! tracked assets through an upstream provider, store the results without
//! redundant writes, and explain the most important ones.
//!
//! - **Keyed TTL Cache**: in-memory values with per-category lifetimes
//! - **Stampede Protection**: concurrent misses on one key share a single upstream fetch
//! - **Batch Orchestration**: bounded concurrency, per-item failure isolation
//! - **Single-Flight Scheduling**: a new run never starts while one is in progress
//! - **Priority Enrichment**: only the top-K directional results get explained, with retry/backoff
//! - **Duplicate Suppression**: no new record within a short window of the previous one
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use signal_refresh::{RefreshSystemBuilder, MemoryResultStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     signal_refresh::telemetry::init_tracing("signal_refresh=info");
//!
//!     let system = RefreshSystemBuilder::from_env()
//!         .with_scoring(Arc::new(MyScorer))
//!         .with_enrichment(Arc::new(MyExplainer))
//!         .with_store(Arc::new(MemoryResultStore::default()))
//!         .build()?;
//!
//!     let _schedule = system.spawn_periodic(Duration::from_secs(300));
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! trigger ─► SingleFlightGuard ─► BatchOrchestrator ─► duplicate window ─► store
//!                                   │ (scoring may read        │
//!                                   ▼  through CacheManager)   ▼
//!                                 CacheManager            select_top_k ─► EnrichmentEngine ─► store
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod backends;
pub mod batch;
pub mod builder;
pub mod cache_manager;
pub mod config;
pub mod cycle;
pub mod dedup;
pub mod error;
pub mod key;
pub mod retry;
pub mod run_guard;
pub mod selector;
pub mod store;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use backends::DashMapCache;
#[cfg(feature = "moka")]
pub use backends::{MokaCache, MokaCacheConfig};
pub use batch::{BatchConfig, BatchOrchestrator};
pub use builder::RefreshSystemBuilder;
pub use cache_manager::{CacheManager, CacheStats};
pub use config::{CacheConfig, PipelineConfig};
pub use cycle::{CycleReport, RefreshCycle, TriggerStatus};
pub use dedup::should_suppress;
pub use error::{EnrichmentError, ProviderError, ProviderErrorKind, UpstreamError};
pub use key::CacheKey;
pub use retry::{EnrichmentEngine, RetryPolicy};
pub use run_guard::{RunPermit, SingleFlightGuard};
pub use selector::select_top_k;
pub use store::{EnrichmentRecord, MemoryResultStore};
pub use traits::{CacheBackend, EnrichmentProvider, ResultStore, ScoringProvider};
pub use types::{
    Action, EnrichmentStatus, EnrichmentTask, Explanation, Outcome, Score, ScoredResult,
    SignalAction, WorkItem,
};

// Re-export async_trait for implementors of the provider traits
pub use async_trait::async_trait;

/// Main entry point: the shared cache plus the refresh cycle
///
/// Built with [`RefreshSystemBuilder`]. Clones share the same cache, guard
/// and collaborators.
#[derive(Clone)]
pub struct RefreshSystem {
    /// Cache shared with the scoring provider
    pub cache: Arc<CacheManager>,
    /// Orchestrated pipeline
    pub cycle: Arc<RefreshCycle>,
}

impl RefreshSystem {
    pub fn builder() -> RefreshSystemBuilder {
        RefreshSystemBuilder::new()
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn cycle(&self) -> &Arc<RefreshCycle> {
        &self.cycle
    }

    /// Manual trigger; a no-op returning `InProgress` while a cycle runs
    pub fn trigger_cycle_now(&self) -> TriggerStatus {
        let status = self.cycle.trigger_cycle_now();
        info!(status = ?status, "Manual refresh trigger");
        status
    }

    /// Run the cycle every `period` in the background
    pub fn spawn_periodic(&self, period: Duration) -> JoinHandle<()> {
        self.cycle.spawn_periodic(period)
    }

    /// Drop every cached value for one upstream source
    pub fn invalidate_source(&self, scope: &str) -> usize {
        self.cache.invalidate_prefix(&CacheKey::scope_fragment(scope))
    }

    /// Round-trips a probe through the cache backend
    pub fn health_check(&self) -> bool {
        let cache_ok = self.cache.health_check();
        if !cache_ok {
            warn!("Refresh system health check failed: cache backend");
        }
        cache_ok
    }
}
