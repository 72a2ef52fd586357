//! Refresh System Builder
//!
//! Assembles a [`RefreshSystem`] from its collaborators.
//!
//! # Example
//!
//! ```rust,ignore
//! use signal_refresh::{CacheManager, MemoryResultStore, RefreshSystemBuilder};
//! use std::sync::Arc;
//!
//! let cache = Arc::new(CacheManager::new(Default::default()));
//! let system = RefreshSystemBuilder::new()
//!     .with_cache(Arc::clone(&cache))
//!     .with_scoring(Arc::new(MyScorer::new(cache)))
//!     .with_enrichment(Arc::new(MyExplainer::new()))
//!     .with_store(Arc::new(MemoryResultStore::default()))
//!     .build()?;
//! ```

use anyhow::{Result, anyhow};
use std::sync::Arc;
use tracing::info;

use crate::cache_manager::CacheManager;
use crate::config::{CacheConfig, PipelineConfig};
use crate::cycle::RefreshCycle;
use crate::traits::{CacheBackend, EnrichmentProvider, ResultStore, ScoringProvider};
use crate::RefreshSystem;

/// Builder for [`RefreshSystem`]
///
/// Scoring, enrichment and storage are required. The cache defaults to a
/// `DashMap`-backed [`CacheManager`] built from the cache config; pass one in
/// with [`with_cache`](Self::with_cache) when the scoring provider needs to
/// share it.
#[derive(Default)]
pub struct RefreshSystemBuilder {
    cache_config: Option<CacheConfig>,
    pipeline_config: Option<PipelineConfig>,
    backend: Option<Arc<dyn CacheBackend>>,
    cache: Option<Arc<CacheManager>>,
    scoring: Option<Arc<dyn ScoringProvider>>,
    enrichment: Option<Arc<dyn EnrichmentProvider>>,
    store: Option<Arc<dyn ResultStore>>,
}

impl RefreshSystemBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read both configs from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::new()
            .with_cache_config(CacheConfig::from_env())
            .with_pipeline_config(PipelineConfig::from_env())
    }

    #[must_use]
    pub fn with_cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = Some(config);
        self
    }

    #[must_use]
    pub fn with_pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = Some(config);
        self
    }

    /// Storage backend for a cache built by the builder
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use an existing cache; overrides `with_backend` and `with_cache_config`
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_scoring(mut self, provider: Arc<dyn ScoringProvider>) -> Self {
        self.scoring = Some(provider);
        self
    }

    #[must_use]
    pub fn with_enrichment(mut self, provider: Arc<dyn EnrichmentProvider>) -> Self {
        self.enrichment = Some(provider);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// # Errors
    ///
    /// Returns an error if a scoring provider, enrichment provider or result
    /// store was not supplied.
    pub fn build(self) -> Result<RefreshSystem> {
        let scoring = self
            .scoring
            .ok_or_else(|| anyhow!("RefreshSystemBuilder: scoring provider is required"))?;
        let enrichment = self
            .enrichment
            .ok_or_else(|| anyhow!("RefreshSystemBuilder: enrichment provider is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow!("RefreshSystemBuilder: result store is required"))?;

        let cache = match self.cache {
            Some(cache) => cache,
            None => {
                let config = self.cache_config.unwrap_or_default();
                Arc::new(match self.backend {
                    Some(backend) => CacheManager::with_backend(backend, config),
                    None => CacheManager::new(config),
                })
            }
        };

        let pipeline_config = self.pipeline_config.unwrap_or_default();
        info!(
            concurrency = pipeline_config.concurrency,
            top_k = pipeline_config.enrichment_top_k,
            max_retries = pipeline_config.max_enrichment_retries,
            "Building refresh system"
        );

        let cycle = Arc::new(RefreshCycle::new(pipeline_config, scoring, enrichment, store));
        Ok(RefreshSystem { cache, cycle })
    }
}
