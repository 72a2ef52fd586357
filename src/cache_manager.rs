//! Cache Manager - Keyed TTL Cache with Stampede Protection
//!
//! Wraps a [`CacheBackend`] with category-based default lifetimes, hit/miss
//! accounting and `get_or_fetch`, which guarantees that concurrent misses on
//! one key trigger at most one upstream fetch.
//!
//! # Request coalescing
//!
//! ```text
//! get_or_fetch(key)
//!   ├─ hit ──────────────────────────────► value
//!   └─ miss ─► in-flight slot for key?
//!               ├─ yes ─► wait on the leader's outcome ─► value | UpstreamError
//!               └─ no ──► become leader: fetch once, cache on success,
//!                         release slot, publish outcome to every waiter
//! ```
//!
//! Claiming the slot and re-checking the cache happen under the map's shard
//! lock for that key, so the check-then-act is a single step even on a
//! multi-threaded runtime. The lock is never held across the fetch itself.
//!
//! Invalidation detaches in-flight fetches for the affected keys. A detached
//! leader still answers its waiters but does not write its result back, so a
//! purged source cannot be repopulated by a fetch that started before the purge.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backends::DashMapCache;
use crate::config::CacheConfig;
use crate::error::UpstreamError;
use crate::traits::CacheBackend;

type FetchOutcome = Result<serde_json::Value, UpstreamError>;
type OutcomeReceiver = watch::Receiver<Option<FetchOutcome>>;

/// One in-flight fetch; `id` tells a leader's slot apart from a later one
/// opened for the same key after invalidation
struct InFlight {
    id: u64,
    outcome: OutcomeReceiver,
}

/// RAII cleanup guard for in-flight request tracking
/// Ensures the slot is released even if the leading task is cancelled
struct CleanupGuard<'a> {
    map: &'a DashMap<String, InFlight>,
    key: &'a str,
    id: u64,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.map.remove_if(self.key, |_, slot| slot.id == self.id);
    }
}

/// Role of a caller after a miss
enum Claim {
    /// Value appeared while the slot was being claimed
    Hit(serde_json::Value),
    /// Another task is fetching; wait for its outcome
    Follow(OutcomeReceiver),
    /// This task performs the fetch under slot `id`
    Lead {
        tx: watch::Sender<Option<FetchOutcome>>,
        id: u64,
    },
}

/// Keyed TTL cache with stampede protection
///
/// Construct one per process and share it behind an `Arc`; all state lives on
/// the instance.
///
/// # Example
///
/// ```rust
/// use signal_refresh::{CacheConfig, CacheManager};
///
/// # async fn example() -> Result<(), signal_refresh::UpstreamError> {
/// let cache = CacheManager::new(CacheConfig::default());
///
/// let price = cache
///     .get_or_fetch("ticker:binance:BTCUSDT", None, || async {
///         Ok(serde_json::json!(64_250.5))
///     })
///     .await?;
///
/// assert_eq!(cache.get("ticker:binance:BTCUSDT"), Some(price));
/// # Ok(())
/// # }
/// ```
pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    upstream_fetches: AtomicU64,
    coalesced_waits: AtomicU64,
    /// In-flight fetches, one outcome channel per key
    in_flight: DashMap<String, InFlight>,
    next_slot_id: AtomicU64,
}

impl CacheManager {
    /// Create a cache manager over the default `DashMap` backend
    pub fn new(config: CacheConfig) -> Self {
        Self::with_backend(Arc::new(DashMapCache::new()), config)
    }

    /// Create a cache manager over a custom backend
    pub fn with_backend(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        info!(
            backend = backend.name(),
            default_ttl_ms = %config.default_ttl.as_millis(),
            categories = config.category_ttls.len(),
            "Initializing cache manager"
        );

        Self {
            backend,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            upstream_fetches: AtomicU64::new(0),
            coalesced_waits: AtomicU64::new(0),
            in_flight: DashMap::new(),
            next_slot_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get an unexpired value.
    ///
    /// Absence is a normal outcome. An expired entry is evicted as a side
    /// effect and reported as absent.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        match self.backend.get(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value, replacing any existing entry.
    ///
    /// Without an explicit `ttl` the lifetime comes from the key's category
    /// (its first segment), or the global default for unknown categories.
    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or_else(|| self.config.ttl_for(key));
        self.backend.set_with_ttl(key, value, ttl);
    }

    /// Remove a single key, detaching any fetch in flight for it
    pub fn invalidate(&self, key: &str) -> bool {
        self.in_flight.remove(key);
        self.backend.remove(key)
    }

    /// Remove every entry whose key contains `fragment`.
    ///
    /// Pass [`CacheKey::scope_fragment`](crate::CacheKey::scope_fragment) to
    /// purge all state cached for one upstream source.
    pub fn invalidate_prefix(&self, fragment: &str) -> usize {
        // Detach before purging so a leader cannot write back in between
        let mut detached = 0;
        self.in_flight.retain(|key, _| {
            if key.contains(fragment) {
                detached += 1;
                false
            } else {
                true
            }
        });
        let removed = self.backend.remove_matching(fragment);
        info!(fragment = %fragment, removed, detached, "Invalidated matching cache entries");
        removed
    }

    /// Evict expired entries without waiting for them to be read
    pub fn cleanup_expired(&self) -> usize {
        self.backend.cleanup_expired()
    }

    /// Drop every entry, detach in-flight fetches and reset the counters
    pub fn clear(&self) {
        self.in_flight.clear();
        self.backend.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.upstream_fetches.store(0, Ordering::Relaxed);
        self.coalesced_waits.store(0, Ordering::Relaxed);
    }

    pub fn health_check(&self) -> bool {
        let healthy = self.backend.health_check();
        if !healthy {
            warn!(backend = self.backend.name(), "Cache backend health check failed");
        }
        healthy
    }

    /// Counters accumulated since construction or the last `clear`
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            size: self.backend.len(),
            hits,
            misses,
            hit_rate: if lookups > 0 {
                (hits as f64 / lookups as f64) * 100.0
            } else {
                0.0
            },
            upstream_fetches: self.upstream_fetches.load(Ordering::Relaxed),
            coalesced_waits: self.coalesced_waits.load(Ordering::Relaxed),
            in_flight: self.in_flight.len(),
        }
    }

    /// Get a value, fetching it upstream on a miss with stampede protection.
    ///
    /// For any number of concurrent callers missing on the same key,
    /// `fetch_fn` runs exactly once; every caller receives the same value or
    /// the same [`UpstreamError`]. Failures are not cached, and neither are
    /// values whose key was invalidated while the fetch was running.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        fetch_fn: F,
    ) -> Result<serde_json::Value, UpstreamError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<serde_json::Value>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        match self.claim(key) {
            Claim::Hit(value) => Ok(value),
            Claim::Follow(mut rx) => {
                self.coalesced_waits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Waiting on in-flight fetch");

                let settled = match rx.wait_for(Option::is_some).await {
                    Ok(state) => state.clone(),
                    Err(_) => None,
                };
                settled.unwrap_or_else(|| {
                    Err(UpstreamError::Abandoned {
                        key: key.to_string(),
                    })
                })
            }
            Claim::Lead { tx, id } => {
                let cleanup = CleanupGuard {
                    map: &self.in_flight,
                    key,
                    id,
                };
                self.upstream_fetches.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Fetching from upstream (stampede protected)");

                let outcome = fetch_fn().await.map_err(|e| UpstreamError::Fetch {
                    key: key.to_string(),
                    message: format!("{e:#}"),
                });

                match &outcome {
                    Ok(value) => {
                        if !self.store_if_current(key, id, value.clone(), ttl) {
                            debug!(key = %key, "Key invalidated during fetch, result not cached");
                        }
                    }
                    Err(e) => warn!(key = %key, error = %e, "Upstream fetch failed"),
                }

                // Cache first, then release the slot, then wake the waiters
                drop(cleanup);
                tx.send_replace(Some(outcome.clone()));
                outcome
            }
        }
    }

    /// Typed variant of [`get_or_fetch`](Self::get_or_fetch).
    ///
    /// Values are stored as JSON; a stored value that does not decode into `T`
    /// yields [`UpstreamError::Codec`].
    pub async fn get_or_fetch_typed<T, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        fetch_fn: F,
    ) -> Result<T, UpstreamError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let value = self
            .get_or_fetch(key, ttl, move || async move {
                let typed = fetch_fn().await?;
                Ok::<_, anyhow::Error>(serde_json::to_value(&typed)?)
            })
            .await?;

        serde_json::from_value(value).map_err(|e| UpstreamError::Codec {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Per-key critical section: re-check the cache, then join or open the slot
    fn claim(&self, key: &str) -> Claim {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(slot) => Claim::Follow(slot.get().outcome.clone()),
            Entry::Vacant(slot) => {
                // A leader that just finished cached its value before releasing
                // the slot, so a re-check here cannot miss it
                if let Some(value) = self.backend.get(key) {
                    return Claim::Hit(value);
                }
                let id = self.next_slot_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(None);
                slot.insert(InFlight { id, outcome: rx });
                Claim::Lead { tx, id }
            }
        }
    }

    /// Cache a leader's value only while its slot is still registered.
    ///
    /// The slot's shard lock is held across the write, so invalidation either
    /// runs before (slot gone, nothing written) or after (value purged).
    fn store_if_current(
        &self,
        key: &str,
        id: u64,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> bool {
        let Some(slot) = self.in_flight.get(key) else {
            return false;
        };
        if slot.id != id {
            return false;
        }
        self.set(key, value, ttl);
        drop(slot);
        true
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Stored entries, including expired ones not yet evicted
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Hits as a percentage of lookups
    pub hit_rate: f64,
    /// Times a fetch function actually ran
    pub upstream_fetches: u64,
    /// Callers that attached to someone else's fetch
    pub coalesced_waits: u64,
    /// Fetches currently running
    pub in_flight: usize,
}
