//! Moka Cache - Bounded In-Memory Backend
//!
//! Concurrent cache using Moka's synchronous API, for deployments that want a
//! hard cap on memory. Moka evicts by size; per-entry expiry is still checked
//! on every read.

use moka::sync::Cache;
use std::time::Duration;
use tracing::{debug, info};

use super::CacheEntry;
use crate::config::CacheConfig;
use crate::traits::CacheBackend;

/// Configuration for `MokaCache`
#[derive(Debug, Clone, Copy)]
pub struct MokaCacheConfig {
    /// Max number of entries
    pub max_capacity: u64,
    /// Hard upper bound on any entry's lifetime, regardless of its own TTL
    pub time_to_live: Duration,
}

impl Default for MokaCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_live: Duration::from_secs(3600),
        }
    }
}

impl From<&CacheConfig> for MokaCacheConfig {
    /// Capacity from the cache config; the hard lifetime is the longest
    /// configured TTL so Moka never evicts an entry before it expires.
    /// Explicit per-call TTLs above that bound are cut short.
    fn from(config: &CacheConfig) -> Self {
        let longest = config
            .category_ttls
            .values()
            .copied()
            .fold(config.default_ttl, Duration::max);
        Self {
            max_capacity: config.max_capacity,
            time_to_live: longest.max(Self::default().time_to_live),
        }
    }
}

/// Moka in-memory cache with per-key TTL support
pub struct MokaCache {
    cache: Cache<String, CacheEntry>,
}

impl MokaCache {
    /// Create new Moka cache
    pub fn new(config: MokaCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.time_to_live)
            .build();

        info!(
            capacity = config.max_capacity,
            "Moka cache backend initialized with per-key TTL support"
        );

        Self { cache }
    }
}

impl Default for MokaCache {
    fn default() -> Self {
        Self::new(MokaCacheConfig::default())
    }
}

impl CacheBackend for MokaCache {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entry = self.cache.get(key)?;
        if entry.is_expired() {
            self.cache.invalidate(key);
            debug!(key = %key, age_ms = %entry.age().as_millis(), "[Moka] Evicted expired entry");
            None
        } else {
            Some(entry.value)
        }
    }

    fn set_with_ttl(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        self.cache.insert(key.to_string(), CacheEntry::new(value, ttl));
        debug!(key = %key, ttl_ms = %ttl.as_millis(), "[Moka] Cached key with TTL");
    }

    fn remove(&self, key: &str) -> bool {
        let present = self.cache.contains_key(key);
        self.cache.invalidate(key);
        present
    }

    fn remove_matching(&self, fragment: &str) -> usize {
        let matching: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.contains(fragment))
            .map(|(key, _)| key.to_string())
            .collect();
        for key in &matching {
            self.cache.invalidate(key);
        }
        matching.len()
    }

    fn cleanup_expired(&self) -> usize {
        let expired: Vec<String> = self
            .cache
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.to_string())
            .collect();
        for key in &expired {
            self.cache.invalidate(key);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "[Moka] Cleaned up expired entries");
        }
        expired.len()
    }

    fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    fn len(&self) -> usize {
        self.cache.iter().count()
    }

    fn name(&self) -> &'static str {
        "Moka"
    }
}
