//! `DashMap` Cache - Concurrent `HashMap` Backend
//!
//! Unbounded in-memory store with exact, lazy per-entry expiry. This is the
//! default backend of [`CacheManager`](crate::CacheManager).

use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::CacheEntry;
use crate::traits::CacheBackend;

/// Concurrent cache using `DashMap`
///
/// **Features**:
/// - Sharded locking, so readers of different keys rarely contend
/// - Expired entries are evicted when read, or in bulk via `cleanup_expired`
///
/// **Limitations**:
/// - No size limit; the working set is expected to be bounded by the number
///   of tracked assets
///
/// **Example**:
/// ```rust
/// use signal_refresh::backends::DashMapCache;
/// use signal_refresh::CacheBackend;
/// use std::time::Duration;
///
/// let cache = DashMapCache::new();
/// let value = serde_json::json!({"symbol": "ETH", "price": 3100.5});
///
/// cache.set_with_ttl("ticker:kraken:ETH", value.clone(), Duration::from_secs(60));
/// assert_eq!(cache.get("ticker:kraken:ETH"), Some(value));
/// ```
pub struct DashMapCache {
    map: DashMap<String, CacheEntry>,
}

impl DashMapCache {
    /// Create new `DashMap` cache
    pub fn new() -> Self {
        info!("Initializing DashMap cache backend");

        Self {
            map: DashMap::new(),
        }
    }
}

impl Default for DashMapCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for DashMapCache {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entry = self.map.get(key)?;
        if !entry.is_expired() {
            return Some(entry.value.clone());
        }

        let age = entry.age();
        // Release the shard read lock before taking the write lock
        drop(entry);
        // Another writer may have refreshed the key in between
        if self
            .map
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some()
        {
            debug!(key = %key, age_ms = %age.as_millis(), "[DashMap] Evicted expired entry");
        }
        None
    }

    fn set_with_ttl(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        self.map.insert(key.to_string(), CacheEntry::new(value, ttl));
        debug!(key = %key, ttl_ms = %ttl.as_millis(), "[DashMap] Cached key with TTL");
    }

    fn remove(&self, key: &str) -> bool {
        self.map.remove(key).is_some()
    }

    fn remove_matching(&self, fragment: &str) -> usize {
        let mut removed = 0;
        self.map.retain(|key, _| {
            if key.contains(fragment) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        self.map.retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(count = removed, "[DashMap] Cleaned up expired entries");
        }
        removed
    }

    fn clear(&self) {
        self.map.clear();
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn name(&self) -> &'static str {
        "DashMap"
    }
}
