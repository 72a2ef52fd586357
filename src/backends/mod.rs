//! Cache Backend Implementations
//!
//! # Available Backends
//!
//! - **`DashMap`** - Unbounded concurrent map with lazy expiry (default)
//! - **Moka** - Bounded concurrent cache with LRU-style eviction (feature: `moka`)
//!
//! Both keep their own per-entry expiry so a value is never served past its TTL,
//! whatever the backend's own eviction policy does.
//!
//! # Usage
//!
//! ```rust
//! use signal_refresh::backends::DashMapCache;
//! use signal_refresh::CacheBackend;
//! use std::time::Duration;
//!
//! let cache = DashMapCache::new();
//! cache.set_with_ttl("ticker:binance:BTC", serde_json::json!(64_000), Duration::from_secs(10));
//! assert!(cache.get("ticker:binance:BTC").is_some());
//! ```

use std::time::{Duration, Instant};

pub mod dashmap_cache;
#[cfg(feature = "moka")]
pub mod moka_cache;

pub use dashmap_cache::DashMapCache;
#[cfg(feature = "moka")]
pub use moka_cache::{MokaCache, MokaCacheConfig};

/// Stored value with its lifetime
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub(crate) value: serde_json::Value,
    pub(crate) created_at: Instant,
    pub(crate) expires_at: Instant,
}

impl CacheEntry {
    pub(crate) fn new(value: serde_json::Value, ttl: Duration) -> Self {
        let created_at = Instant::now();
        Self {
            value,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub(crate) fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }

    pub(crate) fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}
