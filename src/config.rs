//! Configuration
//!
//! Two knob sets: [`CacheConfig`] for the keyed TTL cache and
//! [`PipelineConfig`] for the refresh cycle. Both have sensible defaults, can be
//! deserialized (durations are expressed in milliseconds) and can be read from
//! the environment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::key::category_of;

/// Category used for live price tickers
pub const TICKER_CATEGORY: &str = "ticker";
/// Category used for slow-moving asset metadata
pub const COIN_DETAIL_CATEGORY: &str = "coin-detail";

/// Keyed TTL cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime for keys whose category has no override
    #[serde(rename = "default_ttl_ms", with = "millis")]
    pub default_ttl: Duration,
    /// Per-category lifetime overrides, keyed by the first key segment
    #[serde(rename = "category_ttls_ms", with = "millis_map")]
    pub category_ttls: HashMap<String, Duration>,
    /// Upper bound on entries for bounded backends (ignored by `DashMapCache`)
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut category_ttls = HashMap::new();
        category_ttls.insert(TICKER_CATEGORY.to_string(), Duration::from_secs(10));
        category_ttls.insert(COIN_DETAIL_CATEGORY.to_string(), Duration::from_secs(300));

        Self {
            default_ttl: Duration::from_secs(60),
            category_ttls,
            max_capacity: 10_000,
        }
    }
}

impl CacheConfig {
    /// Read configuration from `SIGNAL_CACHE_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source
    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.default_ttl = env_millis(&lookup, "SIGNAL_CACHE_DEFAULT_TTL_MS", config.default_ttl);
        config.max_capacity = env_parse(&lookup, "SIGNAL_CACHE_MAX_CAPACITY", config.max_capacity);

        if let Some(raw) = lookup("SIGNAL_CACHE_CATEGORY_TTLS_MS") {
            match parse_category_ttls(&raw) {
                Ok(overrides) => config.category_ttls.extend(overrides),
                Err(e) => warn!(error = %e, "Ignoring SIGNAL_CACHE_CATEGORY_TTLS_MS"),
            }
        }

        config
    }

    /// Set the fallback lifetime
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Override the lifetime of one key category
    #[must_use]
    pub fn with_category_ttl(mut self, category: impl Into<String>, ttl: Duration) -> Self {
        self.category_ttls.insert(category.into(), ttl);
        self
    }

    /// Lifetime applied to `key` when the caller does not pass one
    pub fn ttl_for(&self, key: &str) -> Duration {
        self.category_ttls
            .get(category_of(key))
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

/// Refresh cycle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Work items scored concurrently per batch
    pub concurrency: usize,
    /// Pause between batches, as backpressure against upstream rate limits
    #[serde(rename = "inter_batch_pause_ms", with = "millis")]
    pub inter_batch_pause: Duration,
    /// Optional bound on a single scoring call
    #[serde(rename = "item_timeout_ms", with = "millis_opt")]
    pub item_timeout: Option<Duration>,
    /// How many results per cycle get an explanation
    pub enrichment_top_k: usize,
    /// Attempts allowed per enrichment task
    pub max_enrichment_retries: u32,
    /// Backoff unit; attempt `n` waits `n * retry_base_delay`
    #[serde(rename = "retry_base_delay_ms", with = "millis")]
    pub retry_base_delay: Duration,
    /// Spread retries by up to half the computed delay
    pub retry_jitter: bool,
    /// Results for the same strategy/entity pair inside this window are dropped
    #[serde(rename = "duplicate_window_ms", with = "millis")]
    pub duplicate_window: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            inter_batch_pause: Duration::from_millis(500),
            item_timeout: None,
            enrichment_top_k: 5,
            max_enrichment_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_jitter: false,
            duplicate_window: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    /// Read configuration from `SIGNAL_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source
    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        // 0 disables the timeout
        let item_timeout = match lookup("SIGNAL_ITEM_TIMEOUT_MS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(ms) => Some(Duration::from_millis(ms)),
                Err(e) => {
                    warn!(var = "SIGNAL_ITEM_TIMEOUT_MS", value = %raw, error = %e, "Invalid value, using default");
                    defaults.item_timeout
                }
            },
            None => defaults.item_timeout,
        };

        Self {
            concurrency: env_parse(&lookup, "SIGNAL_BATCH_CONCURRENCY", defaults.concurrency),
            inter_batch_pause: env_millis(&lookup, "SIGNAL_BATCH_PAUSE_MS", defaults.inter_batch_pause),
            item_timeout,
            enrichment_top_k: env_parse(&lookup, "SIGNAL_ENRICH_TOP_K", defaults.enrichment_top_k),
            max_enrichment_retries: env_parse(
                &lookup,
                "SIGNAL_ENRICH_MAX_RETRIES",
                defaults.max_enrichment_retries,
            ),
            retry_base_delay: env_millis(
                &lookup,
                "SIGNAL_ENRICH_BASE_DELAY_MS",
                defaults.retry_base_delay,
            ),
            retry_jitter: env_parse(&lookup, "SIGNAL_ENRICH_JITTER", defaults.retry_jitter),
            duplicate_window: env_millis(
                &lookup,
                "SIGNAL_DUPLICATE_WINDOW_MS",
                defaults.duplicate_window,
            ),
        }
    }
}

/// Parse `name=ms,name=ms` into category overrides
pub fn parse_category_ttls(raw: &str) -> anyhow::Result<HashMap<String, Duration>> {
    let mut overrides = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, ms) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected 'category=ms', got '{pair}'"))?;
        let ms: u64 = ms
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid ttl for category '{}': {e}", name.trim()))?;
        overrides.insert(name.trim().to_string(), Duration::from_millis(ms));
    }
    Ok(overrides)
}

fn env_var(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

fn env_parse<T, L>(lookup: &L, var: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
    L: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!(var = %var, value = %raw, error = %e, "Invalid value, using default");
            default
        }),
        None => default,
    }
}

fn env_millis<L>(lookup: &L, var: &str, default: Duration) -> Duration
where
    L: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(env_parse(lookup, var, default_ms))
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod millis_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

mod millis_map {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        map: &HashMap<String, Duration>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        map.iter()
            .map(|(k, v)| (k, u64::try_from(v.as_millis()).unwrap_or(u64::MAX)))
            .collect::<HashMap<_, _>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<HashMap<String, Duration>, D::Error> {
        Ok(HashMap::<String, u64>::deserialize(d)?
            .into_iter()
            .map(|(k, v)| (k, Duration::from_millis(v)))
            .collect())
    }
}
