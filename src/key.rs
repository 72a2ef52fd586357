//! Cache key format
//!
//! Keys are colon-delimited, `category:scope:identifier`, for example
//! `ticker:binance:BTCUSDT`. The category selects the default TTL and the scope
//! names the upstream source, so [`CacheManager::invalidate_prefix`] with
//! `":binance:"` purges everything fetched from one connection.
//!
//! [`CacheManager::invalidate_prefix`]: crate::CacheManager::invalidate_prefix

use serde::{Deserialize, Serialize};
use std::fmt;

/// Segment separator
pub const SEPARATOR: char = ':';

/// Structured cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub category: String,
    pub scope: String,
    pub identifier: String,
}

impl CacheKey {
    pub fn new(
        category: impl Into<String>,
        scope: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            scope: scope.into(),
            identifier: identifier.into(),
        }
    }

    /// Parse a rendered key. The identifier keeps any further separators.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, SEPARATOR);
        let category = parts.next().filter(|s| !s.is_empty())?;
        let scope = parts.next()?;
        let identifier = parts.next()?;
        Some(Self::new(category, scope, identifier))
    }

    /// Fragment matching every key of one scope, for prefix invalidation
    pub fn scope_fragment(scope: &str) -> String {
        format!("{SEPARATOR}{scope}{SEPARATOR}")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.category, self.scope, self.identifier
        )
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}

/// First segment of a raw key; the whole key when it has no separator
pub fn category_of(key: &str) -> &str {
    key.split(SEPARATOR).next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_and_parse() {
        let key = CacheKey::new("ticker", "binance", "BTC:USDT");
        let rendered = key.to_string();
        assert_eq!(rendered, "ticker:binance:BTC:USDT");
        assert_eq!(CacheKey::parse(&rendered), Some(key));
        assert_eq!(CacheKey::parse("ticker:binance"), None);
        assert_eq!(CacheKey::parse(":binance:BTC"), None);
    }

    #[test]
    fn category_extraction() {
        assert_eq!(category_of("coin-detail:coingecko:bitcoin"), "coin-detail");
        assert_eq!(category_of("plain"), "plain");
        assert_eq!(CacheKey::scope_fragment("kraken"), ":kraken:");
    }
}
