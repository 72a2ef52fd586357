//! Error types
//!
//! Every error that can be fanned out to several waiters is `Clone`, so a
//! coalesced fetch or a shared enrichment outcome can be handed to each caller
//! without re-running anything.

use std::fmt;
use thiserror::Error;

/// Failure of an upstream fetch performed through
/// [`CacheManager::get_or_fetch`](crate::CacheManager::get_or_fetch).
///
/// A cache miss is not an error; it surfaces as `None` from `get`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// The fetch function returned an error. Every coalesced caller sees it.
    #[error("upstream fetch for '{key}' failed: {message}")]
    Fetch { key: String, message: String },

    /// The task running the fetch was dropped before the fetch settled.
    #[error("in-flight fetch for '{key}' was abandoned before it settled")]
    Abandoned { key: String },

    /// A cached or fetched value could not be converted to the requested type.
    #[error("value for '{key}' could not be (de)serialized: {message}")]
    Codec { key: String, message: String },
}

impl UpstreamError {
    /// Key the failed fetch was for
    pub fn key(&self) -> &str {
        match self {
            Self::Fetch { key, .. } | Self::Abandoned { key } | Self::Codec { key, .. } => key,
        }
    }
}

/// Whether a provider failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Rate limits, timeouts, connection resets
    Transient,
    /// Bad input, unsupported entity, auth failures
    Permanent,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Permanent => f.write_str("permanent"),
        }
    }
}

/// Error returned by the scoring and enrichment providers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} provider error: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    /// Create a retryable error
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Create an error that retrying will not fix
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Permanent,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == ProviderErrorKind::Transient
    }
}

/// Terminal failure of one enrichment task.
///
/// Never fatal to the refresh cycle: only the one explanation is lost.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichmentError {
    /// Every allowed attempt failed with a transient error
    #[error("enrichment exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// The provider reported a permanent failure; no further attempts were made
    #[error("enrichment rejected after {attempts} attempt(s): {message}")]
    Rejected { attempts: u32, message: String },
}

impl EnrichmentError {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Rejected { attempts, .. } => *attempts,
        }
    }

    /// Message of the last provider error
    pub fn last_error(&self) -> &str {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::Rejected { message, .. } => message,
        }
    }
}
