//! Yggdrasil error types

use std::error::Error as StdError;

/// Yggdrasil error types
///
/// Backing-store faults never appear here: the cache degrades to a miss on
/// failed reads and drops failed writes, per the coherence rules. What does
/// surface is strictly caller-owned: fill callbacks that fail, payloads
/// that cannot be encoded, and misconfiguration at build time.
#[derive(Debug, thiserror::Error)]
pub enum YggdrasilError {
    /// A fill callback failed. The tree is unwound and nothing is stored
    /// for the failing frame or any enclosing frame still executing.
    #[error("fill callback failed: {0}")]
    Callback(#[source] Box<dyn StdError + Send + Sync>),

    /// The payload could not be encoded for storage. The computed value is
    /// sound but its shape does not survive the JSON codec, so the write
    /// was skipped.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `build()` was called without a backing store.
    #[error("no backing store configured")]
    NoStore,
}

impl YggdrasilError {
    /// Wrap an arbitrary application error for propagation out of a fill
    /// callback.
    pub fn callback(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Callback(err.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, YggdrasilError>;
