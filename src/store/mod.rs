//! Backing-store contracts and implementations.
//!
//! [`KvStore`] is the narrow async contract the cache consumes from a
//! remote key-value store (memcached-shaped: opaque byte values, per-key
//! TTL, multi-get). [`TaggedStore`] layers tag-fingerprint bookkeeping on
//! top of it; [`MemoryStore`] is the in-process implementation used by
//! tests and single-process deployments.

pub mod memory;
pub mod tagged;

pub use memory::MemoryStore;
pub use tagged::TaggedStore;

use std::collections::HashMap;

use async_trait::async_trait;

/// Errors surfaced by [`KvStore`] implementations.
///
/// The tagged store treats every variant as "store unavailable": reads
/// degrade to misses and writes are dropped. Neither ever reaches the
/// caller of the façade.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered outside its known-success / known-miss protocol.
    #[error("store protocol violation: {0}")]
    Protocol(String),
}

/// Result alias for [`KvStore`] operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Contract consumed from a remote key-value store.
///
/// Values are opaque blobs; the store never interprets them. A TTL of 0
/// means no expiry, positive values are seconds. No compare-and-set is
/// required; invalidation is last-write-wins fingerprint rotation, and no
/// implementation may hold a store-side lock.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a single value, `None` when absent.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Fetch many values in one round trip; only keys present appear in
    /// the result.
    async fn get_multi(&self, keys: &[String]) -> StoreResult<HashMap<String, Vec<u8>>>;

    /// Write a single value with the given TTL.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> StoreResult<()>;

    /// Write many values, all with the same TTL, in one round trip.
    async fn set_multi(&self, entries: Vec<(String, Vec<u8>)>, ttl_secs: u64) -> StoreResult<()>;

    /// Remove a single value. Absent keys are not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}
