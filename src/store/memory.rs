//! In-process [`KvStore`] backend.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;

use super::{KvStore, StoreResult};

/// A stored blob plus the TTL it was written with.
#[derive(Clone)]
struct Entry {
    bytes: Vec<u8>,
    ttl_secs: u64,
}

/// Applies each entry's own TTL; 0 means the entry never expires.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        (entry.ttl_secs > 0).then(|| Duration::from_secs(entry.ttl_secs))
    }

    fn expire_after_update(
        &self,
        key: &String,
        entry: &Entry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // Overwrites take the new entry's TTL, not the old deadline.
        self.expire_after_create(key, entry, updated_at)
    }
}

/// In-memory `KvStore` for tests and single-process deployments.
///
/// Backed by a moka future cache with per-entry expiry matching the KV
/// contract (TTL in seconds, 0 = no expiry). Infallible: it never reports
/// a store fault.
pub struct MemoryStore {
    cache: Cache<String, Entry>,
}

impl MemoryStore {
    /// Create a store with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(100_000)
    }

    /// Create a store bounded to roughly `max_entries` entries.
    pub fn with_capacity(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.cache.get(key).await.map(|entry| entry.bytes))
    }

    async fn get_multi(&self, keys: &[String]) -> StoreResult<HashMap<String, Vec<u8>>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.cache.get(key).await {
                found.insert(key.clone(), entry.bytes);
            }
        }
        Ok(found)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> StoreResult<()> {
        self.cache
            .insert(key.to_string(), Entry { bytes: value, ttl_secs })
            .await;
        Ok(())
    }

    async fn set_multi(&self, entries: Vec<(String, Vec<u8>)>, ttl_secs: u64) -> StoreResult<()> {
        for (key, value) in entries {
            self.cache.insert(key, Entry { bytes: value, ttl_secs }).await;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}
