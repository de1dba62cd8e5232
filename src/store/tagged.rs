//! Tag-fingerprint bookkeeping over a [`KvStore`].
//!
//! A tag's validity is encoded as a random 128-bit fingerprint stored under
//! the tag's key. Envelopes snapshot the fingerprints they depend on at
//! write time; a read is a hit only while every snapshot entry still
//! matches the store. Rotating a fingerprint therefore invalidates every
//! dependent envelope in O(1), without ever enumerating them.
//!
//! Every backing-store fault is absorbed at this layer: reads degrade to
//! misses, writes are dropped, and a `readonly` marker keeps a degraded
//! fill from storing an envelope whose fingerprints were never observed.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::telemetry;
use crate::types::{TagMap, TaggedValue};

use super::{KvStore, StoreError};

/// Method identifier baked into TTL pseudo-tag keys.
const TTL_TAG_METHOD: &str = "remember";

/// Result of [`TaggedStore::fetch_or_make_tag_hashes`].
pub struct TagFetch {
    /// Tag key → current (possibly freshly minted) fingerprint.
    pub hashes: TagMap,
    /// True when the store could not be read; nothing may be written for
    /// this fill.
    pub readonly: bool,
}

/// Stores tagged envelopes and maintains tag fingerprints.
pub struct TaggedStore {
    store: Arc<dyn KvStore>,
}

impl TaggedStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Fetch the envelope at `key`, returning it only if every fingerprint
    /// in its snapshot still matches the store.
    pub async fn get(&self, key: &str) -> Option<TaggedValue> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                self.store_fault("get", &err);
                return None;
            }
        };
        let envelope = match serde_json::from_slice::<TaggedValue>(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(%key, %err, "undecodable envelope, treating as miss");
                return None;
            }
        };
        if envelope.tags.is_empty() {
            return Some(envelope);
        }
        let tag_keys: Vec<String> = envelope.tags.keys().cloned().collect();
        let current = match self.store.get_multi(&tag_keys).await {
            Ok(current) => current,
            Err(err) => {
                self.store_fault("get_multi", &err);
                return None;
            }
        };
        if snapshot_matches(&envelope.tags, &current) {
            Some(envelope)
        } else {
            debug!(%key, "fingerprint rotated or missing, envelope invalid");
            None
        }
    }

    /// Fetch many envelopes in two round trips: one multi-get for the
    /// values, one for the union of their tag fingerprints. Only envelopes
    /// whose full snapshot still matches are returned.
    pub async fn get_multiple(&self, keys: &[String]) -> HashMap<String, TaggedValue> {
        let raw = match self.store.get_multi(keys).await {
            Ok(raw) => raw,
            Err(err) => {
                self.store_fault("get_multi", &err);
                return HashMap::new();
            }
        };
        let mut envelopes: HashMap<String, TaggedValue> = HashMap::with_capacity(raw.len());
        for (key, bytes) in raw {
            match serde_json::from_slice::<TaggedValue>(&bytes) {
                Ok(envelope) => {
                    envelopes.insert(key, envelope);
                }
                Err(err) => debug!(%key, %err, "undecodable envelope, skipping"),
            }
        }

        let mut tag_keys: Vec<String> = envelopes
            .values()
            .flat_map(|envelope| envelope.tags.keys().cloned())
            .collect();
        tag_keys.sort_unstable();
        tag_keys.dedup();

        let current = if tag_keys.is_empty() {
            HashMap::new()
        } else {
            match self.store.get_multi(&tag_keys).await {
                Ok(current) => current,
                Err(err) => {
                    self.store_fault("get_multi", &err);
                    return HashMap::new();
                }
            }
        };
        envelopes.retain(|_, envelope| snapshot_matches(&envelope.tags, &current));
        envelopes
    }

    /// Ensure every tag in `tag_keys` has a current fingerprint, minting
    /// and writing back any that are missing.
    ///
    /// A TTL pseudo-tag keyed on `ttl_secs` and a fresh nonce is threaded
    /// through the same lookup. With `ttl_secs > 0` it stays in the result
    /// and is stored with that expiry, so every enclosing envelope expires
    /// no later than this fill does. With `ttl_secs == 0` it is dropped
    /// from the result and never stored, so nothing flows upward for
    /// non-expiring fills.
    pub async fn fetch_or_make_tag_hashes(&self, tag_keys: &[String], ttl_secs: u64) -> TagFetch {
        let ttl_tag = ttl_tag_key(ttl_secs);
        let mut wanted = Vec::with_capacity(tag_keys.len() + 1);
        wanted.push(ttl_tag.clone());
        wanted.extend_from_slice(tag_keys);

        let current = match self.store.get_multi(&wanted).await {
            Ok(current) => current,
            Err(err) => {
                self.store_fault("get_multi", &err);
                return TagFetch {
                    hashes: TagMap::new(),
                    readonly: true,
                };
            }
        };

        let mut hashes = TagMap::new();
        let mut minted: Vec<(String, Vec<u8>)> = Vec::new();
        for key in &wanted {
            match current.get(key).and_then(|raw| fingerprint_from_bytes(raw)) {
                Some(fingerprint) => {
                    hashes.insert(key.clone(), fingerprint);
                }
                None => {
                    let fingerprint = mint_fingerprint();
                    minted.push((key.clone(), fingerprint.clone().into_bytes()));
                    hashes.insert(key.clone(), fingerprint);
                }
            }
        }

        // The pseudo-tag nonce is fresh per fill, so it is always minted.
        if ttl_secs == 0 {
            hashes.remove(&ttl_tag);
            minted.retain(|(key, _)| key != &ttl_tag);
        } else if let Some(position) = minted.iter().position(|(key, _)| key == &ttl_tag) {
            let (key, fingerprint) = minted.swap_remove(position);
            if let Err(err) = self.store.set(&key, fingerprint, ttl_secs).await {
                self.store_fault("set", &err);
            }
        }

        if !minted.is_empty() {
            if let Err(err) = self.store.set_multi(minted, 0).await {
                self.store_fault("set_multi", &err);
            }
        }

        TagFetch {
            hashes,
            readonly: false,
        }
    }

    /// Persist an envelope. Write faults are dropped: the caller already
    /// holds the computed value, and an unwritten envelope just means a
    /// recompute on the next read.
    pub async fn store(
        &self,
        key: &str,
        ttl_secs: u64,
        tags: TagMap,
        value: serde_json::Value,
        revealed: bool,
    ) {
        let envelope = TaggedValue {
            value,
            tags,
            revealed,
        };
        let bytes = match serde_json::to_vec(&envelope) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%key, %err, "envelope failed to serialize, skipping write");
                return;
            }
        };
        if let Err(err) = self.store.set(key, bytes, ttl_secs).await {
            self.store_fault("set", &err);
        }
    }

    /// Rotate the fingerprint of every given tag key, lazily invalidating
    /// all envelopes whose snapshots referenced the old ones. Rotating a
    /// tag twice is harmless, both rotations mint fresh random nonces.
    pub async fn clear_tags(&self, tag_keys: &[String]) {
        if tag_keys.is_empty() {
            return;
        }
        let entries: Vec<(String, Vec<u8>)> = tag_keys
            .iter()
            .map(|key| (key.clone(), mint_fingerprint().into_bytes()))
            .collect();
        match self.store.set_multi(entries, 0).await {
            Ok(()) => {
                metrics::counter!(telemetry::TAG_CLEARS_TOTAL).increment(tag_keys.len() as u64);
            }
            Err(err) => self.store_fault("set_multi", &err),
        }
    }

    fn store_fault(&self, operation: &'static str, err: &StoreError) {
        warn!(operation, %err, "backing store fault, degrading");
        metrics::counter!(telemetry::STORE_ERRORS_TOTAL, "operation" => operation).increment(1);
    }
}

/// Every snapshot entry must match the currently stored fingerprint; a
/// missing fingerprint invalidates.
fn snapshot_matches(snapshot: &TagMap, current: &HashMap<String, Vec<u8>>) -> bool {
    snapshot.iter().all(|(key, fingerprint)| {
        current.get(key).and_then(|raw| fingerprint_from_bytes(raw)).as_deref()
            == Some(fingerprint.as_str())
    })
}

/// Mint a fresh 128-bit fingerprint as 32 lowercase hex chars.
fn mint_fingerprint() -> String {
    Uuid::new_v4().simple().to_string()
}

fn fingerprint_from_bytes(raw: &[u8]) -> Option<String> {
    std::str::from_utf8(raw).ok().map(str::to_string)
}

/// Key for the TTL pseudo-tag of one fill. Opaque, never user-constructed;
/// the fresh nonce keeps concurrent fills from sharing expiry.
fn ttl_tag_key(ttl_secs: u64) -> String {
    format!("{TTL_TAG_METHOD}:ttl:{ttl_secs}:{}", Uuid::new_v4().simple())
}
