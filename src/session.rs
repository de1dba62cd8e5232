//! Public façade: builder, shared handle, and per-request sessions.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, YggdrasilError};
use crate::keys::{self, IdentityHasher, KeyHasher};
use crate::store::tagged::TagFetch;
use crate::store::{KvStore, TaggedStore};
use crate::tags::Tag;
use crate::telemetry;
use crate::tree::TagTree;
use crate::types::{Fill, Remembered, TagMap, TaggedValue};

/// Shared cache handle: the backing store plus key-hashing configuration.
///
/// Cheap to clone; holds no request state. Per-request state lives in the
/// [`CacheSession`]s created from it.
pub struct Yggdrasil {
    core: Arc<Core>,
}

impl std::fmt::Debug for Yggdrasil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Yggdrasil").finish_non_exhaustive()
    }
}

struct Core {
    tagged: TaggedStore,
    hasher: Arc<dyn KeyHasher>,
}

impl Core {
    fn hashed_key(&self, key: &str) -> String {
        keys::value_key(self.hasher.as_ref(), key)
    }

    fn hashed_tag(&self, tag: &str) -> String {
        keys::tag_key(self.hasher.as_ref(), tag)
    }
}

impl Yggdrasil {
    /// Create a new builder for configuring a cache handle.
    pub fn builder() -> YggdrasilBuilder {
        YggdrasilBuilder::new()
    }

    /// Open a session for one logical request.
    ///
    /// The session owns the frame tree for that flow of control; nested
    /// calls share it by reference. Two sessions never share frames;
    /// cross-request coherence goes exclusively through the backing store.
    pub fn session(&self) -> CacheSession {
        CacheSession {
            core: Arc::clone(&self.core),
            tree: Mutex::new(TagTree::new()),
        }
    }

    /// Rotate the fingerprints of the given tags, lazily invalidating
    /// every cached value whose snapshot referenced them.
    pub async fn clear_tags<I, T>(&self, tags: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        let tag_keys: Vec<String> = tags
            .into_iter()
            .map(|tag| self.core.hashed_tag(&tag.into().resolve()))
            .collect();
        self.core.tagged.clear_tags(&tag_keys).await;
    }
}

impl Clone for Yggdrasil {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

/// Builder for cache handles.
pub struct YggdrasilBuilder {
    store: Option<Arc<dyn KvStore>>,
    hasher: Arc<dyn KeyHasher>,
}

impl YggdrasilBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            hasher: Arc::new(IdentityHasher),
        }
    }

    /// Set the backing store.
    pub fn store(mut self, store: impl KvStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set the backing store from an already shared handle.
    pub fn shared_store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the default identity key hasher.
    pub fn hasher(mut self, hasher: impl KeyHasher + 'static) -> Self {
        self.hasher = Arc::new(hasher);
        self
    }

    /// Build the cache handle.
    pub fn build(self) -> Result<Yggdrasil> {
        let store = self.store.ok_or(YggdrasilError::NoStore)?;
        Ok(Yggdrasil {
            core: Arc::new(Core {
                tagged: TaggedStore::new(store),
                hasher: self.hasher,
            }),
        })
    }
}

impl Default for YggdrasilBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Request-scoped façade over the shared cache.
///
/// One session serves one logical flow of control from its first
/// `remember`/`wrap` call to the last return; nested calls run to
/// completion before their parent continues, so the frame tree is a strict
/// stack. The tree sits behind a mutex that is only ever locked between
/// await points, never across one.
pub struct CacheSession {
    core: Arc<Core>,
    tree: Mutex<TagTree>,
}

impl CacheSession {
    /// Memoize `fill` under `key`.
    ///
    /// On a hit, whether in the request-local memo (populated by [`load`])
    /// or the backing store, the stored payload is returned and its tag snapshot
    /// merges into the calling frame, so enclosing cached values inherit
    /// the dependency. On a miss, `fill` runs inside a fresh frame seeded
    /// with the declared tags' fingerprints; whatever tags nested calls
    /// accumulate bubble up into the frame, and the frame's final union is
    /// snapshotted into the stored envelope.
    ///
    /// `ttl_secs` of 0 means no expiry. A finite TTL also stamps the frame
    /// with an expiring pseudo-tag, so enclosing cached values expire no
    /// later than this one. Nested TTLs compose, the shortest wins.
    ///
    /// The directive `fill` returns controls storage: [`Fill::Value`]
    /// stores and returns the payload, [`Fill::Bypass`] skips the write,
    /// [`Fill::Reveal`] stores and hands back
    /// [`Remembered::Revealed`] with the snapshot, on this call and every
    /// later hit.
    ///
    /// Backing-store faults never surface here: reads degrade to misses
    /// and writes are dropped, so the worst case is recomputation. Errors
    /// from `fill` propagate verbatim after the tree is unwound; nothing
    /// is stored for the failing frame or any enclosing one.
    ///
    /// [`load`]: CacheSession::load
    pub async fn remember<T, F, Fut>(
        &self,
        key: &str,
        ttl_secs: u64,
        tags: &[Tag],
        fill: F,
    ) -> Result<Remembered<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Fill<T>>>,
    {
        let hkey = self.core.hashed_key(key);
        let resolved = self.resolve(tags);
        let is_root = self.tree.lock().init();

        // Request-local memo, visible from any ancestor frame.
        let local = self.tree.lock().lookup_local(&hkey).cloned();
        if let Some(envelope) = local {
            if let Some(hit) = decode_hit::<T>(&envelope) {
                self.tree.lock().merge_into_current(&envelope.tags);
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => "local").increment(1);
                self.finish(is_root);
                return Ok(hit);
            }
        }

        // Backing store.
        if let Some(envelope) = self.core.tagged.get(&hkey).await {
            if let Some(hit) = decode_hit::<T>(&envelope) {
                self.tree.lock().merge_into_current(&envelope.tags);
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => "store").increment(1);
                self.finish(is_root);
                return Ok(hit);
            }
        }

        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        debug!(%key, "cache miss, running fill");

        let tag_keys: Vec<String> = resolved.iter().map(|(key, _)| key.clone()).collect();
        let TagFetch { hashes, readonly } = self
            .core
            .tagged
            .fetch_or_make_tag_hashes(&tag_keys, ttl_secs)
            .await;
        let declared_heritable = heritable_hashes(&resolved, &hashes);
        self.tree.lock().advance(hashes, declared_heritable);

        let fill = match fill().await {
            Ok(fill) => fill,
            Err(err) => {
                let mut tree = self.tree.lock();
                tree.pop_discard();
                if is_root {
                    tree.teardown();
                }
                return Err(err);
            }
        };

        let (value, bypass, revealed) = match fill {
            Fill::Value(value) => (value, false, false),
            Fill::Bypass(value) => (value, true, false),
            Fill::Reveal(value) => (value, false, true),
        };

        let snapshot = self.tree.lock().pop_merge();

        if !(readonly || bypass) {
            match serde_json::to_value(&value) {
                Ok(payload) => {
                    self.core
                        .tagged
                        .store(&hkey, ttl_secs, snapshot.clone(), payload, revealed)
                        .await;
                }
                Err(err) => {
                    self.finish(is_root);
                    return Err(YggdrasilError::Json(err));
                }
            }
        }

        self.finish(is_root);
        Ok(if revealed {
            Remembered::Revealed {
                value,
                tags: snapshot,
            }
        } else {
            Remembered::Value(value)
        })
    }

    /// Run `fill` inside its own frame without caching the frame's result.
    ///
    /// The declared tags (heritable ones especially) still bubble up
    /// into every enclosing `remember` snapshot, which is how a block can
    /// mark everything computed inside it as depending on a tag without
    /// adding a cache entry of its own.
    pub async fn wrap<T, F, Fut>(&self, tags: &[Tag], fill: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let resolved = self.resolve(tags);
        let is_root = self.tree.lock().init();

        let tag_keys: Vec<String> = resolved.iter().map(|(key, _)| key.clone()).collect();
        let TagFetch { hashes, .. } =
            self.core.tagged.fetch_or_make_tag_hashes(&tag_keys, 0).await;
        let declared_heritable = heritable_hashes(&resolved, &hashes);
        self.tree.lock().advance(hashes, declared_heritable);

        match fill().await {
            Ok(value) => {
                self.tree.lock().pop_merge();
                self.finish(is_root);
                Ok(value)
            }
            Err(err) => {
                let mut tree = self.tree.lock();
                tree.pop_discard();
                if is_root {
                    tree.teardown();
                }
                Err(err)
            }
        }
    }

    /// Preload `keys` into the request-local memo.
    ///
    /// Costs two backing-store round trips regardless of how many keys are
    /// given; nested `remember` calls for the still-valid ones then skip
    /// the store entirely. Each preloaded snapshot merges into the current
    /// frame immediately.
    pub async fn load<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hkeys: Vec<String> = keys
            .into_iter()
            .map(|key| self.core.hashed_key(key.as_ref()))
            .collect();
        if hkeys.is_empty() {
            return;
        }
        let is_root = self.tree.lock().init();
        let found = self.core.tagged.get_multiple(&hkeys).await;

        let mut tree = self.tree.lock();
        for envelope in found.values() {
            tree.merge_into_current(&envelope.tags);
        }
        tree.add_local(found);
        if is_root {
            tree.teardown();
        }
    }

    /// See [`Yggdrasil::clear_tags`].
    pub async fn clear_tags<I, T>(&self, tags: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        let tag_keys: Vec<String> = tags
            .into_iter()
            .map(|tag| self.core.hashed_tag(&tag.into().resolve()))
            .collect();
        self.core.tagged.clear_tags(&tag_keys).await;
    }

    fn resolve(&self, tags: &[Tag]) -> Vec<(String, bool)> {
        tags.iter()
            .map(|tag| (self.core.hashed_tag(&tag.resolve()), tag.is_heritable()))
            .collect()
    }

    fn finish(&self, is_root: bool) {
        if is_root {
            self.tree.lock().teardown();
        }
    }
}

/// Fingerprints of the heritable subset of the declared tags, as fetched.
/// In degraded (readonly) mode a fingerprint may be missing; the tag is
/// then skipped, which is safe because nothing will be stored either.
fn heritable_hashes(resolved: &[(String, bool)], hashes: &TagMap) -> TagMap {
    resolved
        .iter()
        .filter(|(_, heritable)| *heritable)
        .filter_map(|(key, _)| hashes.get(key).map(|fp| (key.clone(), fp.clone())))
        .collect()
}

/// Decode a hit. `None` means recompute: the stored payload no longer
/// matches `T`, so schema drift behaves like invalidation.
fn decode_hit<T: DeserializeOwned>(envelope: &TaggedValue) -> Option<Remembered<T>> {
    match serde_json::from_value::<T>(envelope.value.clone()) {
        Ok(value) => Some(if envelope.revealed {
            Remembered::Revealed {
                value,
                tags: envelope.tags.clone(),
            }
        } else {
            Remembered::Value(value)
        }),
        Err(err) => {
            debug!(%err, "stored payload no longer decodes, treating as miss");
            None
        }
    }
}
