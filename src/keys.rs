//! Cache-key and tag-key hashing.
//!
//! User keys and resolved tag names pass through a [`KeyHasher`] before
//! being prefixed into backing-store keys: `k:<hash>` for cache values,
//! `t:<hash>` for tag fingerprints.

use std::fmt::Write;

use sha2::{Digest, Sha256};

/// Prefix for cache-value keys in the backing store.
pub(crate) const VALUE_KEY_PREFIX: &str = "k:";

/// Prefix for tag fingerprint keys in the backing store.
pub(crate) const TAG_KEY_PREFIX: &str = "t:";

/// Pluggable hash applied to user cache keys and resolved tag names.
///
/// The default [`IdentityHasher`] keeps keys readable; [`Sha256Hasher`]
/// bounds key length for stores with key-size limits. Whichever is chosen
/// must not change over the lifetime of the stored data, since switching
/// hashers orphans every existing entry.
pub trait KeyHasher: Send + Sync {
    fn hash(&self, raw: &str) -> String;
}

/// Pass-through hasher (the default).
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityHasher;

impl KeyHasher for IdentityHasher {
    fn hash(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// SHA-256 hex-digest hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl KeyHasher for Sha256Hasher {
    fn hash(&self, raw: &str) -> String {
        let digest = Sha256::digest(raw.as_bytes());
        let mut out = String::with_capacity(64);
        for byte in digest {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

/// Backing-store key for a user cache key.
pub(crate) fn value_key(hasher: &dyn KeyHasher, key: &str) -> String {
    format!("{VALUE_KEY_PREFIX}{}", hasher.hash(key))
}

/// Backing-store key for a resolved tag name.
pub(crate) fn tag_key(hasher: &dyn KeyHasher, tag: &str) -> String {
    format!("{TAG_KEY_PREFIX}{}", hasher.hash(tag))
}
