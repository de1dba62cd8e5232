//! Envelopes and fill directives.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Mapping from backing-store tag key to the fingerprint observed for it.
pub type TagMap = BTreeMap<String, String>;

/// The envelope persisted under a cache key: the payload plus a snapshot of
/// every tag fingerprint the computation depended on at write time,
/// including tags bubbled up from nested fills the caller never declared.
///
/// A stored envelope is valid exactly as long as every snapshot entry still
/// matches the current fingerprint in the backing store; a rotated or
/// missing fingerprint invalidates it lazily on the next read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedValue {
    /// The memoized payload.
    pub value: serde_json::Value,
    /// Tag key → fingerprint snapshot taken at write time.
    pub tags: TagMap,
    /// Whether hits hand the caller the snapshot alongside the payload
    /// (set by [`Fill::Reveal`]).
    #[serde(default)]
    pub revealed: bool,
}

/// What a fill callback hands back to
/// [`remember`](crate::CacheSession::remember).
///
/// Inspected after the callback returns; the directive decides what is
/// stored and what the caller sees.
#[derive(Debug, Clone, PartialEq)]
pub enum Fill<T> {
    /// Store the value and return it.
    Value(T),
    /// Return the value but store nothing.
    Bypass(T),
    /// Store the value and return it together with its tag snapshot, on
    /// this call and on every later hit.
    Reveal(T),
}

/// What [`remember`](crate::CacheSession::remember) hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum Remembered<T> {
    Value(T),
    /// Payload plus the snapshot it was stored with ([`Fill::Reveal`]).
    Revealed { value: T, tags: TagMap },
}

impl<T> Remembered<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Value(value) | Self::Revealed { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Value(value) | Self::Revealed { value, .. } => value,
        }
    }

    /// The tag snapshot, when this result was revealed.
    pub fn tags(&self) -> Option<&TagMap> {
        match self {
            Self::Value(_) => None,
            Self::Revealed { tags, .. } => Some(tags),
        }
    }
}
