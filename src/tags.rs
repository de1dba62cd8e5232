//! Tag variants and resolution.

use std::hash::{DefaultHasher, Hash, Hasher};

/// A surrogate key declaring a dependency of a cached value.
///
/// Rotating a tag's fingerprint (see
/// [`clear_tags`](crate::Yggdrasil::clear_tags)) lazily invalidates every
/// cached value whose snapshot referenced it, without enumerating those
/// values. Tags come in three shapes:
///
/// - [`Tag::Plain`]: a literal tag string such as `"user:42"`.
/// - [`Tag::Heritable`]: applies to the declaring frame *and every frame
///   nested inside it*, so a whole subtree of cached values can be
///   invalidated from one declaration point.
/// - [`Tag::Sharding`]: resolves to `namespace:bucket`, the bucket being a
///   stable hash of the routing value modulo the bucket count. Clearing one
///   bucket invalidates exactly the partition that hashes into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Plain(String),
    Heritable(String),
    Sharding {
        namespace: String,
        routing: String,
        buckets: u32,
    },
}

impl Tag {
    pub fn plain(name: impl Into<String>) -> Self {
        Self::Plain(name.into())
    }

    pub fn heritable(name: impl Into<String>) -> Self {
        Self::Heritable(name.into())
    }

    /// # Panics
    ///
    /// Panics if `buckets` is 0.
    pub fn sharding(
        namespace: impl Into<String>,
        routing: impl Into<String>,
        buckets: u32,
    ) -> Self {
        assert!(buckets > 0, "buckets must be > 0");
        Self::Sharding {
            namespace: namespace.into(),
            routing: routing.into(),
            buckets,
        }
    }

    /// Resolve to the plain tag string under which the fingerprint lives.
    pub fn resolve(&self) -> String {
        match self {
            Self::Plain(name) | Self::Heritable(name) => name.clone(),
            Self::Sharding {
                namespace,
                routing,
                buckets,
            } => format!("{namespace}:{}", stable_bucket(routing, *buckets)),
        }
    }

    /// Whether this tag flows down into nested frames.
    pub fn is_heritable(&self) -> bool {
        matches!(self, Self::Heritable(_))
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Self::Plain(name.to_string())
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Self::Plain(name)
    }
}

/// Map a routing value to a bucket in `[0, buckets)`.
///
/// Uses the standard `DefaultHasher` keyed to nothing, so the mapping is
/// deterministic for a given build and uniform across buckets. The function
/// is fixed at compile time; it must never change while tagged data derived
/// from it is live.
pub fn stable_bucket(routing: &str, buckets: u32) -> u32 {
    let mut hasher = DefaultHasher::new();
    routing.hash(&mut hasher);
    (hasher.finish() % u64::from(buckets)) as u32
}
