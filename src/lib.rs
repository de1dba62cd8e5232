//! Yggdrasil — tag-tree memoization over a remote key-value store.
//!
//! This crate memoizes the results of arbitrary async computations in a
//! memcached-shaped [`KvStore`] and supports coarse invalidation through
//! surrogate keys called *tags*. Its distinguishing feature is the tag
//! tree: when a memoized computation transitively calls other memoized
//! computations, the outer cached value automatically depends on the union
//! of every tag the inner ones used. Rotating any of those tags with
//! [`clear_tags`](Yggdrasil::clear_tags) invalidates every enclosing
//! cached value; no scope ever has to declare its transitive
//! dependencies.
//!
//! Invalidation is lazy and O(1): each tag's validity is a random
//! fingerprint stored next to the data, snapshotted into every envelope at
//! write time and compared on read. Nothing is ever scanned or enumerated.
//!
//! # Example
//!
//! ```rust
//! use yggdrasil::{Fill, MemoryStore, Tag, Yggdrasil};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> yggdrasil::Result<()> {
//! let cache = Yggdrasil::builder().store(MemoryStore::new()).build()?;
//! let session = cache.session();
//!
//! let page = session
//!     .remember("page:home", 0, &[Tag::plain("layout")], || async {
//!         Ok(Fill::Value("rendered".to_string()))
//!     })
//!     .await?
//!     .into_value();
//! assert_eq!(page, "rendered");
//!
//! // Rotating a tag fingerprint lazily invalidates everything whose
//! // snapshot referenced it.
//! cache.clear_tags(["layout"]).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Nested dependencies
//!
//! Open one [`CacheSession`] per logical request and route every nested
//! call through it. An inner `remember`'s tags bubble into the enclosing
//! frame when it returns, so the outer envelope's snapshot is always a
//! superset of the inner ones. [`Tag::heritable`] pushes a tag *down* into
//! every nested frame as well, and
//! [`wrap`](CacheSession::wrap) declares tags for a block without caching
//! the block itself. [`load`](CacheSession::load) preloads a batch of keys
//! in two store round trips so nested `remember` calls hit the
//! request-local memo instead of the network.
//!
//! # Degradation
//!
//! The backing store is allowed to fail: reads degrade to misses, writes
//! are dropped, and the computation always runs to completion. Only fill
//! callback errors (and payloads that cannot be JSON-encoded) surface to
//! the caller.

pub mod error;
pub mod keys;
pub mod session;
pub mod store;
pub mod tags;
pub mod telemetry;
pub mod types;

mod tree;

// Re-export main types at crate root
pub use error::{Result, YggdrasilError};
pub use keys::{IdentityHasher, KeyHasher, Sha256Hasher};
pub use session::{CacheSession, Yggdrasil, YggdrasilBuilder};
pub use store::{KvStore, MemoryStore, StoreError, StoreResult, TaggedStore};
pub use tags::Tag;
pub use types::{Fill, Remembered, TagMap, TaggedValue};
