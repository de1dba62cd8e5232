//! Telemetry metric name constants.
//!
//! Centralised metric names for yggdrasil operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `yggdrasil_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `tier` — where a hit landed: "local" (request memo) or "store"
//! - `operation` — the backing-store call that faulted (e.g. "get",
//!   "set_multi")

/// Total cache hits.
///
/// Labels: `tier` ("local" | "store").
pub const CACHE_HITS_TOTAL: &str = "yggdrasil_cache_hits_total";

/// Total cache misses (a fill callback was executed).
pub const CACHE_MISSES_TOTAL: &str = "yggdrasil_cache_misses_total";

/// Total backing-store faults swallowed by the degrade path.
///
/// Labels: `operation`.
pub const STORE_ERRORS_TOTAL: &str = "yggdrasil_store_errors_total";

/// Total tag fingerprints rotated by `clear_tags`.
pub const TAG_CLEARS_TOTAL: &str = "yggdrasil_tag_clears_total";
