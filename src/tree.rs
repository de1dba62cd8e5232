//! Per-request frame stack tracking tag dependencies.
//!
//! Each `remember`/`wrap` invocation runs inside a frame. Frames form a
//! strict stack: a child's accumulated tags merge into its parent when it
//! pops, so an outer cached value transitively depends on every tag any
//! nested fill touched, without the outer scope declaring any of them.

use std::collections::HashMap;

use crate::types::{TagMap, TaggedValue};

/// One memoization frame.
#[derive(Debug, Default)]
struct Frame {
    /// Union of this frame's declared tag fingerprints, heritable
    /// fingerprints in scope, and everything bubbled up from popped
    /// children.
    tags: TagMap,
    /// Heritable fingerprints in scope for this frame and every descendant
    /// pushed from it.
    heritable: TagMap,
    /// Request-local memo, visible to this frame's descendants.
    local: HashMap<String, TaggedValue>,
}

/// Strict stack of frames rooted at the outermost active call.
///
/// The tree exists only while an outermost call is running; tearing down
/// the root discards all request-scoped state. Pop order is reverse push
/// order by construction.
#[derive(Debug, Default)]
pub(crate) struct TagTree {
    frames: Vec<Frame>,
}

impl TagTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the root frame if none exists. Returns true when this call
    /// created it; that caller owns teardown.
    pub fn init(&mut self) -> bool {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
            true
        } else {
            false
        }
    }

    /// Discard the whole tree.
    pub fn teardown(&mut self) {
        self.frames.clear();
    }

    /// Push a child frame.
    ///
    /// The child starts from the fetched tag hashes plus every heritable
    /// fingerprint in scope; `declared_heritable` extends that scope for
    /// the child and its descendants.
    pub fn advance(&mut self, seed: TagMap, declared_heritable: TagMap) {
        let mut heritable = self.current().heritable.clone();
        heritable.extend(declared_heritable);
        let mut tags = seed;
        for (key, fingerprint) in &heritable {
            tags.entry(key.clone()).or_insert_with(|| fingerprint.clone());
        }
        self.frames.push(Frame {
            tags,
            heritable,
            local: HashMap::new(),
        });
    }

    /// Pop the current frame, merging its final tags into the parent.
    /// Returns the popped frame's snapshot.
    pub fn pop_merge(&mut self) -> TagMap {
        let frame = self.frames.pop().expect("pop without a pushed frame");
        if let Some(parent) = self.frames.last_mut() {
            for (key, fingerprint) in &frame.tags {
                parent.tags.insert(key.clone(), fingerprint.clone());
            }
        }
        frame.tags
    }

    /// Pop the current frame without bubbling anything up (failed fill).
    pub fn pop_discard(&mut self) {
        self.frames.pop();
    }

    /// Merge a hit's snapshot into the current frame, so the caller
    /// inherits the dependency.
    pub fn merge_into_current(&mut self, tags: &TagMap) {
        let current = self.current_mut();
        for (key, fingerprint) in tags {
            current.tags.insert(key.clone(), fingerprint.clone());
        }
    }

    /// Request-local memo lookup, walking from the current frame to the
    /// root so descendants see what their ancestors preloaded.
    pub fn lookup_local(&self, key: &str) -> Option<&TaggedValue> {
        self.frames.iter().rev().find_map(|frame| frame.local.get(key))
    }

    /// Insert preloaded envelopes into the current frame's memo.
    pub fn add_local(&mut self, entries: impl IntoIterator<Item = (String, TaggedValue)>) {
        self.current_mut().local.extend(entries);
    }

    fn current(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    fn current_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }
}
