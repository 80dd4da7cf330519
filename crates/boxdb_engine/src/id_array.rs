//! Engine-owned id arrays.

use crate::types::ObjectId;

/// A fixed-size id array allocated by the engine.
///
/// The array is owned by the engine: callers copy what they need and then
/// hand it back through [`crate::Engine::free_id_array`], exactly once.
/// `count` is the number of valid entries the engine reports; an engine
/// that reports more entries than it allocated produces an array callers
/// must reject.
#[derive(Debug, PartialEq, Eq)]
pub struct IdArray {
    ids: Vec<ObjectId>,
    count: usize,
    token: u64,
}

impl IdArray {
    /// Creates an array owned by the engine allocation `token`.
    #[must_use]
    pub fn new(ids: Vec<ObjectId>, token: u64) -> Self {
        let count = ids.len();
        Self { ids, count, token }
    }

    /// Creates an array whose reported count differs from its allocation.
    #[must_use]
    pub fn with_count(ids: Vec<ObjectId>, count: usize, token: u64) -> Self {
        Self { ids, count, token }
    }

    /// Number of entries the engine reports.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// The allocated entries.
    #[must_use]
    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    /// The engine allocation this array belongs to.
    #[must_use]
    pub fn token(&self) -> u64 {
        self.token
    }
}
