//! Store configuration.

use boxdb_engine::{EngineOptions, Model};

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Options {
    /// The schema descriptor. Required.
    pub model: Option<Model>,

    /// Maximum size of stored data in KiB (0 = unbounded).
    pub max_db_size_in_kb: u64,

    /// Maximum number of concurrent read transactions (0 = unbounded).
    pub max_readers: u32,

    /// Number of idle encode buffers kept for reuse.
    pub buffer_pool_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        let engine = EngineOptions::default();
        Self {
            model: None,
            max_db_size_in_kb: engine.max_db_size_in_kb,
            max_readers: engine.max_readers,
            buffer_pool_size: 4,
        }
    }
}

impl Options {
    /// Creates options with default values and no model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the schema descriptor.
    #[must_use]
    pub fn model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }

    /// Sets the maximum database size in KiB.
    #[must_use]
    pub const fn max_db_size_in_kb(mut self, size: u64) -> Self {
        self.max_db_size_in_kb = size;
        self
    }

    /// Sets the maximum number of concurrent readers.
    #[must_use]
    pub const fn max_readers(mut self, readers: u32) -> Self {
        self.max_readers = readers;
        self
    }

    /// Sets the number of idle encode buffers kept for reuse.
    #[must_use]
    pub const fn buffer_pool_size(mut self, size: usize) -> Self {
        self.buffer_pool_size = size;
        self
    }

    pub(crate) fn engine_options(&self) -> EngineOptions {
        EngineOptions::new()
            .max_db_size_in_kb(self.max_db_size_in_kb)
            .max_readers(self.max_readers)
    }
}
