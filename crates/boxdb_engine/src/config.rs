//! Engine configuration.

/// Limits applied by an engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Upper bound of stored payload bytes, in KiB (0 = unbounded).
    pub max_db_size_in_kb: u64,

    /// Maximum number of concurrently open read transactions (0 = unbounded).
    pub max_readers: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_db_size_in_kb: 1024 * 1024, // 1 GiB
            max_readers: 126,
        }
    }
}

impl EngineOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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

    /// The size bound in bytes, if any.
    #[must_use]
    pub const fn max_db_size_bytes(&self) -> Option<u64> {
        if self.max_db_size_in_kb == 0 {
            None
        } else {
            Some(self.max_db_size_in_kb.saturating_mul(1024))
        }
    }
}
