//! Reusable serialization buffers.
//!
//! Every put encodes its object into an [`EncodeBuffer`] before handing the
//! bytes to the engine. Buffers are cleared before each encode and dropped
//! back to an empty allocation when they grew past [`BUFFER_RETAIN_LIMIT`],
//! so a single huge object does not pin memory for the rest of the process.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// Backing allocation size above which a buffer is released after use.
pub const BUFFER_RETAIN_LIMIT: usize = 1024 * 1024;

/// A growable byte buffer reused across encodes.
#[derive(Debug, Default, Clone)]
pub struct EncodeBuffer {
    bytes: Vec<u8>,
}

impl EncodeBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer with the given initial capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Removes all content, keeping the allocation.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// The encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the encoded content.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if nothing is encoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Size of the backing allocation.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Appends raw bytes.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Clears the buffer and releases its allocation if it exceeds
    /// [`BUFFER_RETAIN_LIMIT`].
    pub fn clean_after_use(&mut self) {
        if self.bytes.capacity() > BUFFER_RETAIN_LIMIT {
            self.bytes = Vec::new();
        } else {
            self.bytes.clear();
        }
    }

    pub(crate) fn writer(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }
}

/// A pool of idle encode buffers.
///
/// Each caller checks out its own buffer, so concurrent puts from different
/// threads never share encode state.
#[derive(Debug)]
pub struct BufferPool {
    idle: Mutex<Vec<EncodeBuffer>>,
    max_idle: usize,
}

impl BufferPool {
    /// Creates a pool retaining at most `max_idle` idle buffers.
    #[must_use]
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        }
    }

    /// Checks out a cleared buffer; it returns to the pool when dropped.
    pub fn acquire(&self) -> PooledBuffer<'_> {
        let mut buffer = self.idle.lock().pop().unwrap_or_default();
        buffer.clear();
        PooledBuffer { pool: self, buffer }
    }

    /// Number of buffers currently idle in the pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, mut buffer: EncodeBuffer) {
        buffer.clean_after_use();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(buffer);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(4)
    }
}

/// A buffer checked out of a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuffer<'p> {
    pool: &'p BufferPool,
    buffer: EncodeBuffer,
}

impl Deref for PooledBuffer<'_> {
    type Target = EncodeBuffer;

    fn deref(&self) -> &EncodeBuffer {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut EncodeBuffer {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buffer));
    }
}
