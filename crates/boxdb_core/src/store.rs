//! The store: owner of the engine connection.

use crate::config::Options;
use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use boxdb_codec::BufferPool;
use boxdb_engine::{Engine, MemoryEngine, TxMode};
use std::fmt;
use std::sync::Arc;

/// An open store.
///
/// The store owns the engine connection and the pool of encode buffers.
/// Transactions and boxes borrow the store, so it outlives everything
/// derived from it. The engine is closed exactly once: by [`Store::close`],
/// or when the store is dropped.
///
/// # Example
///
/// ```rust
/// use boxdb_core::{Model, Options, PropertyFlags, PropertyType, Store};
///
/// let model = Model::new()
///     .entity("Note", 1)
///     .property("id", 1, PropertyType::Long, PropertyFlags::ID);
/// let store = Store::open(Options::new().model(model)).unwrap();
/// store.close().unwrap();
/// ```
pub struct Store {
    engine: Arc<dyn Engine>,
    buffers: BufferPool,
    closed: bool,
}

impl Store {
    /// Opens a store backed by a [`MemoryEngine`].
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if no model is given or it fails validation; the
    /// validator's code and message are attached. Engine failures while
    /// opening are returned as engine errors.
    pub fn open(mut options: Options) -> CoreResult<Self> {
        let model = options
            .model
            .take()
            .ok_or_else(|| CoreError::invalid_argument("no model given"))?;
        if let Err(error) = model.validate() {
            return Err(CoreError::InvalidArgument {
                message: error.message,
                code: Some(error.code),
            });
        }

        let engine = MemoryEngine::open(model, options.engine_options())?;
        tracing::debug!(
            max_db_size_in_kb = options.max_db_size_in_kb,
            max_readers = options.max_readers,
            "store opened"
        );
        Ok(Self::with_engine(Arc::new(engine), options.buffer_pool_size))
    }

    /// Creates a store over an already opened engine.
    #[must_use]
    pub fn with_engine(engine: Arc<dyn Engine>, buffer_pool_size: usize) -> Self {
        Self {
            engine,
            buffers: BufferPool::new(buffer_pool_size),
            closed: false,
        }
    }

    /// The underlying engine.
    #[must_use]
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub(crate) fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// Runs `f` in a read transaction.
    pub fn read<R>(&self, f: impl FnOnce(&Transaction<'_>) -> CoreResult<R>) -> CoreResult<R> {
        let mut tx = Transaction::begin(self, TxMode::Read)?;
        let result = f(&tx);
        tx.close()?;
        result
    }

    /// Runs `f` in a write transaction, committing only if `f` succeeds.
    pub fn write<R>(&self, f: impl FnOnce(&Transaction<'_>) -> CoreResult<R>) -> CoreResult<R> {
        let mut tx = Transaction::begin(self, TxMode::Write)?;
        let value = f(&tx)?;
        tx.mark_success()?;
        Ok(value)
    }

    /// Closes the store and its engine.
    pub fn close(mut self) -> CoreResult<()> {
        self.closed = true;
        self.engine.close()?;
        tracing::debug!("store closed");
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(error) = self.engine.close() {
            tracing::warn!(%error, "failed to close store engine");
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("idle_buffers", &self.buffers.idle_count())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
