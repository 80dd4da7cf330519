//! Scoped transactions.

use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use boxdb_engine::{TxMode, TxnHandle};
use std::marker::PhantomData;

/// A read or write transaction against a [`Store`].
///
/// A transaction is closed exactly once: by [`Transaction::mark_success`],
/// by [`Transaction::close`], or when it goes out of scope. A write
/// transaction commits only if it was marked successful; everything else is
/// rolled back.
///
/// Transactions are bound to the thread that began them and are therefore
/// neither `Send` nor `Sync`.
///
/// Transactions do not nest. Each one is independent; operations that must
/// share a transaction receive it explicitly (see the `*_in` methods of
/// [`crate::EntityBox`]).
#[derive(Debug)]
pub struct Transaction<'s> {
    store: &'s Store,
    handle: Option<TxnHandle>,
    mode: TxMode,
    successful: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl<'s> Transaction<'s> {
    /// Begins a transaction.
    pub fn begin(store: &'s Store, mode: TxMode) -> CoreResult<Self> {
        let handle = store.engine().txn_begin(mode)?;
        tracing::trace!(txn = handle.as_u64(), ?mode, "transaction begun");
        Ok(Self {
            store,
            handle: Some(handle),
            mode,
            successful: false,
            _thread_bound: PhantomData,
        })
    }

    /// The transaction mode.
    #[must_use]
    pub fn mode(&self) -> TxMode {
        self.mode
    }

    /// Returns true for read transactions.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.mode == TxMode::Read
    }

    /// Returns true once the transaction was marked successful.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.successful
    }

    /// Returns true once the transaction is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Marks a write transaction successful and closes it, committing.
    ///
    /// # Errors
    ///
    /// `InvalidState` for read transactions and closed transactions. If both
    /// marking and closing fail, the close error is returned.
    pub fn mark_success(&mut self) -> CoreResult<()> {
        if self.is_read_only() {
            return Err(CoreError::invalid_state(
                "a read transaction cannot be marked successful",
            ));
        }
        let Some(handle) = self.handle else {
            return Err(CoreError::invalid_state("transaction is already closed"));
        };

        let marked = self
            .store
            .engine()
            .txn_mark_success(handle, true)
            .map_err(CoreError::from);
        if marked.is_ok() {
            self.successful = true;
        }
        self.close()?;
        marked
    }

    /// Closes the transaction. Calling it again has no effect.
    pub fn close(&mut self) -> CoreResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        tracing::trace!(
            txn = handle.as_u64(),
            commit = self.successful && self.mode == TxMode::Write,
            "closing transaction"
        );
        self.store.engine().txn_close(handle)?;
        Ok(())
    }

    pub(crate) fn store(&self) -> &'s Store {
        self.store
    }

    pub(crate) fn handle(&self) -> CoreResult<TxnHandle> {
        self.handle
            .ok_or_else(|| CoreError::invalid_state("transaction is already closed"))
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            tracing::warn!(%error, "failed to close transaction");
        }
    }
}
