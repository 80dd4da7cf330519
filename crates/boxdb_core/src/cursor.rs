//! Transaction-scoped cursors.

use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use crate::transaction::Transaction;
use boxdb_engine::{
    CursorHandle, Engine, EntityTypeId, ErrorCode, IdArray, ObjectId, PropertyId, PutMode,
    RelationId, TimeSeriesMinMax, TxMode,
};
use bytes::Bytes;

enum TxnRef<'t> {
    Borrowed(&'t Transaction<'t>),
    Owned(Transaction<'t>),
}

impl<'t> TxnRef<'t> {
    fn get(&self) -> &Transaction<'t> {
        match self {
            TxnRef::Borrowed(tx) => tx,
            TxnRef::Owned(tx) => tx,
        }
    }
}

/// A cursor over one entity type within a transaction.
///
/// The cursor either attaches to a caller's transaction or owns a private
/// one. The cursor handle is released when the cursor is dropped; an owned
/// transaction is closed right after it, rolling back unless
/// [`Cursor::commit_and_close`] was called.
pub(crate) struct Cursor<'t> {
    txn: TxnRef<'t>,
    handle: Option<CursorHandle>,
    entity: EntityTypeId,
}

impl<'t> Cursor<'t> {
    /// Attaches to an existing transaction.
    pub(crate) fn open(tx: &'t Transaction<'t>, entity: EntityTypeId) -> CoreResult<Self> {
        let handle = tx.store().engine().cursor_open(tx.handle()?, entity)?;
        Ok(Self {
            txn: TxnRef::Borrowed(tx),
            handle: Some(handle),
            entity,
        })
    }

    /// Begins a private transaction and attaches to it.
    pub(crate) fn open_owned(store: &'t Store, mode: TxMode, entity: EntityTypeId) -> CoreResult<Self> {
        let tx = Transaction::begin(store, mode)?;
        let handle = store.engine().cursor_open(tx.handle()?, entity)?;
        Ok(Self {
            txn: TxnRef::Owned(tx),
            handle: Some(handle),
            entity,
        })
    }

    fn engine(&self) -> &'t dyn Engine {
        self.txn.get().store().engine()
    }

    fn handle(&self) -> CoreResult<CursorHandle> {
        self.handle
            .ok_or_else(|| CoreError::invalid_state("cursor is closed"))
    }

    /// Reads the record of `id`, `None` if it does not exist.
    pub(crate) fn get(&self, id: ObjectId) -> CoreResult<Option<Bytes>> {
        absent_if_not_found(self.engine().cursor_get(self.handle()?, id))
    }

    /// Moves to the first object, `None` if there are none.
    pub(crate) fn first(&self) -> CoreResult<Option<(ObjectId, Bytes)>> {
        absent_if_not_found(self.engine().cursor_first(self.handle()?))
    }

    /// Moves to the next object, `None` at the end.
    pub(crate) fn next(&self) -> CoreResult<Option<(ObjectId, Bytes)>> {
        absent_if_not_found(self.engine().cursor_next(self.handle()?))
    }

    /// Stores a record and returns the effective id.
    pub(crate) fn put(&self, id: ObjectId, data: &[u8], mode: PutMode) -> CoreResult<ObjectId> {
        let engine = self.engine();
        let stored = engine.cursor_put(self.handle()?, id, data, mode);
        if stored == 0 {
            return Err(engine.last_error().map_or_else(
                || CoreError::Engine {
                    code: ErrorCode::General,
                    message: format!("put into {} failed without a reason", self.entity),
                },
                CoreError::from,
            ));
        }
        Ok(stored)
    }

    /// Removes one object; false if it did not exist.
    pub(crate) fn remove(&self, id: ObjectId) -> CoreResult<bool> {
        match self.engine().cursor_remove(self.handle()?, id) {
            Ok(()) => Ok(true),
            Err(error) if error.is_not_found() => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    pub(crate) fn remove_all(&self) -> CoreResult<u64> {
        Ok(self.engine().cursor_remove_all(self.handle()?)?)
    }

    pub(crate) fn count(&self, limit: u64) -> CoreResult<u64> {
        Ok(self.engine().cursor_count(self.handle()?, limit)?)
    }

    pub(crate) fn contains(&self, id: ObjectId) -> CoreResult<bool> {
        Ok(self.engine().cursor_contains(self.handle()?, id)?)
    }

    pub(crate) fn contains_many(&self, ids: &[ObjectId]) -> CoreResult<bool> {
        Ok(self.engine().cursor_contains_many(self.handle()?, ids)?)
    }

    pub(crate) fn backlink_ids(&self, property: PropertyId, id: ObjectId) -> CoreResult<Vec<ObjectId>> {
        let engine = self.engine();
        let array = engine.cursor_backlink_ids(self.handle()?, property, id)?;
        id_vector(engine, array)
    }

    pub(crate) fn rel_put(&self, relation: RelationId, source: ObjectId, target: ObjectId) -> CoreResult<()> {
        Ok(self
            .engine()
            .cursor_rel_put(self.handle()?, relation, source, target)?)
    }

    pub(crate) fn rel_remove(&self, relation: RelationId, source: ObjectId, target: ObjectId) -> CoreResult<()> {
        Ok(self
            .engine()
            .cursor_rel_remove(self.handle()?, relation, source, target)?)
    }

    pub(crate) fn rel_ids(&self, relation: RelationId, source: ObjectId) -> CoreResult<Vec<ObjectId>> {
        let engine = self.engine();
        let array = engine.cursor_rel_ids(self.handle()?, relation, source)?;
        id_vector(engine, array)
    }

    pub(crate) fn rel_backlink_ids(&self, relation: RelationId, target: ObjectId) -> CoreResult<Vec<ObjectId>> {
        let engine = self.engine();
        let array = engine.cursor_rel_backlink_ids(self.handle()?, relation, target)?;
        id_vector(engine, array)
    }

    pub(crate) fn ts_min_max(&self, range: Option<(i64, i64)>) -> CoreResult<Option<TimeSeriesMinMax>> {
        absent_if_not_found(self.engine().cursor_ts_min_max(self.handle()?, range))
    }

    /// Releases the cursor and commits its owned transaction.
    pub(crate) fn commit_and_close(mut self) -> CoreResult<()> {
        let released = self.close();
        let TxnRef::Owned(tx) = &mut self.txn else {
            return Err(CoreError::invalid_state(
                "cursor does not own its transaction",
            ));
        };
        if let Err(error) = released {
            tx.close()?;
            return Err(error);
        }
        tx.mark_success()
    }

    fn close(&mut self) -> CoreResult<()> {
        match self.handle.take() {
            Some(handle) => Ok(self.engine().cursor_close(handle)?),
            None => Ok(()),
        }
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            tracing::warn!(%error, entity = %self.entity, "failed to close cursor");
        }
    }
}

fn absent_if_not_found<T>(result: boxdb_engine::EngineResult<T>) -> CoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.is_not_found() => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Copies an engine id array into an owned vector.
///
/// The array is handed back to the engine on every path, including when it
/// reports more entries than it holds.
pub(crate) fn id_vector(engine: &dyn Engine, array: IdArray) -> CoreResult<Vec<ObjectId>> {
    let (count, len) = (array.count(), array.ids().len());
    let ids = array.ids().get(..count).map(<[ObjectId]>::to_vec);
    engine.free_id_array(array);
    ids.ok_or_else(|| {
        CoreError::invalid_state(format!(
            "id array reports {count} entries but holds {len}"
        ))
    })
}
