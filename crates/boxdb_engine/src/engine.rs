//! The engine trait.

use crate::error::{EngineError, EngineResult};
use crate::id_array::IdArray;
use crate::types::{
    CursorHandle, EntityTypeId, ObjectId, PropertyId, PutMode, RelationId, TimeSeriesMinMax,
    TxMode, TxnHandle,
};
use bytes::Bytes;

/// A handle-based storage engine.
///
/// Every resource is addressed by an opaque handle and must be released
/// through the matching close call. Handles are thread-affine: a transaction
/// and its cursors may only be used from the thread that began the
/// transaction.
///
/// "Not found" is reported as an [`EngineError`] with
/// [`crate::ErrorCode::NotFound`]; callers turn it into an absent result.
/// Any other failure is also recorded as the thread's last error.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the store shares one engine across
/// all threads.
pub trait Engine: Send + Sync {
    /// Begins a transaction.
    fn txn_begin(&self, mode: TxMode) -> EngineResult<TxnHandle>;

    /// Sets whether the transaction commits when it is closed.
    fn txn_mark_success(&self, txn: TxnHandle, successful: bool) -> EngineResult<()>;

    /// Closes a transaction, committing it if it is a write transaction
    /// marked successful. Cursors still open on it are released.
    fn txn_close(&self, txn: TxnHandle) -> EngineResult<()>;

    /// Opens a cursor for one entity type within a transaction.
    fn cursor_open(&self, txn: TxnHandle, entity: EntityTypeId) -> EngineResult<CursorHandle>;

    /// Closes a cursor.
    fn cursor_close(&self, cursor: CursorHandle) -> EngineResult<()>;

    /// Reads the record stored under `id`.
    fn cursor_get(&self, cursor: CursorHandle, id: ObjectId) -> EngineResult<Bytes>;

    /// Positions the cursor at the first object.
    fn cursor_first(&self, cursor: CursorHandle) -> EngineResult<(ObjectId, Bytes)>;

    /// Advances the cursor to the next object.
    fn cursor_next(&self, cursor: CursorHandle) -> EngineResult<(ObjectId, Bytes)>;

    /// Stores a record and returns the effective id.
    ///
    /// `id` 0 or [`crate::ID_NEW`] assigns a new id. A returned id of `0`
    /// signals failure; the cause is available from [`Engine::last_error`].
    fn cursor_put(
        &self,
        cursor: CursorHandle,
        id: ObjectId,
        data: &[u8],
        mode: PutMode,
    ) -> ObjectId;

    /// Removes one object.
    fn cursor_remove(&self, cursor: CursorHandle, id: ObjectId) -> EngineResult<()>;

    /// Removes all objects of the cursor's entity type and returns how many.
    fn cursor_remove_all(&self, cursor: CursorHandle) -> EngineResult<u64>;

    /// Counts objects, stopping at `limit` (0 = no limit).
    fn cursor_count(&self, cursor: CursorHandle, limit: u64) -> EngineResult<u64>;

    /// Returns true if an object with `id` exists.
    fn cursor_contains(&self, cursor: CursorHandle, id: ObjectId) -> EngineResult<bool>;

    /// Returns true if objects exist for all `ids`.
    fn cursor_contains_many(&self, cursor: CursorHandle, ids: &[ObjectId]) -> EngineResult<bool>;

    /// Ids of objects whose to-one relation `property` points at `id`.
    fn cursor_backlink_ids(
        &self,
        cursor: CursorHandle,
        property: PropertyId,
        id: ObjectId,
    ) -> EngineResult<IdArray>;

    /// Adds a standalone relation link.
    fn cursor_rel_put(
        &self,
        cursor: CursorHandle,
        relation: RelationId,
        source: ObjectId,
        target: ObjectId,
    ) -> EngineResult<()>;

    /// Removes a standalone relation link.
    fn cursor_rel_remove(
        &self,
        cursor: CursorHandle,
        relation: RelationId,
        source: ObjectId,
        target: ObjectId,
    ) -> EngineResult<()>;

    /// Target ids linked from `source`.
    fn cursor_rel_ids(
        &self,
        cursor: CursorHandle,
        relation: RelationId,
        source: ObjectId,
    ) -> EngineResult<IdArray>;

    /// Source ids linking to `target`.
    fn cursor_rel_backlink_ids(
        &self,
        cursor: CursorHandle,
        relation: RelationId,
        target: ObjectId,
    ) -> EngineResult<IdArray>;

    /// Time property limits, optionally restricted to `[begin, end]`.
    fn cursor_ts_min_max(
        &self,
        cursor: CursorHandle,
        range: Option<(i64, i64)>,
    ) -> EngineResult<TimeSeriesMinMax>;

    /// Hands an id array back to the engine.
    fn free_id_array(&self, array: IdArray);

    /// The last error recorded on the calling thread.
    fn last_error(&self) -> Option<EngineError> {
        crate::error::last_error()
    }

    /// Closes the engine. Fails if it is already closed.
    fn close(&self) -> EngineResult<()>;
}
