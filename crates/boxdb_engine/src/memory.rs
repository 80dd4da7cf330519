//! In-memory engine.

use crate::config::EngineOptions;
use crate::engine::Engine;
use crate::error::{set_last_error, EngineError, EngineResult, ErrorCode};
use crate::id_array::IdArray;
use crate::model::{EntityModel, Model, PropertyType};
use crate::types::{
    CursorHandle, EntityTypeId, ObjectId, PropertyId, PutMode, RelationId, TimeSeriesMinMax,
    TxMode, TxnHandle, ID_NEW,
};
use boxdb_codec::{TableReader, Value};
use bytes::Bytes;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, Default)]
struct EntityData {
    objects: BTreeMap<ObjectId, Bytes>,
    last_id: ObjectId,
}

/// Committed state. Cloning is shallow; a write transaction copies an
/// entity's objects or a relation's links only when it first modifies them.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    boxes: HashMap<EntityTypeId, Arc<EntityData>>,
    relations: HashMap<RelationId, Arc<BTreeSet<(ObjectId, ObjectId)>>>,
    size_bytes: u64,
}

impl Snapshot {
    fn objects(&self, entity: EntityTypeId) -> Option<&BTreeMap<ObjectId, Bytes>> {
        self.boxes.get(&entity).map(|data| &data.objects)
    }

    fn links(&self, relation: RelationId) -> Option<&BTreeSet<(ObjectId, ObjectId)>> {
        self.relations.get(&relation).map(|links| &**links)
    }
}

#[derive(Debug)]
enum TxnData {
    Read(Arc<Snapshot>),
    Write(Snapshot),
}

impl TxnData {
    fn snapshot(&self) -> &Snapshot {
        match self {
            TxnData::Read(snapshot) => snapshot,
            TxnData::Write(snapshot) => snapshot,
        }
    }

    fn snapshot_mut(&mut self) -> EngineResult<&mut Snapshot> {
        match self {
            TxnData::Write(snapshot) => Ok(snapshot),
            TxnData::Read(_) => Err(EngineError::new(
                ErrorCode::ReadOnly,
                "cannot modify data in a read transaction",
            )),
        }
    }
}

#[derive(Debug)]
struct TxnState {
    thread: ThreadId,
    data: TxnData,
    successful: bool,
}

#[derive(Debug)]
struct CursorState {
    txn: u64,
    entity: EntityTypeId,
    position: Option<ObjectId>,
}

#[derive(Debug, Default)]
struct Handles {
    txns: HashMap<u64, TxnState>,
    cursors: HashMap<u64, CursorState>,
    readers: u32,
}

/// An in-process engine with snapshot isolation.
///
/// Read transactions see the state committed when they began. A single write
/// transaction at a time works on a private copy that replaces the committed
/// state on commit, so concurrent readers see a batch completely or not at
/// all. Writers on other threads wait for the active writer to finish.
///
/// # Example
///
/// ```rust
/// use boxdb_engine::{Engine, EngineOptions, EntityTypeId, MemoryEngine, Model, PropertyFlags, PropertyType, PutMode, TxMode};
/// use boxdb_codec::{EncodeBuffer, TableWriter};
///
/// let model = Model::new()
///     .entity("Note", 1)
///     .property("id", 1, PropertyType::Long, PropertyFlags::ID)
///     .property("text", 2, PropertyType::String, PropertyFlags::NONE);
/// let engine = MemoryEngine::open(model, EngineOptions::default()).unwrap();
///
/// let mut buffer = EncodeBuffer::new();
/// let mut writer = TableWriter::new(&mut buffer);
/// writer.field(2, "hello");
/// writer.finish().unwrap();
///
/// let txn = engine.txn_begin(TxMode::Write).unwrap();
/// let cursor = engine.cursor_open(txn, EntityTypeId::new(1)).unwrap();
/// let id = engine.cursor_put(cursor, 0, buffer.as_bytes(), PutMode::Put);
/// assert_eq!(id, 1);
/// engine.txn_mark_success(txn, true).unwrap();
/// engine.txn_close(txn).unwrap();
/// ```
#[derive(Debug)]
pub struct MemoryEngine {
    model: Model,
    options: EngineOptions,
    committed: RwLock<Arc<Snapshot>>,
    writer: Mutex<Option<ThreadId>>,
    writer_released: Condvar,
    handles: Mutex<Handles>,
    next_handle: AtomicU64,
    id_arrays: Mutex<HashSet<u64>>,
    fail_next_commit: AtomicBool,
    closed: AtomicBool,
}

impl MemoryEngine {
    /// Opens an engine for a validated model.
    pub fn open(model: Model, options: EngineOptions) -> EngineResult<Self> {
        track(model.validate())?;
        tracing::debug!(
            entities = model.entities().len(),
            max_db_size_in_kb = options.max_db_size_in_kb,
            max_readers = options.max_readers,
            "opened memory engine"
        );
        Ok(Self {
            model,
            options,
            committed: RwLock::new(Arc::new(Snapshot::default())),
            writer: Mutex::new(None),
            writer_released: Condvar::new(),
            handles: Mutex::new(Handles::default()),
            next_handle: AtomicU64::new(1),
            id_arrays: Mutex::new(HashSet::new()),
            fail_next_commit: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// The schema this engine was opened with.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Makes the next commit fail and roll back.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of id arrays handed out and not yet freed.
    #[must_use]
    pub fn outstanding_id_arrays(&self) -> usize {
        self.id_arrays.lock().len()
    }

    /// Number of open transactions.
    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.handles.lock().txns.len()
    }

    /// Number of open cursors.
    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.handles.lock().cursors.len()
    }

    /// Stored payload bytes in the committed state.
    #[must_use]
    pub fn committed_size(&self) -> u64 {
        self.committed.read().size_bytes
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::illegal_state("engine is closed"));
        }
        Ok(())
    }

    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn entity(&self, id: EntityTypeId) -> EngineResult<&EntityModel> {
        self.model.find_entity(id).ok_or_else(|| {
            EngineError::new(ErrorCode::SchemaObjectNotFound, format!("unknown {id}"))
        })
    }

    fn id_array(&self, ids: Vec<ObjectId>) -> IdArray {
        let token = self.next_handle();
        self.id_arrays.lock().insert(token);
        IdArray::new(ids, token)
    }

    fn begin_write(&self) -> EngineResult<()> {
        let me = thread::current().id();
        let mut writer = self.writer.lock();
        if *writer == Some(me) {
            return Err(EngineError::illegal_state(
                "a write transaction is already active on this thread",
            ));
        }
        while writer.is_some() {
            self.writer_released.wait(&mut writer);
        }
        *writer = Some(me);
        Ok(())
    }

    fn release_writer(&self) {
        *self.writer.lock() = None;
        self.writer_released.notify_one();
    }

    fn begin_txn(&self, mode: TxMode) -> EngineResult<TxnHandle> {
        self.ensure_open()?;
        let data = match mode {
            TxMode::Read => {
                let mut handles = self.handles.lock();
                let max = self.options.max_readers;
                if max > 0 && handles.readers >= max {
                    return Err(EngineError::new(
                        ErrorCode::MaxReadersExceeded,
                        format!("maximum of {max} concurrent readers reached"),
                    ));
                }
                handles.readers += 1;
                TxnData::Read(Arc::clone(&self.committed.read()))
            }
            TxMode::Write => {
                self.begin_write()?;
                TxnData::Write(Snapshot::clone(&self.committed.read()))
            }
        };
        let handle = self.next_handle();
        self.handles.lock().txns.insert(
            handle,
            TxnState {
                thread: thread::current().id(),
                data,
                successful: false,
            },
        );
        tracing::trace!(txn = handle, ?mode, "transaction started");
        Ok(TxnHandle::new(handle))
    }

    fn mark_txn(&self, txn: TxnHandle, successful: bool) -> EngineResult<()> {
        self.ensure_open()?;
        let mut handles = self.handles.lock();
        let state = handles
            .txns
            .get_mut(&txn.as_u64())
            .ok_or_else(|| EngineError::illegal_state(format!("unknown transaction {}", txn.as_u64())))?;
        check_thread(state)?;
        state.successful = successful;
        Ok(())
    }

    fn close_txn(&self, txn: TxnHandle) -> EngineResult<()> {
        let raw = txn.as_u64();
        let state = {
            let mut handles = self.handles.lock();
            let state = handles
                .txns
                .get(&raw)
                .ok_or_else(|| EngineError::illegal_state(format!("unknown transaction {raw}")))?;
            check_thread(state)?;
            handles.cursors.retain(|_, cursor| cursor.txn != raw);
            let state = handles
                .txns
                .remove(&raw)
                .ok_or_else(|| EngineError::illegal_state(format!("unknown transaction {raw}")))?;
            if matches!(state.data, TxnData::Read(_)) {
                handles.readers = handles.readers.saturating_sub(1);
            }
            state
        };

        let TxnData::Write(snapshot) = state.data else {
            tracing::trace!(txn = raw, "read transaction closed");
            return Ok(());
        };
        let result = if !state.successful {
            tracing::trace!(txn = raw, "write transaction rolled back");
            Ok(())
        } else if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            Err(EngineError::new(ErrorCode::CommitFailed, "commit failed"))
        } else {
            *self.committed.write() = Arc::new(snapshot);
            tracing::trace!(txn = raw, "write transaction committed");
            Ok(())
        };
        self.release_writer();
        result
    }

    fn open_cursor(&self, txn: TxnHandle, entity: EntityTypeId) -> EngineResult<CursorHandle> {
        self.ensure_open()?;
        self.entity(entity)?;
        let mut handles = self.handles.lock();
        let state = handles
            .txns
            .get(&txn.as_u64())
            .ok_or_else(|| EngineError::illegal_state(format!("unknown transaction {}", txn.as_u64())))?;
        check_thread(state)?;
        let handle = self.next_handle();
        handles.cursors.insert(
            handle,
            CursorState {
                txn: txn.as_u64(),
                entity,
                position: None,
            },
        );
        Ok(CursorHandle::new(handle))
    }

    fn close_cursor(&self, cursor: CursorHandle) -> EngineResult<()> {
        let mut handles = self.handles.lock();
        let state = handles
            .cursors
            .get(&cursor.as_u64())
            .ok_or_else(|| EngineError::illegal_state(format!("unknown cursor {}", cursor.as_u64())))?;
        if let Some(txn) = handles.txns.get(&state.txn) {
            check_thread(txn)?;
        }
        handles.cursors.remove(&cursor.as_u64());
        Ok(())
    }

    fn with_cursor<R>(
        &self,
        cursor: CursorHandle,
        f: impl FnOnce(&EntityModel, &mut CursorState, &mut TxnData) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.ensure_open()?;
        let mut handles = self.handles.lock();
        let Handles { txns, cursors, .. } = &mut *handles;
        let state = cursors
            .get_mut(&cursor.as_u64())
            .ok_or_else(|| EngineError::illegal_state(format!("unknown cursor {}", cursor.as_u64())))?;
        let txn = txns
            .get_mut(&state.txn)
            .ok_or_else(|| EngineError::illegal_state("cursor's transaction is closed"))?;
        check_thread(txn)?;
        let entity = self.entity(state.entity)?;
        f(entity, state, &mut txn.data)
    }

    fn put(
        &self,
        entity: &EntityModel,
        snapshot: &mut Snapshot,
        id: ObjectId,
        data: &[u8],
        mode: PutMode,
    ) -> EngineResult<ObjectId> {
        let record = TableReader::parse(data)
            .map_err(|e| EngineError::illegal_argument(format!("invalid record: {e}")))?;
        check_types(entity, &record)?;

        let is_new = id == 0 || id == ID_NEW;
        let existing = if is_new {
            None
        } else {
            snapshot
                .objects(entity.id)
                .and_then(|objects| objects.get(&id))
                .map(|bytes| bytes.len() as u64)
        };
        match mode {
            PutMode::Insert if existing.is_some() => {
                return Err(EngineError::new(
                    ErrorCode::IdAlreadyExists,
                    format!("{}: object {id} already exists", entity.name),
                ))
            }
            PutMode::Update if is_new => {
                return Err(EngineError::illegal_argument(format!(
                    "{}: update requires an existing id",
                    entity.name
                )))
            }
            PutMode::Update if existing.is_none() => {
                return Err(EngineError::not_found(format!(
                    "{}: object {id} not found",
                    entity.name
                )))
            }
            _ => {}
        }

        let size = snapshot.size_bytes - existing.unwrap_or(0) + data.len() as u64;
        if let Some(max) = self.options.max_db_size_bytes() {
            if size > max {
                return Err(EngineError::new(
                    ErrorCode::DbFull,
                    format!("database full: {size} bytes exceed the limit of {max}"),
                ));
            }
        }

        let id = if is_new {
            let last_id = snapshot.boxes.get(&entity.id).map_or(0, |data| data.last_id);
            last_id.checked_add(1).filter(|id| *id != ID_NEW).ok_or_else(|| {
                EngineError::new(ErrorCode::General, format!("{}: ids exhausted", entity.name))
            })?
        } else {
            id
        };

        // Copy-on-write only once the put is known to succeed.
        let data_box = Arc::make_mut(snapshot.boxes.entry(entity.id).or_default());
        data_box.objects.insert(id, Bytes::copy_from_slice(data));
        data_box.last_id = data_box.last_id.max(id);
        snapshot.size_bytes = size;
        Ok(id)
    }

    /// Drops links touching removed objects of `entity`.
    fn unlink(&self, entity: EntityTypeId, snapshot: &mut Snapshot, removed: &dyn Fn(ObjectId) -> bool) {
        for (source, relation) in self
            .model
            .entities()
            .iter()
            .flat_map(|e| e.relations.iter().map(move |r| (e.id, r)))
        {
            if source != entity && relation.target != entity {
                continue;
            }
            if let Some(links) = snapshot.relations.get_mut(&relation.id) {
                Arc::make_mut(links).retain(|(s, t)| {
                    !((source == entity && removed(*s)) || (relation.target == entity && removed(*t)))
                });
            }
        }
    }

    fn check_relation(&self, entity: &EntityModel, relation: RelationId, side: Side) -> EngineResult<()> {
        let (source, standalone) = self.model.find_relation(relation).ok_or_else(|| {
            EngineError::new(ErrorCode::SchemaObjectNotFound, format!("unknown {relation}"))
        })?;
        let (expected, end) = match side {
            Side::Source => (source.id, "source"),
            Side::Target => (standalone.target, "target"),
        };
        if expected != entity.id {
            return Err(EngineError::illegal_argument(format!(
                "entity {} is not the {end} of {relation}",
                entity.name
            )));
        }
        Ok(())
    }
}

/// The end of a standalone relation a cursor's entity must be on.
#[derive(Debug, Clone, Copy)]
enum Side {
    Source,
    Target,
}

impl Engine for MemoryEngine {
    fn txn_begin(&self, mode: TxMode) -> EngineResult<TxnHandle> {
        track(self.begin_txn(mode))
    }

    fn txn_mark_success(&self, txn: TxnHandle, successful: bool) -> EngineResult<()> {
        track(self.mark_txn(txn, successful))
    }

    fn txn_close(&self, txn: TxnHandle) -> EngineResult<()> {
        track(self.close_txn(txn))
    }

    fn cursor_open(&self, txn: TxnHandle, entity: EntityTypeId) -> EngineResult<CursorHandle> {
        track(self.open_cursor(txn, entity))
    }

    fn cursor_close(&self, cursor: CursorHandle) -> EngineResult<()> {
        track(self.close_cursor(cursor))
    }

    fn cursor_get(&self, cursor: CursorHandle, id: ObjectId) -> EngineResult<Bytes> {
        track(self.with_cursor(cursor, |entity, _, txn| {
            txn.snapshot()
                .objects(entity.id)
                .and_then(|objects| objects.get(&id))
                .cloned()
                .ok_or_else(|| EngineError::not_found(format!("{}: object {id} not found", entity.name)))
        }))
    }

    fn cursor_first(&self, cursor: CursorHandle) -> EngineResult<(ObjectId, Bytes)> {
        track(self.with_cursor(cursor, |entity, state, txn| {
            let first = txn
                .snapshot()
                .objects(entity.id)
                .and_then(|objects| objects.iter().next())
                .map(|(id, bytes)| (*id, bytes.clone()));
            state.position = first.as_ref().map(|(id, _)| *id);
            first.ok_or_else(|| EngineError::not_found(format!("{}: no objects", entity.name)))
        }))
    }

    fn cursor_next(&self, cursor: CursorHandle) -> EngineResult<(ObjectId, Bytes)> {
        track(self.with_cursor(cursor, |entity, state, txn| {
            let lower = state.position.map_or(Bound::Unbounded, Bound::Excluded);
            let next = txn
                .snapshot()
                .objects(entity.id)
                .and_then(|objects| objects.range((lower, Bound::Unbounded)).next())
                .map(|(id, bytes)| (*id, bytes.clone()));
            match next {
                Some((id, bytes)) => {
                    state.position = Some(id);
                    Ok((id, bytes))
                }
                None => Err(EngineError::not_found(format!("{}: no more objects", entity.name))),
            }
        }))
    }

    fn cursor_put(&self, cursor: CursorHandle, id: ObjectId, data: &[u8], mode: PutMode) -> ObjectId {
        let result = self.with_cursor(cursor, |entity, _, txn| {
            let snapshot = txn.snapshot_mut()?;
            self.put(entity, snapshot, id, data, mode)
        });
        match result {
            Ok(id) => id,
            Err(error) => {
                set_last_error(&error);
                0
            }
        }
    }

    fn cursor_remove(&self, cursor: CursorHandle, id: ObjectId) -> EngineResult<()> {
        track(self.with_cursor(cursor, |entity, _, txn| {
            let snapshot = txn.snapshot_mut()?;
            let contained = snapshot
                .objects(entity.id)
                .is_some_and(|objects| objects.contains_key(&id));
            if !contained {
                return Err(EngineError::not_found(format!("{}: object {id} not found", entity.name)));
            }
            let data_box = Arc::make_mut(snapshot.boxes.entry(entity.id).or_default());
            if let Some(bytes) = data_box.objects.remove(&id) {
                snapshot.size_bytes -= bytes.len() as u64;
            }
            self.unlink(entity.id, snapshot, &|removed: ObjectId| removed == id);
            Ok(())
        }))
    }

    fn cursor_remove_all(&self, cursor: CursorHandle) -> EngineResult<u64> {
        track(self.with_cursor(cursor, |entity, _, txn| {
            let snapshot = txn.snapshot_mut()?;
            let Some(entry) = snapshot.boxes.get_mut(&entity.id) else {
                return Ok(0);
            };
            let data_box = Arc::make_mut(entry);
            let removed = std::mem::take(&mut data_box.objects);
            let bytes: u64 = removed.values().map(|b| b.len() as u64).sum();
            snapshot.size_bytes -= bytes;
            self.unlink(entity.id, snapshot, &|_: ObjectId| true);
            Ok(removed.len() as u64)
        }))
    }

    fn cursor_count(&self, cursor: CursorHandle, limit: u64) -> EngineResult<u64> {
        track(self.with_cursor(cursor, |entity, _, txn| {
            let count = txn
                .snapshot()
                .objects(entity.id)
                .map_or(0, |objects| objects.len() as u64);
            Ok(if limit > 0 { count.min(limit) } else { count })
        }))
    }

    fn cursor_contains(&self, cursor: CursorHandle, id: ObjectId) -> EngineResult<bool> {
        track(self.with_cursor(cursor, |entity, _, txn| {
            Ok(txn
                .snapshot()
                .objects(entity.id)
                .is_some_and(|objects| objects.contains_key(&id)))
        }))
    }

    fn cursor_contains_many(&self, cursor: CursorHandle, ids: &[ObjectId]) -> EngineResult<bool> {
        track(self.with_cursor(cursor, |entity, _, txn| {
            let objects = txn.snapshot().objects(entity.id);
            Ok(ids
                .iter()
                .all(|id| objects.is_some_and(|objects| objects.contains_key(id))))
        }))
    }

    fn cursor_backlink_ids(
        &self,
        cursor: CursorHandle,
        property: PropertyId,
        id: ObjectId,
    ) -> EngineResult<IdArray> {
        let ids = track(self.with_cursor(cursor, |entity, _, txn| {
            let relation = entity.property(property).ok_or_else(|| {
                EngineError::new(
                    ErrorCode::SchemaObjectNotFound,
                    format!("{}: unknown {property}", entity.name),
                )
            })?;
            if relation.ty != PropertyType::Relation {
                return Err(EngineError::illegal_argument(format!(
                    "{}.{} is not a relation",
                    entity.name, relation.name
                )));
            }
            let mut ids = Vec::new();
            for (source, bytes) in txn.snapshot().objects(entity.id).into_iter().flatten() {
                let record = TableReader::parse(bytes)
                    .map_err(|e| EngineError::new(ErrorCode::General, e.to_string()))?;
                if record.u64(property.as_u16()).ok() == Some(id) {
                    ids.push(*source);
                }
            }
            Ok(ids)
        }))?;
        Ok(self.id_array(ids))
    }

    fn cursor_rel_put(
        &self,
        cursor: CursorHandle,
        relation: RelationId,
        source: ObjectId,
        target: ObjectId,
    ) -> EngineResult<()> {
        track(self.with_cursor(cursor, |entity, _, txn| {
            self.check_relation(entity, relation, Side::Source)?;
            let snapshot = txn.snapshot_mut()?;
            Arc::make_mut(snapshot.relations.entry(relation).or_default()).insert((source, target));
            Ok(())
        }))
    }

    fn cursor_rel_remove(
        &self,
        cursor: CursorHandle,
        relation: RelationId,
        source: ObjectId,
        target: ObjectId,
    ) -> EngineResult<()> {
        track(self.with_cursor(cursor, |entity, _, txn| {
            self.check_relation(entity, relation, Side::Source)?;
            let snapshot = txn.snapshot_mut()?;
            if let Some(links) = snapshot.relations.get_mut(&relation) {
                Arc::make_mut(links).remove(&(source, target));
            }
            Ok(())
        }))
    }

    fn cursor_rel_ids(
        &self,
        cursor: CursorHandle,
        relation: RelationId,
        source: ObjectId,
    ) -> EngineResult<IdArray> {
        let ids = track(self.with_cursor(cursor, |entity, _, txn| {
            self.check_relation(entity, relation, Side::Source)?;
            Ok(txn
                .snapshot()
                .links(relation)
                .into_iter()
                .flat_map(|links| links.range((source, 0)..=(source, ObjectId::MAX)))
                .map(|(_, target)| *target)
                .collect::<Vec<_>>())
        }))?;
        Ok(self.id_array(ids))
    }

    fn cursor_rel_backlink_ids(
        &self,
        cursor: CursorHandle,
        relation: RelationId,
        target: ObjectId,
    ) -> EngineResult<IdArray> {
        let ids = track(self.with_cursor(cursor, |entity, _, txn| {
            self.check_relation(entity, relation, Side::Target)?;
            Ok(txn
                .snapshot()
                .links(relation)
                .into_iter()
                .flatten()
                .filter(|(_, t)| *t == target)
                .map(|(source, _)| *source)
                .collect::<Vec<_>>())
        }))?;
        Ok(self.id_array(ids))
    }

    fn cursor_ts_min_max(
        &self,
        cursor: CursorHandle,
        range: Option<(i64, i64)>,
    ) -> EngineResult<TimeSeriesMinMax> {
        track(self.with_cursor(cursor, |entity, _, txn| {
            let time = entity.time_property().ok_or_else(|| {
                EngineError::new(
                    ErrorCode::TimeSeries,
                    format!("entity {} has no time property", entity.name),
                )
            })?;
            let slot = time.id.as_u16();
            let mut limits: Option<TimeSeriesMinMax> = None;
            for (id, bytes) in txn.snapshot().objects(entity.id).into_iter().flatten() {
                let value = TableReader::parse(bytes)
                    .and_then(|record| record.i64(slot))
                    .map_err(|e| EngineError::new(ErrorCode::General, e.to_string()))?;
                if let Some((begin, end)) = range {
                    if value < begin || value > end {
                        continue;
                    }
                }
                let current = limits.get_or_insert(TimeSeriesMinMax {
                    min_id: *id,
                    min_value: value,
                    max_id: *id,
                    max_value: value,
                });
                if value < current.min_value {
                    current.min_id = *id;
                    current.min_value = value;
                }
                if value > current.max_value {
                    current.max_id = *id;
                    current.max_value = value;
                }
            }
            limits.ok_or_else(|| {
                EngineError::not_found(format!("{}: no objects in the time range", entity.name))
            })
        }))
    }

    fn free_id_array(&self, array: IdArray) {
        if !self.id_arrays.lock().remove(&array.token()) {
            tracing::warn!(token = array.token(), "id array freed twice or not owned by this engine");
        }
    }

    fn close(&self) -> EngineResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return track(Err(EngineError::illegal_state("engine is already closed")));
        }
        let open = self.handles.lock().txns.len();
        if open > 0 {
            tracing::warn!(open, "memory engine closed with open transactions");
        }
        tracing::debug!("closed memory engine");
        Ok(())
    }
}

/// Records failures other than not-found as the thread's last error.
fn track<T>(result: EngineResult<T>) -> EngineResult<T> {
    if let Err(error) = &result {
        if !error.is_not_found() {
            set_last_error(error);
        }
    }
    result
}

fn check_thread(txn: &TxnState) -> EngineResult<()> {
    if txn.thread != thread::current().id() {
        return Err(EngineError::illegal_state(
            "transaction used from a thread other than the one that began it",
        ));
    }
    Ok(())
}

fn check_types(entity: &EntityModel, record: &TableReader) -> EngineResult<()> {
    for property in &entity.properties {
        let Some(value) = record.get(property.id.as_u16()) else {
            continue;
        };
        let matches = match property.ty {
            PropertyType::Bool => matches!(value, Value::Bool(_) | Value::Null),
            PropertyType::Byte
            | PropertyType::Short
            | PropertyType::Char
            | PropertyType::Int
            | PropertyType::Long
            | PropertyType::Date
            | PropertyType::Relation => {
                matches!(value, Value::Integer(_) | Value::Unsigned(_) | Value::Null)
            }
            PropertyType::Float | PropertyType::Double => matches!(value, Value::Float(_) | Value::Null),
            PropertyType::String => matches!(value, Value::Text(_) | Value::Null),
            PropertyType::ByteVector => matches!(value, Value::Bytes(_) | Value::Null),
            PropertyType::StringVector => matches!(value, Value::TextList(_) | Value::Null),
        };
        if !matches {
            return Err(EngineError::new(
                ErrorCode::PropertyTypeMismatch,
                format!(
                    "{}.{}: {:?} property holds a {} value",
                    entity.name,
                    property.name,
                    property.ty,
                    value.type_name()
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{clear_last_error, last_error};
    use crate::model::PropertyFlags;
    use boxdb_codec::{EncodeBuffer, TableWriter};

    const NOTE: EntityTypeId = EntityTypeId::new(1);
    const SAMPLE: EntityTypeId = EntityTypeId::new(2);
    const TAGS: RelationId = RelationId::new(1);

    fn model() -> Model {
        Model::new()
            .entity("Note", 1)
            .property("id", 1, PropertyType::Long, PropertyFlags::ID)
            .property("text", 2, PropertyType::String, PropertyFlags::NONE)
            .property("parent", 3, PropertyType::Relation, PropertyFlags::INDEXED)
            .relation_to(1)
            .standalone_relation(1, 2)
            .entity("Sample", 2)
            .property("id", 1, PropertyType::Long, PropertyFlags::ID)
            .property("time", 2, PropertyType::Date, PropertyFlags::ID_COMPANION)
    }

    fn engine() -> MemoryEngine {
        MemoryEngine::open(model(), EngineOptions::default()).unwrap()
    }

    fn note(text: &str, parent: u64) -> Vec<u8> {
        let mut buffer = EncodeBuffer::new();
        let mut writer = TableWriter::new(&mut buffer);
        writer.field(2, text).field(3, parent);
        writer.finish().unwrap();
        buffer.as_bytes().to_vec()
    }

    fn sample(time: i64) -> Vec<u8> {
        let mut buffer = EncodeBuffer::new();
        let mut writer = TableWriter::new(&mut buffer);
        writer.field(2, time);
        writer.finish().unwrap();
        buffer.as_bytes().to_vec()
    }

    fn write<R>(engine: &MemoryEngine, entity: EntityTypeId, f: impl FnOnce(CursorHandle) -> R) -> R {
        let txn = engine.txn_begin(TxMode::Write).unwrap();
        let cursor = engine.cursor_open(txn, entity).unwrap();
        let result = f(cursor);
        engine.txn_mark_success(txn, true).unwrap();
        engine.txn_close(txn).unwrap();
        result
    }

    fn read<R>(engine: &MemoryEngine, entity: EntityTypeId, f: impl FnOnce(CursorHandle) -> R) -> R {
        let txn = engine.txn_begin(TxMode::Read).unwrap();
        let cursor = engine.cursor_open(txn, entity).unwrap();
        let result = f(cursor);
        engine.txn_close(txn).unwrap();
        result
    }

    #[test]
    fn invalid_model_is_rejected() {
        let err = MemoryEngine::open(Model::new(), EngineOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Schema);
    }

    #[test]
    fn put_assigns_increasing_ids() {
        let engine = engine();
        let ids = write(&engine, NOTE, |c| {
            [
                engine.cursor_put(c, 0, &note("a", 0), PutMode::Put),
                engine.cursor_put(c, ID_NEW, &note("b", 0), PutMode::Put),
                engine.cursor_put(c, 10, &note("c", 0), PutMode::Put),
                engine.cursor_put(c, 0, &note("d", 0), PutMode::Put),
            ]
        });
        assert_eq!(ids, [1, 2, 10, 11]);
        assert_eq!(read(&engine, NOTE, |c| engine.cursor_count(c, 0).unwrap()), 4);
        assert_eq!(read(&engine, NOTE, |c| engine.cursor_count(c, 2).unwrap()), 2);
    }

    #[test]
    fn put_modes() {
        let engine = engine();
        write(&engine, NOTE, |c| {
            assert_eq!(engine.cursor_put(c, 5, &note("a", 0), PutMode::Insert), 5);

            clear_last_error();
            assert_eq!(engine.cursor_put(c, 5, &note("b", 0), PutMode::Insert), 0);
            assert_eq!(last_error().unwrap().code, ErrorCode::IdAlreadyExists);

            assert_eq!(engine.cursor_put(c, 6, &note("b", 0), PutMode::Update), 0);
            assert_eq!(last_error().unwrap().code, ErrorCode::NotFound);

            assert_eq!(engine.cursor_put(c, 0, &note("b", 0), PutMode::Update), 0);
            assert_eq!(last_error().unwrap().code, ErrorCode::IllegalArgument);

            assert_eq!(engine.cursor_put(c, 5, &note("c", 0), PutMode::Update), 5);
        });
        let bytes = read(&engine, NOTE, |c| engine.cursor_get(c, 5).unwrap());
        assert_eq!(TableReader::parse(&bytes).unwrap().string(2).unwrap(), "c");
    }

    #[test]
    fn rejected_puts_leave_boxes_shared() {
        let engine = engine();
        write(&engine, NOTE, |c| engine.cursor_put(c, 0, &note("a", 0), PutMode::Put));
        let before = Arc::clone(&engine.committed.read().boxes[&NOTE]);

        write(&engine, NOTE, |c| {
            assert_eq!(engine.cursor_put(c, 1, &note("b", 0), PutMode::Insert), 0);
            assert_eq!(engine.cursor_put(c, 7, &note("c", 0), PutMode::Update), 0);
        });
        write(&engine, SAMPLE, |c| {
            assert_eq!(engine.cursor_put(c, 3, &sample(5), PutMode::Update), 0);
        });

        let committed = engine.committed.read();
        assert!(Arc::ptr_eq(&before, &committed.boxes[&NOTE]));
        assert!(!committed.boxes.contains_key(&SAMPLE));
    }

    #[test]
    fn invalid_records_are_rejected() {
        let engine = engine();
        write(&engine, NOTE, |c| {
            assert_eq!(engine.cursor_put(c, 0, b"\xff\xff", PutMode::Put), 0);
            assert_eq!(last_error().unwrap().code, ErrorCode::IllegalArgument);

            let mut buffer = EncodeBuffer::new();
            let mut writer = TableWriter::new(&mut buffer);
            writer.field(2, 42i64);
            writer.finish().unwrap();
            assert_eq!(engine.cursor_put(c, 0, buffer.as_bytes(), PutMode::Put), 0);
            assert_eq!(last_error().unwrap().code, ErrorCode::PropertyTypeMismatch);
        });
    }

    #[test]
    fn rollback_discards_changes() {
        let engine = engine();
        let txn = engine.txn_begin(TxMode::Write).unwrap();
        let cursor = engine.cursor_open(txn, NOTE).unwrap();
        assert_eq!(engine.cursor_put(cursor, 0, &note("a", 0), PutMode::Put), 1);
        engine.txn_close(txn).unwrap();

        assert_eq!(read(&engine, NOTE, |c| engine.cursor_count(c, 0).unwrap()), 0);
        assert_eq!(engine.open_cursors(), 0);
        assert_eq!(engine.open_transactions(), 0);
    }

    #[test]
    fn failed_commit_rolls_back() {
        let engine = engine();
        engine.fail_next_commit();
        let txn = engine.txn_begin(TxMode::Write).unwrap();
        let cursor = engine.cursor_open(txn, NOTE).unwrap();
        engine.cursor_put(cursor, 0, &note("a", 0), PutMode::Put);
        engine.txn_mark_success(txn, true).unwrap();
        let err = engine.txn_close(txn).unwrap_err();
        assert_eq!(err.code, ErrorCode::CommitFailed);

        assert_eq!(read(&engine, NOTE, |c| engine.cursor_count(c, 0).unwrap()), 0);
        // The writer slot was released.
        write(&engine, NOTE, |c| engine.cursor_put(c, 0, &note("b", 0), PutMode::Put));
    }

    #[test]
    fn readers_see_their_snapshot() {
        let engine = engine();
        write(&engine, NOTE, |c| engine.cursor_put(c, 0, &note("a", 0), PutMode::Put));

        let reader = engine.txn_begin(TxMode::Read).unwrap();
        let cursor = engine.cursor_open(reader, NOTE).unwrap();
        write(&engine, NOTE, |c| engine.cursor_put(c, 0, &note("b", 0), PutMode::Put));

        assert_eq!(engine.cursor_count(cursor, 0).unwrap(), 1);
        engine.txn_close(reader).unwrap();
        assert_eq!(read(&engine, NOTE, |c| engine.cursor_count(c, 0).unwrap()), 2);
    }

    #[test]
    fn write_in_read_transaction_fails() {
        let engine = engine();
        read(&engine, NOTE, |c| {
            assert_eq!(engine.cursor_put(c, 0, &note("a", 0), PutMode::Put), 0);
            assert_eq!(last_error().unwrap().code, ErrorCode::ReadOnly);
            assert_eq!(engine.cursor_remove_all(c).unwrap_err().code, ErrorCode::ReadOnly);
        });
    }

    #[test]
    fn second_writer_on_same_thread_is_refused() {
        let engine = engine();
        let txn = engine.txn_begin(TxMode::Write).unwrap();
        let err = engine.txn_begin(TxMode::Write).unwrap_err();
        assert_eq!(err.code, ErrorCode::IllegalState);
        engine.txn_close(txn).unwrap();
        let txn = engine.txn_begin(TxMode::Write).unwrap();
        engine.txn_close(txn).unwrap();
    }

    #[test]
    fn writers_on_other_threads_wait() {
        let engine = Arc::new(engine());
        let txn = engine.txn_begin(TxMode::Write).unwrap();
        let cursor = engine.cursor_open(txn, NOTE).unwrap();
        engine.cursor_put(cursor, 0, &note("first", 0), PutMode::Put);

        let other = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                write(&engine, NOTE, |c| engine.cursor_put(c, 0, &note("second", 0), PutMode::Put))
            })
        };
        thread::sleep(std::time::Duration::from_millis(20));
        engine.txn_mark_success(txn, true).unwrap();
        engine.txn_close(txn).unwrap();

        assert_eq!(other.join().unwrap(), 2);
    }

    #[test]
    fn transactions_are_thread_affine() {
        let engine = Arc::new(engine());
        let txn = engine.txn_begin(TxMode::Read).unwrap();
        let err = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.cursor_open(txn, NOTE).unwrap_err())
                .join()
                .unwrap()
        };
        assert_eq!(err.code, ErrorCode::IllegalState);
        engine.txn_close(txn).unwrap();
    }

    #[test]
    fn reader_limit() {
        let engine = MemoryEngine::open(model(), EngineOptions::default().max_readers(1)).unwrap();
        let first = engine.txn_begin(TxMode::Read).unwrap();
        let err = engine.txn_begin(TxMode::Read).unwrap_err();
        assert_eq!(err.code, ErrorCode::MaxReadersExceeded);
        engine.txn_close(first).unwrap();
        let again = engine.txn_begin(TxMode::Read).unwrap();
        engine.txn_close(again).unwrap();
    }

    #[test]
    fn size_limit() {
        let engine = MemoryEngine::open(model(), EngineOptions::default().max_db_size_in_kb(1)).unwrap();
        let big = note(&"x".repeat(2000), 0);
        write(&engine, NOTE, |c| {
            assert_eq!(engine.cursor_put(c, 0, &big, PutMode::Put), 0);
            assert_eq!(last_error().unwrap().code, ErrorCode::DbFull);
            assert_eq!(engine.cursor_put(c, 0, &note("small", 0), PutMode::Put), 1);
        });
        assert!(engine.committed_size() > 0);
    }

    #[test]
    fn iteration_and_removal() {
        let engine = engine();
        write(&engine, NOTE, |c| {
            for text in ["a", "b", "c"] {
                engine.cursor_put(c, 0, &note(text, 0), PutMode::Put);
            }
        });
        let ids = read(&engine, NOTE, |c| {
            let mut ids = vec![engine.cursor_first(c).unwrap().0];
            loop {
                match engine.cursor_next(c) {
                    Ok((id, _)) => ids.push(id),
                    Err(e) => {
                        assert!(e.is_not_found());
                        break;
                    }
                }
            }
            ids
        });
        assert_eq!(ids, [1, 2, 3]);

        write(&engine, NOTE, |c| {
            engine.cursor_remove(c, 2).unwrap();
            assert!(engine.cursor_remove(c, 2).unwrap_err().is_not_found());
            assert!(!engine.cursor_contains(c, 2).unwrap());
            assert!(engine.cursor_contains_many(c, &[1, 3]).unwrap());
            assert!(!engine.cursor_contains_many(c, &[1, 2]).unwrap());
            assert!(engine.cursor_contains_many(c, &[]).unwrap());
            assert_eq!(engine.cursor_remove_all(c).unwrap(), 2);
        });
        read(&engine, NOTE, |c| {
            assert!(engine.cursor_first(c).unwrap_err().is_not_found());
        });
        assert_eq!(engine.committed_size(), 0);
    }

    #[test]
    fn not_found_leaves_last_error_alone() {
        let engine = engine();
        clear_last_error();
        read(&engine, NOTE, |c| {
            assert!(engine.cursor_get(c, 1).unwrap_err().is_not_found());
        });
        assert!(last_error().is_none());
    }

    #[test]
    fn standalone_links() {
        let engine = engine();
        write(&engine, NOTE, |c| {
            engine.cursor_put(c, 0, &note("a", 0), PutMode::Put);
            for target in [3, 1, 2] {
                engine.cursor_rel_put(c, TAGS, 1, target).unwrap();
            }
            engine.cursor_rel_put(c, TAGS, 2, 1).unwrap();
            engine.cursor_rel_remove(c, TAGS, 1, 2).unwrap();
        });

        let targets = read(&engine, NOTE, |c| engine.cursor_rel_ids(c, TAGS, 1).unwrap());
        let sources = read(&engine, SAMPLE, |c| engine.cursor_rel_backlink_ids(c, TAGS, 1).unwrap());
        assert_eq!(targets.ids(), &[1, 3]);
        assert_eq!(sources.ids(), &[1, 2]);
        assert_eq!(engine.outstanding_id_arrays(), 2);
        engine.free_id_array(targets);
        engine.free_id_array(sources);
        assert_eq!(engine.outstanding_id_arrays(), 0);

        // Removing the source object drops its links.
        write(&engine, NOTE, |c| engine.cursor_remove(c, 1).unwrap());
        let targets = read(&engine, NOTE, |c| engine.cursor_rel_ids(c, TAGS, 1).unwrap());
        assert!(targets.ids().is_empty());
        engine.free_id_array(targets);
    }

    #[test]
    fn links_are_written_from_the_source_side() {
        let engine = engine();
        write(&engine, SAMPLE, |c| {
            let err = engine.cursor_rel_put(c, TAGS, 2, 1).unwrap_err();
            assert_eq!(err.code, ErrorCode::IllegalArgument);
            let err = engine.cursor_rel_remove(c, TAGS, 2, 1).unwrap_err();
            assert_eq!(err.code, ErrorCode::IllegalArgument);
            let err = engine.cursor_rel_ids(c, TAGS, 2).unwrap_err();
            assert_eq!(err.code, ErrorCode::IllegalArgument);
        });
        read(&engine, NOTE, |c| {
            let err = engine.cursor_rel_backlink_ids(c, TAGS, 1).unwrap_err();
            assert_eq!(err.code, ErrorCode::IllegalArgument);
        });
        assert_eq!(engine.outstanding_id_arrays(), 0);
    }

    #[test]
    fn unknown_relation() {
        let engine = engine();
        read(&engine, NOTE, |c| {
            let err = engine.cursor_rel_ids(c, RelationId::new(9), 1).unwrap_err();
            assert_eq!(err.code, ErrorCode::SchemaObjectNotFound);
        });
    }

    #[test]
    fn backlinks_follow_relation_property() {
        let engine = engine();
        write(&engine, NOTE, |c| {
            engine.cursor_put(c, 0, &note("root", 0), PutMode::Put);
            engine.cursor_put(c, 0, &note("child", 1), PutMode::Put);
            engine.cursor_put(c, 0, &note("other", 0), PutMode::Put);
            engine.cursor_put(c, 0, &note("child", 1), PutMode::Put);
        });
        let ids = read(&engine, NOTE, |c| {
            engine.cursor_backlink_ids(c, PropertyId::new(3), 1).unwrap()
        });
        assert_eq!(ids.ids(), &[2, 4]);
        engine.free_id_array(ids);

        read(&engine, NOTE, |c| {
            let err = engine.cursor_backlink_ids(c, PropertyId::new(2), 1).unwrap_err();
            assert_eq!(err.code, ErrorCode::IllegalArgument);
        });
    }

    #[test]
    fn time_series_limits() {
        let engine = engine();
        read(&engine, SAMPLE, |c| {
            assert!(engine.cursor_ts_min_max(c, None).unwrap_err().is_not_found());
        });
        write(&engine, SAMPLE, |c| {
            for time in [50, 10, 90, 30] {
                engine.cursor_put(c, 0, &sample(time), PutMode::Put);
            }
        });
        let all = read(&engine, SAMPLE, |c| engine.cursor_ts_min_max(c, None).unwrap());
        assert_eq!(
            all,
            TimeSeriesMinMax {
                min_id: 2,
                min_value: 10,
                max_id: 3,
                max_value: 90
            }
        );
        let ranged = read(&engine, SAMPLE, |c| engine.cursor_ts_min_max(c, Some((20, 60))).unwrap());
        assert_eq!((ranged.min_id, ranged.max_id), (4, 1));

        read(&engine, NOTE, |c| {
            let err = engine.cursor_ts_min_max(c, None).unwrap_err();
            assert_eq!(err.code, ErrorCode::TimeSeries);
        });
    }

    #[test]
    fn close_twice_fails() {
        let engine = engine();
        engine.close().unwrap();
        assert_eq!(engine.close().unwrap_err().code, ErrorCode::IllegalState);
        assert_eq!(engine.txn_begin(TxMode::Read).unwrap_err().code, ErrorCode::IllegalState);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Put(u64, String),
        Remove(u64),
    }

    fn op() -> impl proptest::strategy::Strategy<Value = Op> {
        use proptest::prelude::*;
        prop_oneof![
            (1u64..16, "[a-z]{0,8}").prop_map(|(id, text)| Op::Put(id, text)),
            (1u64..16).prop_map(Op::Remove),
        ]
    }

    proptest::proptest! {
        #[test]
        fn committed_state_matches_a_map(
            batches in proptest::collection::vec(
                (proptest::collection::vec(op(), 1..8), proptest::bool::ANY),
                1..12,
            ),
        ) {
            let engine = engine();
            let mut expected = std::collections::BTreeMap::new();
            for (ops, commit) in batches {
                let txn = engine.txn_begin(TxMode::Write).unwrap();
                let cursor = engine.cursor_open(txn, NOTE).unwrap();
                let mut staged = expected.clone();
                for op in ops {
                    match op {
                        Op::Put(id, text) => {
                            let data = note(&text, 0);
                            proptest::prop_assert_eq!(engine.cursor_put(cursor, id, &data, PutMode::Put), id);
                            staged.insert(id, data);
                        }
                        Op::Remove(id) => {
                            let removed = engine.cursor_remove(cursor, id).is_ok();
                            proptest::prop_assert_eq!(removed, staged.remove(&id).is_some());
                        }
                    }
                }
                engine.txn_mark_success(txn, commit).unwrap();
                engine.txn_close(txn).unwrap();
                if commit {
                    expected = staged;
                }
            }

            let stored = read(&engine, NOTE, |c| {
                let mut stored = Vec::new();
                let mut next = engine.cursor_first(c);
                while let Ok((id, bytes)) = next {
                    stored.push((id, bytes.to_vec()));
                    next = engine.cursor_next(c);
                }
                stored
            });
            let expected_size: u64 = expected.values().map(|data| data.len() as u64).sum();
            proptest::prop_assert_eq!(stored, expected.into_iter().collect::<Vec<_>>());
            proptest::prop_assert_eq!(engine.committed_size(), expected_size);
        }
    }
}
