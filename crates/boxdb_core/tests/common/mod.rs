//! Shared fixtures for integration tests.

#![allow(dead_code)]

use boxdb_core::{
    CoreResult, EncodeBuffer, Engine, EngineError, Entity, EntityTypeId, ErrorCode,
    MemoryEngine, Model, ObjectId, PropertyFlags, PropertyId, PropertyType, PutMode, RelationId,
    Store, TableReader, TableWriter, TimeSeriesMinMax, ToMany, ToOne, TxMode,
};
use boxdb_engine::{CursorHandle, EngineOptions, EngineResult, IdArray, TxnHandle};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Customer {
    pub id: ObjectId,
    pub name: String,
    pub vip: bool,
}

impl Entity for Customer {
    const ENTITY_TYPE_ID: EntityTypeId = EntityTypeId::new(1);

    fn id(&self) -> ObjectId {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    fn encode(&self, buffer: &mut EncodeBuffer) -> CoreResult<()> {
        let mut writer = TableWriter::new(buffer);
        writer
            .field(1, self.id)
            .field(2, self.name.as_str())
            .field(3, self.vip);
        Ok(writer.finish()?)
    }

    fn decode(id: ObjectId, bytes: &[u8]) -> CoreResult<Self> {
        let record = TableReader::parse(bytes)?;
        Ok(Self {
            id,
            name: record.string(2)?,
            vip: record.bool(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Order {
    pub id: ObjectId,
    pub customer: ObjectId,
    pub total: f64,
    pub placed_at: i64,
    pub note: String,
}

impl Entity for Order {
    const ENTITY_TYPE_ID: EntityTypeId = EntityTypeId::new(2);

    fn id(&self) -> ObjectId {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    fn encode(&self, buffer: &mut EncodeBuffer) -> CoreResult<()> {
        let mut writer = TableWriter::new(buffer);
        writer
            .field(1, self.id)
            .field(2, self.customer)
            .field(3, self.total)
            .field(4, self.placed_at)
            .field(5, self.note.as_str());
        Ok(writer.finish()?)
    }

    fn decode(id: ObjectId, bytes: &[u8]) -> CoreResult<Self> {
        let record = TableReader::parse(bytes)?;
        Ok(Self {
            id,
            customer: record.u64(2)?,
            total: record.f64(3)?,
            placed_at: record.i64(4)?,
            note: record.string(5)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tag {
    pub id: ObjectId,
    pub label: String,
}

impl Entity for Tag {
    const ENTITY_TYPE_ID: EntityTypeId = EntityTypeId::new(3);

    fn id(&self) -> ObjectId {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    fn encode(&self, buffer: &mut EncodeBuffer) -> CoreResult<()> {
        let mut writer = TableWriter::new(buffer);
        writer.field(1, self.id).field(2, self.label.as_str());
        Ok(writer.finish()?)
    }

    fn decode(id: ObjectId, bytes: &[u8]) -> CoreResult<Self> {
        let record = TableReader::parse(bytes)?;
        Ok(Self {
            id,
            label: record.string(2)?,
        })
    }
}

/// Entity bound to a type id the model does not know.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stray {
    pub id: ObjectId,
}

impl Entity for Stray {
    const ENTITY_TYPE_ID: EntityTypeId = EntityTypeId::new(42);

    fn id(&self) -> ObjectId {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    fn encode(&self, buffer: &mut EncodeBuffer) -> CoreResult<()> {
        let writer = TableWriter::new(buffer);
        Ok(writer.finish()?)
    }

    fn decode(id: ObjectId, _bytes: &[u8]) -> CoreResult<Self> {
        Ok(Self { id })
    }
}

pub const ORDER_CUSTOMER: ToOne<Order, Customer> = ToOne::new(2);
pub const CUSTOMER_TAGS: ToMany<Customer, Tag> = ToMany::new(1);

pub fn model() -> Model {
    Model::new()
        .entity("Customer", 1)
        .property("id", 1, PropertyType::Long, PropertyFlags::ID)
        .property("name", 2, PropertyType::String, PropertyFlags::NONE)
        .property("vip", 3, PropertyType::Bool, PropertyFlags::NONE)
        .standalone_relation(1, 3)
        .entity("Order", 2)
        .property("id", 1, PropertyType::Long, PropertyFlags::ID)
        .property("customer", 2, PropertyType::Relation, PropertyFlags::INDEXED)
        .relation_to(1)
        .property("total", 3, PropertyType::Double, PropertyFlags::NONE)
        .property("placedAt", 4, PropertyType::Date, PropertyFlags::ID_COMPANION)
        .property("note", 5, PropertyType::String, PropertyFlags::NONE)
        .entity("Tag", 3)
        .property("id", 1, PropertyType::Long, PropertyFlags::ID)
        .property("label", 2, PropertyType::String, PropertyFlags::NONE)
}

pub fn customer(name: &str) -> Customer {
    Customer {
        id: 0,
        name: name.to_string(),
        vip: false,
    }
}

pub fn order(customer: ObjectId, total: f64, placed_at: i64) -> Order {
    Order {
        id: 0,
        customer,
        total,
        placed_at,
        note: String::new(),
    }
}

pub fn tag(label: &str) -> Tag {
    Tag {
        id: 0,
        label: label.to_string(),
    }
}

/// A store over a memory engine the test keeps a handle to.
pub fn memory_store() -> (Arc<MemoryEngine>, Store) {
    memory_store_with(EngineOptions::default())
}

pub fn memory_store_with(options: EngineOptions) -> (Arc<MemoryEngine>, Store) {
    let engine = Arc::new(MemoryEngine::open(model(), options).unwrap());
    let store = Store::with_engine(Arc::clone(&engine) as Arc<dyn Engine>, 2);
    (engine, store)
}

/// A store over a [`ProbeEngine`].
pub fn probe_store() -> (Arc<ProbeEngine>, Store) {
    let probe = Arc::new(ProbeEngine::new(
        MemoryEngine::open(model(), EngineOptions::default()).unwrap(),
    ));
    let store = Store::with_engine(Arc::clone(&probe) as Arc<dyn Engine>, 2);
    (probe, store)
}

/// Delegates to a memory engine, counting calls and injecting faults.
#[derive(Debug)]
pub struct ProbeEngine {
    pub inner: MemoryEngine,
    pub rel_puts: AtomicUsize,
    pub rel_removes: AtomicUsize,
    pub contains_many_calls: AtomicUsize,
    pub freed_arrays: AtomicUsize,
    /// Report one more id than the array holds.
    pub overreport_ids: AtomicBool,
    /// Return the failure sentinel from put without recording an error.
    pub silent_put_failure: AtomicBool,
    /// Refuse the next mark-success call, leaving the transaction unmarked.
    pub fail_mark_success: AtomicBool,
    /// Close the next transaction, then report a failure anyway.
    pub fail_close: AtomicBool,
    /// When set to n, the n-th following `cursor_next` fails.
    pub fail_cursor_next: AtomicUsize,
}

impl ProbeEngine {
    pub fn new(inner: MemoryEngine) -> Self {
        Self {
            inner,
            rel_puts: AtomicUsize::new(0),
            rel_removes: AtomicUsize::new(0),
            contains_many_calls: AtomicUsize::new(0),
            freed_arrays: AtomicUsize::new(0),
            overreport_ids: AtomicBool::new(false),
            silent_put_failure: AtomicBool::new(false),
            fail_mark_success: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            fail_cursor_next: AtomicUsize::new(0),
        }
    }

    pub fn reset_counters(&self) {
        self.rel_puts.store(0, Ordering::SeqCst);
        self.rel_removes.store(0, Ordering::SeqCst);
        self.contains_many_calls.store(0, Ordering::SeqCst);
        self.freed_arrays.store(0, Ordering::SeqCst);
    }

    fn shape(&self, array: IdArray) -> IdArray {
        if self.overreport_ids.load(Ordering::SeqCst) {
            let count = array.count() + 1;
            let token = array.token();
            IdArray::with_count(array.ids().to_vec(), count, token)
        } else {
            array
        }
    }
}

impl Engine for ProbeEngine {
    fn txn_begin(&self, mode: TxMode) -> EngineResult<TxnHandle> {
        self.inner.txn_begin(mode)
    }

    fn txn_mark_success(&self, txn: TxnHandle, successful: bool) -> EngineResult<()> {
        if self.fail_mark_success.swap(false, Ordering::SeqCst) {
            return Err(EngineError::new(ErrorCode::CommitFailed, "mark refused"));
        }
        self.inner.txn_mark_success(txn, successful)
    }

    fn txn_close(&self, txn: TxnHandle) -> EngineResult<()> {
        let closed = self.inner.txn_close(txn);
        if self.fail_close.swap(false, Ordering::SeqCst) {
            return Err(EngineError::new(ErrorCode::General, "close failed"));
        }
        closed
    }

    fn cursor_open(&self, txn: TxnHandle, entity: EntityTypeId) -> EngineResult<CursorHandle> {
        self.inner.cursor_open(txn, entity)
    }

    fn cursor_close(&self, cursor: CursorHandle) -> EngineResult<()> {
        self.inner.cursor_close(cursor)
    }

    fn cursor_get(&self, cursor: CursorHandle, id: ObjectId) -> EngineResult<Bytes> {
        self.inner.cursor_get(cursor, id)
    }

    fn cursor_first(&self, cursor: CursorHandle) -> EngineResult<(ObjectId, Bytes)> {
        self.inner.cursor_first(cursor)
    }

    fn cursor_next(&self, cursor: CursorHandle) -> EngineResult<(ObjectId, Bytes)> {
        let countdown = self.fail_cursor_next.load(Ordering::SeqCst);
        if countdown > 0 {
            self.fail_cursor_next.store(countdown - 1, Ordering::SeqCst);
            if countdown == 1 {
                return Err(EngineError::new(ErrorCode::General, "read failed"));
            }
        }
        self.inner.cursor_next(cursor)
    }

    fn cursor_put(&self, cursor: CursorHandle, id: ObjectId, data: &[u8], mode: PutMode) -> ObjectId {
        if self.silent_put_failure.load(Ordering::SeqCst) {
            boxdb_engine::clear_last_error();
            return 0;
        }
        self.inner.cursor_put(cursor, id, data, mode)
    }

    fn cursor_remove(&self, cursor: CursorHandle, id: ObjectId) -> EngineResult<()> {
        self.inner.cursor_remove(cursor, id)
    }

    fn cursor_remove_all(&self, cursor: CursorHandle) -> EngineResult<u64> {
        self.inner.cursor_remove_all(cursor)
    }

    fn cursor_count(&self, cursor: CursorHandle, limit: u64) -> EngineResult<u64> {
        self.inner.cursor_count(cursor, limit)
    }

    fn cursor_contains(&self, cursor: CursorHandle, id: ObjectId) -> EngineResult<bool> {
        self.inner.cursor_contains(cursor, id)
    }

    fn cursor_contains_many(&self, cursor: CursorHandle, ids: &[ObjectId]) -> EngineResult<bool> {
        self.contains_many_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.cursor_contains_many(cursor, ids)
    }

    fn cursor_backlink_ids(
        &self,
        cursor: CursorHandle,
        property: PropertyId,
        id: ObjectId,
    ) -> EngineResult<IdArray> {
        self.inner
            .cursor_backlink_ids(cursor, property, id)
            .map(|array| self.shape(array))
    }

    fn cursor_rel_put(
        &self,
        cursor: CursorHandle,
        relation: RelationId,
        source: ObjectId,
        target: ObjectId,
    ) -> EngineResult<()> {
        self.rel_puts.fetch_add(1, Ordering::SeqCst);
        self.inner.cursor_rel_put(cursor, relation, source, target)
    }

    fn cursor_rel_remove(
        &self,
        cursor: CursorHandle,
        relation: RelationId,
        source: ObjectId,
        target: ObjectId,
    ) -> EngineResult<()> {
        self.rel_removes.fetch_add(1, Ordering::SeqCst);
        self.inner.cursor_rel_remove(cursor, relation, source, target)
    }

    fn cursor_rel_ids(
        &self,
        cursor: CursorHandle,
        relation: RelationId,
        source: ObjectId,
    ) -> EngineResult<IdArray> {
        self.inner
            .cursor_rel_ids(cursor, relation, source)
            .map(|array| self.shape(array))
    }

    fn cursor_rel_backlink_ids(
        &self,
        cursor: CursorHandle,
        relation: RelationId,
        target: ObjectId,
    ) -> EngineResult<IdArray> {
        self.inner
            .cursor_rel_backlink_ids(cursor, relation, target)
            .map(|array| self.shape(array))
    }

    fn cursor_ts_min_max(
        &self,
        cursor: CursorHandle,
        range: Option<(i64, i64)>,
    ) -> EngineResult<TimeSeriesMinMax> {
        self.inner.cursor_ts_min_max(cursor, range)
    }

    fn free_id_array(&self, array: IdArray) {
        self.freed_arrays.fetch_add(1, Ordering::SeqCst);
        self.inner.free_id_array(array);
    }

    fn last_error(&self) -> Option<EngineError> {
        self.inner.last_error()
    }

    fn close(&self) -> EngineResult<()> {
        self.inner.close()
    }
}
