//! Per-entity-type access.

use crate::cursor::Cursor;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use crate::transaction::Transaction;
use boxdb_engine::{ObjectId, PropertyId, PutMode, RelationId, TimeSeriesMinMax, TxMode};
use std::marker::PhantomData;

/// CRUD and relation operations for objects of one entity type.
///
/// An `EntityBox` is a stateless view on a [`Store`]. Every operation runs
/// in its own short-lived transaction; the `*_in` variants use a transaction
/// supplied by the caller instead. Cursors and transactions are released on
/// every exit path, including errors.
///
/// Missing objects are never errors: `get` returns `None`, `remove` returns
/// `false`, and batch reads leave holes.
///
/// # Example
///
/// ```rust,ignore
/// let notes: EntityBox<'_, Note> = EntityBox::new(&store)?;
///
/// let mut note = Note { id: 0, text: "hello".into() };
/// let id = notes.put(&mut note)?;
/// assert_eq!(note.id, id);
///
/// assert_eq!(notes.get(id)?.map(|n| n.text), Some("hello".into()));
/// assert!(notes.remove(id)?);
/// ```
pub struct EntityBox<'s, T: Entity> {
    store: &'s Store,
    _marker: PhantomData<fn() -> T>,
}

impl<'s, T: Entity> EntityBox<'s, T> {
    /// Creates the box for `T`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `T` declares entity type 0.
    pub fn new(store: &'s Store) -> CoreResult<Self> {
        if T::ENTITY_TYPE_ID.as_u32() == 0 {
            return Err(CoreError::invalid_argument(
                "entity type id must be positive",
            ));
        }
        Ok(Self {
            store,
            _marker: PhantomData,
        })
    }

    /// The store this box belongs to.
    #[must_use]
    pub fn store(&self) -> &'s Store {
        self.store
    }

    fn reader(&self) -> CoreResult<Cursor<'s>> {
        Cursor::open_owned(self.store, TxMode::Read, T::ENTITY_TYPE_ID)
    }

    fn writer(&self) -> CoreResult<Cursor<'s>> {
        Cursor::open_owned(self.store, TxMode::Write, T::ENTITY_TYPE_ID)
    }

    /// Counts objects, stopping at `limit` (0 = no limit).
    pub fn count(&self, limit: u64) -> CoreResult<u64> {
        self.reader()?.count(limit)
    }

    /// Returns true if there are no objects.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.count(1)? == 0)
    }

    /// Returns true if an object with `id` exists.
    pub fn contains(&self, id: ObjectId) -> CoreResult<bool> {
        self.reader()?.contains(id)
    }

    /// Returns true if objects exist for all `ids`; true for no ids.
    pub fn contains_many(&self, ids: &[ObjectId]) -> CoreResult<bool> {
        if ids.is_empty() {
            return Ok(true);
        }
        self.reader()?.contains_many(ids)
    }

    /// Reads one object.
    pub fn get(&self, id: ObjectId) -> CoreResult<Option<T>> {
        let cursor = self.reader()?;
        match cursor.get(id)? {
            Some(bytes) => Ok(Some(T::decode(id, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads one object into `object`; returns false (leaving `object`
    /// untouched) if it does not exist.
    pub fn get_into(&self, id: ObjectId, object: &mut T) -> CoreResult<bool> {
        let cursor = self.reader()?;
        match cursor.get(id)? {
            Some(bytes) => {
                object.decode_into(id, &bytes)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reads several objects from one snapshot.
    ///
    /// The result has one entry per id, `None` where the object is missing.
    pub fn get_many(&self, ids: &[ObjectId]) -> CoreResult<Vec<Option<T>>> {
        let cursor = self.reader()?;
        ids.iter()
            .map(|&id| -> CoreResult<Option<T>> {
                match cursor.get(id)? {
                    Some(bytes) => Ok(Some(T::decode(id, &bytes)?)),
                    None => Ok(None),
                }
            })
            .collect()
    }

    /// Reads all objects in id order.
    pub fn get_all(&self) -> CoreResult<Vec<T>> {
        let cursor = self.reader()?;
        collect_all(&cursor)
    }

    /// Stores one object, assigning an id if it has none.
    ///
    /// The effective id is written back into `object` once the write is
    /// committed.
    pub fn put(&self, object: &mut T) -> CoreResult<ObjectId> {
        self.put_with_mode(object, PutMode::Put)
    }

    /// Stores a new object; fails if its id is already taken.
    pub fn insert(&self, object: &mut T) -> CoreResult<ObjectId> {
        self.put_with_mode(object, PutMode::Insert)
    }

    /// Overwrites an existing object; `NotFound` if it does not exist.
    pub fn update(&self, object: &mut T) -> CoreResult<ObjectId> {
        self.put_with_mode(object, PutMode::Update)
    }

    /// Stores one object with the given mode.
    pub fn put_with_mode(&self, object: &mut T, mode: PutMode) -> CoreResult<ObjectId> {
        let cursor = self.writer()?;
        let id = self.put_with(&cursor, object, mode)?;
        cursor.commit_and_close()?;
        object.set_id(id);
        Ok(id)
    }

    /// Stores objects in one write transaction.
    ///
    /// `out_ids` is cleared first and receives the ids in input order.
    /// Either all objects are stored or none; ids are written back into the
    /// objects only after the commit succeeded.
    pub fn put_many(
        &self,
        objects: &mut [T],
        mut out_ids: Option<&mut Vec<ObjectId>>,
        mode: PutMode,
    ) -> CoreResult<usize> {
        if let Some(out) = out_ids.as_deref_mut() {
            out.clear();
        }
        if objects.is_empty() {
            return Ok(0);
        }

        let cursor = self.writer()?;
        let ids = objects
            .iter()
            .map(|object| self.put_with(&cursor, object, mode))
            .collect::<CoreResult<Vec<_>>>()?;
        cursor.commit_and_close()?;

        for (object, &id) in objects.iter_mut().zip(&ids) {
            object.set_id(id);
        }
        tracing::debug!(entity = %T::ENTITY_TYPE_ID, count = ids.len(), "stored batch");
        if let Some(out) = out_ids {
            out.extend_from_slice(&ids);
        }
        Ok(ids.len())
    }

    /// Like [`EntityBox::put_many`], skipping `None` entries.
    ///
    /// Skipped entries get id 0 in `out_ids` and are not counted.
    pub fn put_many_optional(
        &self,
        objects: &mut [Option<T>],
        mut out_ids: Option<&mut Vec<ObjectId>>,
        mode: PutMode,
    ) -> CoreResult<usize> {
        if let Some(out) = out_ids.as_deref_mut() {
            out.clear();
        }
        if objects.is_empty() {
            return Ok(0);
        }

        let cursor = self.writer()?;
        let ids = objects
            .iter()
            .map(|slot| match slot {
                Some(object) => self.put_with(&cursor, object, mode),
                None => Ok(0),
            })
            .collect::<CoreResult<Vec<_>>>()?;
        cursor.commit_and_close()?;

        let mut stored = 0;
        for (slot, &id) in objects.iter_mut().zip(&ids) {
            if let Some(object) = slot {
                object.set_id(id);
                stored += 1;
            }
        }
        tracing::debug!(entity = %T::ENTITY_TYPE_ID, count = stored, "stored batch");
        if let Some(out) = out_ids {
            out.extend_from_slice(&ids);
        }
        Ok(stored)
    }

    /// Removes one object; false if it did not exist.
    pub fn remove(&self, id: ObjectId) -> CoreResult<bool> {
        let cursor = self.writer()?;
        let removed = cursor.remove(id)?;
        cursor.commit_and_close()?;
        Ok(removed)
    }

    /// Removes several objects and returns how many existed.
    pub fn remove_many(&self, ids: &[ObjectId]) -> CoreResult<u64> {
        let cursor = self.writer()?;
        let mut removed = 0;
        for &id in ids {
            if cursor.remove(id)? {
                removed += 1;
            }
        }
        cursor.commit_and_close()?;
        Ok(removed)
    }

    /// Removes all objects and returns how many there were.
    pub fn remove_all(&self) -> CoreResult<u64> {
        let cursor = self.writer()?;
        let removed = cursor.remove_all()?;
        cursor.commit_and_close()?;
        tracing::debug!(entity = %T::ENTITY_TYPE_ID, removed, "removed all objects");
        Ok(removed)
    }

    /// Ids of objects of this type whose to-one relation `property` points
    /// at `id`.
    pub fn backlink_ids(&self, property: impl Into<PropertyId>, id: ObjectId) -> CoreResult<Vec<ObjectId>> {
        self.reader()?.backlink_ids(property.into(), id)
    }

    /// Target ids linked from `source` through a standalone relation.
    pub fn rel_ids(&self, relation: impl Into<RelationId>, source: ObjectId) -> CoreResult<Vec<ObjectId>> {
        self.reader()?.rel_ids(relation.into(), source)
    }

    /// Source ids linking to `target` through a standalone relation.
    pub fn rel_backlink_ids(&self, relation: impl Into<RelationId>, target: ObjectId) -> CoreResult<Vec<ObjectId>> {
        self.reader()?.rel_backlink_ids(relation.into(), target)
    }

    /// Adds a standalone relation link.
    pub fn rel_put(&self, relation: impl Into<RelationId>, source: ObjectId, target: ObjectId) -> CoreResult<()> {
        let cursor = self.writer()?;
        cursor.rel_put(relation.into(), source, target)?;
        cursor.commit_and_close()
    }

    /// Removes a standalone relation link.
    pub fn rel_remove(&self, relation: impl Into<RelationId>, source: ObjectId, target: ObjectId) -> CoreResult<()> {
        let cursor = self.writer()?;
        cursor.rel_remove(relation.into(), source, target)?;
        cursor.commit_and_close()
    }

    /// Makes `targets` the exact set of links from `source`, in one write
    /// transaction. Links present in both the old and the new set are not
    /// touched.
    pub fn rel_replace(
        &self,
        relation: impl Into<RelationId>,
        source: ObjectId,
        targets: &[ObjectId],
    ) -> CoreResult<()> {
        let relation = relation.into();
        self.store
            .write(|tx| self.rel_replace_in(tx, relation, source, targets))
    }

    /// Limits of the time property over all objects; `None` if there are none.
    pub fn time_series_min_max(&self) -> CoreResult<Option<TimeSeriesMinMax>> {
        self.reader()?.ts_min_max(None)
    }

    /// Limits of the time property over objects with a time in
    /// `[begin, end]`; `None` if there are none.
    pub fn time_series_min_max_in(&self, begin: i64, end: i64) -> CoreResult<Option<TimeSeriesMinMax>> {
        if begin > end {
            return Err(CoreError::invalid_argument(format!(
                "time range begins after it ends: {begin} > {end}"
            )));
        }
        self.reader()?.ts_min_max(Some((begin, end)))
    }

    /// Reads one object within `tx`.
    pub fn get_in(&self, tx: &Transaction<'_>, id: ObjectId) -> CoreResult<Option<T>> {
        let cursor = Cursor::open(tx, T::ENTITY_TYPE_ID)?;
        match cursor.get(id)? {
            Some(bytes) => Ok(Some(T::decode(id, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads all objects within `tx`.
    pub fn get_all_in(&self, tx: &Transaction<'_>) -> CoreResult<Vec<T>> {
        let cursor = Cursor::open(tx, T::ENTITY_TYPE_ID)?;
        collect_all(&cursor)
    }

    /// Counts objects within `tx`.
    pub fn count_in(&self, tx: &Transaction<'_>, limit: u64) -> CoreResult<u64> {
        Cursor::open(tx, T::ENTITY_TYPE_ID)?.count(limit)
    }

    /// Stores one object within a write transaction and returns its id.
    ///
    /// The object is not modified: the id only becomes durable when the
    /// caller commits `tx`.
    pub fn put_in(&self, tx: &Transaction<'_>, object: &T, mode: PutMode) -> CoreResult<ObjectId> {
        let cursor = Cursor::open(tx, T::ENTITY_TYPE_ID)?;
        self.put_with(&cursor, object, mode)
    }

    /// Removes one object within a write transaction.
    pub fn remove_in(&self, tx: &Transaction<'_>, id: ObjectId) -> CoreResult<bool> {
        Cursor::open(tx, T::ENTITY_TYPE_ID)?.remove(id)
    }

    /// Target ids of a standalone relation, read within `tx`.
    pub fn rel_ids_in(
        &self,
        tx: &Transaction<'_>,
        relation: impl Into<RelationId>,
        source: ObjectId,
    ) -> CoreResult<Vec<ObjectId>> {
        Cursor::open(tx, T::ENTITY_TYPE_ID)?.rel_ids(relation.into(), source)
    }

    /// Adds a standalone relation link within a write transaction.
    pub fn rel_put_in(
        &self,
        tx: &Transaction<'_>,
        relation: impl Into<RelationId>,
        source: ObjectId,
        target: ObjectId,
    ) -> CoreResult<()> {
        Cursor::open(tx, T::ENTITY_TYPE_ID)?.rel_put(relation.into(), source, target)
    }

    /// Removes a standalone relation link within a write transaction.
    pub fn rel_remove_in(
        &self,
        tx: &Transaction<'_>,
        relation: impl Into<RelationId>,
        source: ObjectId,
        target: ObjectId,
    ) -> CoreResult<()> {
        Cursor::open(tx, T::ENTITY_TYPE_ID)?.rel_remove(relation.into(), source, target)
    }

    /// [`EntityBox::rel_replace`] within a write transaction.
    pub fn rel_replace_in(
        &self,
        tx: &Transaction<'_>,
        relation: impl Into<RelationId>,
        source: ObjectId,
        targets: &[ObjectId],
    ) -> CoreResult<()> {
        let relation = relation.into();
        let cursor = Cursor::open(tx, T::ENTITY_TYPE_ID)?;

        let mut new = targets.to_vec();
        new.sort_unstable();
        new.dedup();
        let mut old = cursor.rel_ids(relation, source)?;
        old.sort_unstable();

        let removed = sorted_difference(&old, &new);
        let added = sorted_difference(&new, &old);
        for &target in &removed {
            cursor.rel_remove(relation, source, target)?;
        }
        for &target in &added {
            cursor.rel_put(relation, source, target)?;
        }
        tracing::debug!(
            %relation,
            source,
            removed = removed.len(),
            added = added.len(),
            "replaced relation targets"
        );
        Ok(())
    }

    fn put_with(&self, cursor: &Cursor<'_>, object: &T, mode: PutMode) -> CoreResult<ObjectId> {
        let mut buffer = self.store.buffers().acquire();
        object.encode(&mut buffer)?;
        let id = cursor.put(object.id(), buffer.as_bytes(), mode)?;
        buffer.clean_after_use();
        Ok(id)
    }
}

fn collect_all<T: Entity>(cursor: &Cursor<'_>) -> CoreResult<Vec<T>> {
    let mut objects = Vec::new();
    let mut next = cursor.first()?;
    while let Some((id, bytes)) = next {
        objects.push(T::decode(id, &bytes)?);
        next = cursor.next()?;
    }
    Ok(objects)
}

/// Elements of sorted `a` missing from sorted `b`.
pub(crate) fn sorted_difference(a: &[ObjectId], b: &[ObjectId]) -> Vec<ObjectId> {
    let mut result = Vec::new();
    let mut rest = b.iter().peekable();
    for &id in a {
        while rest.next_if(|&&other| other < id).is_some() {}
        if rest.peek() != Some(&&id) {
            result.push(id);
        }
    }
    result
}
