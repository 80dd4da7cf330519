//! The entity binding contract.

use crate::error::CoreResult;
use boxdb_codec::EncodeBuffer;
use boxdb_engine::{EntityTypeId, ObjectId, PropertyId, RelationId};
use std::fmt;
use std::marker::PhantomData;

/// Trait for types stored as objects of one entity type.
///
/// Implementors must provide:
/// - `ENTITY_TYPE_ID`: the entity type in the store's model
/// - `id()` / `set_id()`: access to the 64-bit object id (0 = new)
/// - `encode()`: writes the record into a (cleared) encode buffer
/// - `decode()`: builds the object from a stored record
///
/// # Example
///
/// ```rust
/// use boxdb_core::{CoreResult, EncodeBuffer, Entity, EntityTypeId, ObjectId, TableReader, TableWriter};
///
/// struct Note {
///     id: ObjectId,
///     text: String,
/// }
///
/// impl Entity for Note {
///     const ENTITY_TYPE_ID: EntityTypeId = EntityTypeId::new(1);
///
///     fn id(&self) -> ObjectId {
///         self.id
///     }
///
///     fn set_id(&mut self, id: ObjectId) {
///         self.id = id;
///     }
///
///     fn encode(&self, buffer: &mut EncodeBuffer) -> CoreResult<()> {
///         let mut writer = TableWriter::new(buffer);
///         writer.field(1, self.id).field(2, self.text.as_str());
///         Ok(writer.finish()?)
///     }
///
///     fn decode(id: ObjectId, bytes: &[u8]) -> CoreResult<Self> {
///         let record = TableReader::parse(bytes)?;
///         Ok(Note { id, text: record.string(2)? })
///     }
/// }
/// ```
pub trait Entity: Sized {
    /// The entity type this binding belongs to.
    const ENTITY_TYPE_ID: EntityTypeId;

    /// The object's id; 0 if not yet stored.
    fn id(&self) -> ObjectId;

    /// Sets the object's id.
    fn set_id(&mut self, id: ObjectId);

    /// Encodes the object into `buffer`.
    fn encode(&self, buffer: &mut EncodeBuffer) -> CoreResult<()>;

    /// Decodes an object stored under `id`.
    fn decode(id: ObjectId, bytes: &[u8]) -> CoreResult<Self>;

    /// Decodes into an existing object, overwriting all its fields.
    fn decode_into(&mut self, id: ObjectId, bytes: &[u8]) -> CoreResult<()> {
        *self = Self::decode(id, bytes)?;
        Ok(())
    }
}

/// A to-one relation property of `S` pointing at `T`.
pub struct ToOne<S, T> {
    property: PropertyId,
    _marker: PhantomData<fn() -> (S, T)>,
}

impl<S, T> ToOne<S, T> {
    /// Declares the relation for property `id` of the source entity.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self {
            property: PropertyId::new(id),
            _marker: PhantomData,
        }
    }

    /// The relation property.
    #[must_use]
    pub const fn property(&self) -> PropertyId {
        self.property
    }
}

impl<S, T> Clone for ToOne<S, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, T> Copy for ToOne<S, T> {}

impl<S, T> fmt::Debug for ToOne<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ToOne").field(&self.property).finish()
    }
}

impl<S, T> From<ToOne<S, T>> for PropertyId {
    fn from(relation: ToOne<S, T>) -> Self {
        relation.property
    }
}

/// A standalone relation from `S` to `T`.
pub struct ToMany<S, T> {
    relation: RelationId,
    _marker: PhantomData<fn() -> (S, T)>,
}

impl<S, T> ToMany<S, T> {
    /// Declares the standalone relation `id`.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self {
            relation: RelationId::new(id),
            _marker: PhantomData,
        }
    }

    /// The relation id.
    #[must_use]
    pub const fn relation(&self) -> RelationId {
        self.relation
    }
}

impl<S, T> Clone for ToMany<S, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, T> Copy for ToMany<S, T> {}

impl<S, T> fmt::Debug for ToMany<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ToMany").field(&self.relation).finish()
    }
}

impl<S, T> From<ToMany<S, T>> for RelationId {
    fn from(relation: ToMany<S, T>) -> Self {
        relation.relation
    }
}
