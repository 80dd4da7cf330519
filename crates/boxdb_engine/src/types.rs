//! Identifier and handle types of the engine boundary.

use std::fmt;

/// 64-bit object identifier. `0` (or [`ID_NEW`]) means "not yet assigned".
pub type ObjectId = u64;

/// Alternative sentinel for objects that should receive a new id on put.
pub const ID_NEW: ObjectId = u64::MAX;

/// Identifier of an entity type in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityTypeId(pub u32);

impl EntityTypeId {
    /// Creates an entity type id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity:{}", self.0)
    }
}

/// Identifier of a property within its entity type; also the record field slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(pub u16);

impl PropertyId {
    /// Creates a property id.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "property:{}", self.0)
    }
}

/// Identifier of a standalone (many-to-many) relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationId(pub u32);

impl RelationId {
    /// Creates a relation id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "relation:{}", self.0)
    }
}

/// Transactions are started in read (only) or write mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxMode {
    /// Read-only snapshot.
    Read,
    /// Exclusive read-write transaction.
    Write,
}

/// How a put treats existing objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PutMode {
    /// Insert new objects, overwrite existing ones.
    #[default]
    Put,
    /// Fail if an object with the id already exists.
    Insert,
    /// Fail with not-found unless an object with the id exists.
    Update,
}

/// Opaque handle of an engine transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnHandle(u64);

impl TxnHandle {
    /// Wraps a raw handle value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Opaque handle of an engine cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorHandle(u64);

impl CursorHandle {
    /// Wraps a raw handle value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Limits of the time property over a set of time series objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSeriesMinMax {
    /// Object holding the smallest time value.
    pub min_id: ObjectId,
    /// Smallest time value.
    pub min_value: i64,
    /// Object holding the largest time value.
    pub max_id: ObjectId,
    /// Largest time value.
    pub max_value: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display() {
        assert_eq!(EntityTypeId::new(2).to_string(), "entity:2");
        assert_eq!(PropertyId::new(4).to_string(), "property:4");
        assert_eq!(RelationId::new(7).to_string(), "relation:7");
    }

    #[test]
    fn default_put_mode() {
        assert_eq!(PutMode::default(), PutMode::Put);
    }
}
