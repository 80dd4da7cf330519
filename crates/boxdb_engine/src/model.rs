//! Schema descriptor.
//!
//! The model lists entity types, their properties and the standalone
//! relations between them. It is assembled with a builder whose first error
//! is latched: later builder calls become no-ops and the error surfaces from
//! [`Model::error`] and [`Model::validate`].

use crate::error::{EngineError, EngineResult};
use crate::types::{EntityTypeId, PropertyId, RelationId};
use std::collections::HashSet;
use std::ops::BitOr;

/// Storage type of a property.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// Boolean.
    Bool = 1,
    /// 8-bit integer.
    Byte = 2,
    /// 16-bit integer.
    Short = 3,
    /// 16-bit character.
    Char = 4,
    /// 32-bit integer.
    Int = 5,
    /// 64-bit integer.
    Long = 6,
    /// 32-bit float.
    Float = 7,
    /// 64-bit float.
    Double = 8,
    /// UTF-8 string.
    String = 9,
    /// Milliseconds since the epoch, stored as a 64-bit integer.
    Date = 10,
    /// To-one relation, stored as the target object id.
    Relation = 11,
    /// Byte vector.
    ByteVector = 23,
    /// List of strings.
    StringVector = 30,
}

/// Property flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PropertyFlags(u32);

impl PropertyFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// The object id property.
    pub const ID: Self = Self(1);
    /// The property is indexed.
    pub const INDEXED: Self = Self(8);
    /// Values must be unique.
    pub const UNIQUE: Self = Self(32);
    /// Integer values are unsigned.
    pub const UNSIGNED: Self = Self(8192);
    /// The time property of a time series entity.
    pub const ID_COMPANION: Self = Self(16384);

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if all flags of `other` are set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PropertyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A property of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Property name.
    pub name: String,
    /// Property id; also the record field slot.
    pub id: PropertyId,
    /// Storage type.
    pub ty: PropertyType,
    /// Flags.
    pub flags: PropertyFlags,
    /// Target entity of a to-one relation property.
    pub target: Option<EntityTypeId>,
}

/// A standalone (many-to-many) relation owned by its source entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandaloneRelation {
    /// Relation id, unique across the model.
    pub id: RelationId,
    /// Entity type of the link targets.
    pub target: EntityTypeId,
}

/// An entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityModel {
    /// Entity name.
    pub name: String,
    /// Entity type id.
    pub id: EntityTypeId,
    /// Properties in declaration order.
    pub properties: Vec<Property>,
    /// Standalone relations with this entity as source.
    pub relations: Vec<StandaloneRelation>,
}

impl EntityModel {
    /// Looks up a property by id.
    #[must_use]
    pub fn property(&self, id: PropertyId) -> Option<&Property> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// The id property.
    #[must_use]
    pub fn id_property(&self) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.flags.contains(PropertyFlags::ID))
    }

    /// The time property of a time series entity.
    #[must_use]
    pub fn time_property(&self) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.flags.contains(PropertyFlags::ID_COMPANION))
    }
}

/// The schema descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    entities: Vec<EntityModel>,
    error: Option<EngineError>,
}

impl Model {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new entity type; following properties belong to it.
    #[must_use]
    pub fn entity(mut self, name: &str, id: u32) -> Self {
        if self.error.is_some() {
            return self;
        }
        if id == 0 {
            return self.fail(format!("entity {name}: id must not be zero"));
        }
        if self.entities.iter().any(|e| e.id.as_u32() == id) {
            return self.fail(format!("entity {name}: duplicate entity id {id}"));
        }
        if self.entities.iter().any(|e| e.name == name) {
            return self.fail(format!("duplicate entity name {name}"));
        }
        self.entities.push(EntityModel {
            name: name.to_string(),
            id: EntityTypeId::new(id),
            properties: Vec::new(),
            relations: Vec::new(),
        });
        self
    }

    /// Adds a property to the current entity.
    #[must_use]
    pub fn property(mut self, name: &str, id: u16, ty: PropertyType, flags: PropertyFlags) -> Self {
        if self.error.is_some() {
            return self;
        }
        let problem = match self.entities.last() {
            None => Some(format!("property {name}: no entity to add it to")),
            Some(_) if id == 0 => Some(format!("property {name}: id must not be zero")),
            Some(entity) if entity.properties.iter().any(|p| p.id.as_u16() == id) => {
                Some(format!("{}.{name}: duplicate property id {id}", entity.name))
            }
            Some(entity) if entity.properties.iter().any(|p| p.name == name) => {
                Some(format!("{}: duplicate property name {name}", entity.name))
            }
            Some(_) => None,
        };
        if let Some(message) = problem {
            return self.fail(message);
        }
        if let Some(entity) = self.entities.last_mut() {
            entity.properties.push(Property {
                name: name.to_string(),
                id: PropertyId::new(id),
                ty,
                flags,
                target: None,
            });
        }
        self
    }

    /// Makes the last property a to-one relation to `target_entity_id`.
    #[must_use]
    pub fn relation_to(mut self, target_entity_id: u32) -> Self {
        if self.error.is_some() {
            return self;
        }
        let Some(property) = self
            .entities
            .last_mut()
            .and_then(|e| e.properties.last_mut())
        else {
            return self.fail("relation without a property");
        };
        if property.ty != PropertyType::Relation {
            let message = format!("property {}: relation target on a non-relation type", property.name);
            return self.fail(message);
        }
        property.target = Some(EntityTypeId::new(target_entity_id));
        self
    }

    /// Adds a standalone relation with the current entity as source.
    #[must_use]
    pub fn standalone_relation(mut self, relation_id: u32, target_entity_id: u32) -> Self {
        if self.error.is_some() {
            return self;
        }
        if relation_id == 0 {
            return self.fail("relation id must not be zero");
        }
        if self.find_relation(RelationId::new(relation_id)).is_some() {
            return self.fail(format!("duplicate relation id {relation_id}"));
        }
        let Some(entity) = self.entities.last_mut() else {
            return self.fail(format!("relation {relation_id}: no entity to add it to"));
        };
        entity.relations.push(StandaloneRelation {
            id: RelationId::new(relation_id),
            target: EntityTypeId::new(target_entity_id),
        });
        self
    }

    /// The first error encountered while building, if any.
    #[must_use]
    pub fn error(&self) -> Option<&EngineError> {
        self.error.as_ref()
    }

    /// Entity types in declaration order.
    #[must_use]
    pub fn entities(&self) -> &[EntityModel] {
        &self.entities
    }

    /// Looks up an entity type.
    #[must_use]
    pub fn find_entity(&self, id: EntityTypeId) -> Option<&EntityModel> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Looks up a standalone relation and its source entity.
    #[must_use]
    pub fn find_relation(&self, id: RelationId) -> Option<(&EntityModel, &StandaloneRelation)> {
        self.entities.iter().find_map(|entity| {
            entity
                .relations
                .iter()
                .find(|r| r.id == id)
                .map(|relation| (entity, relation))
        })
    }

    /// Checks the complete model.
    ///
    /// Returns the latched builder error first, then checks that every entity
    /// has exactly one `Long` id property, at most one time property of type
    /// `Date`, and that all relation targets exist.
    pub fn validate(&self) -> EngineResult<()> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if self.entities.is_empty() {
            return Err(EngineError::schema("model has no entities"));
        }

        let ids: HashSet<EntityTypeId> = self.entities.iter().map(|e| e.id).collect();
        for entity in &self.entities {
            let id_properties: Vec<&Property> = entity
                .properties
                .iter()
                .filter(|p| p.flags.contains(PropertyFlags::ID))
                .collect();
            match id_properties.as_slice() {
                [id] if id.ty == PropertyType::Long => {}
                [id] => {
                    return Err(EngineError::schema(format!(
                        "{}.{}: id property must be of type Long",
                        entity.name, id.name
                    )))
                }
                [] => {
                    return Err(EngineError::schema(format!(
                        "entity {} has no id property",
                        entity.name
                    )))
                }
                _ => {
                    return Err(EngineError::schema(format!(
                        "entity {} has more than one id property",
                        entity.name
                    )))
                }
            }

            let mut time_properties = entity
                .properties
                .iter()
                .filter(|p| p.flags.contains(PropertyFlags::ID_COMPANION));
            if let Some(time) = time_properties.next() {
                if time.ty != PropertyType::Date {
                    return Err(EngineError::schema(format!(
                        "{}.{}: time property must be of type Date",
                        entity.name, time.name
                    )));
                }
                if time_properties.next().is_some() {
                    return Err(EngineError::schema(format!(
                        "entity {} has more than one time property",
                        entity.name
                    )));
                }
            }

            for property in &entity.properties {
                if property.ty != PropertyType::Relation {
                    continue;
                }
                match property.target {
                    Some(target) if ids.contains(&target) => {}
                    Some(target) => {
                        return Err(EngineError::schema(format!(
                            "{}.{}: unknown relation target {target}",
                            entity.name, property.name
                        )))
                    }
                    None => {
                        return Err(EngineError::schema(format!(
                            "{}.{}: relation property without target",
                            entity.name, property.name
                        )))
                    }
                }
            }

            for relation in &entity.relations {
                if !ids.contains(&relation.target) {
                    return Err(EngineError::schema(format!(
                        "{}: relation {} has unknown target {}",
                        entity.name, relation.id, relation.target
                    )));
                }
            }
        }
        Ok(())
    }

    fn fail(mut self, message: impl Into<String>) -> Self {
        self.error = Some(EngineError::schema(message));
        self
    }
}
