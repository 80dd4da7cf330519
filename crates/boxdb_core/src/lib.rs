//! # BoxDB Core
//!
//! Typed object storage on top of a handle-based engine.
//!
//! This crate provides:
//! - [`Store`] - owner of the engine connection
//! - [`Transaction`] - scoped read or write transactions
//! - [`EntityBox`] - CRUD, batch and relation operations for one entity type
//! - [`Entity`] - the binding contract implemented per entity type
//!
//! ## Guarantees
//!
//! - Transactions and cursors are closed exactly once on every path
//! - Batch puts are atomic; ids are written back only after commit
//! - Engine id arrays are always handed back to the engine
//! - "Not found" becomes `None`, `false` or a hole, never an error
//!
//! ## Example
//!
//! ```rust
//! use boxdb_core::{
//!     CoreResult, EncodeBuffer, Entity, EntityBox, EntityTypeId, Model, ObjectId, Options,
//!     PropertyFlags, PropertyType, Store, TableReader, TableWriter,
//! };
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Note {
//!     id: ObjectId,
//!     text: String,
//! }
//!
//! impl Entity for Note {
//!     const ENTITY_TYPE_ID: EntityTypeId = EntityTypeId::new(1);
//!
//!     fn id(&self) -> ObjectId {
//!         self.id
//!     }
//!
//!     fn set_id(&mut self, id: ObjectId) {
//!         self.id = id;
//!     }
//!
//!     fn encode(&self, buffer: &mut EncodeBuffer) -> CoreResult<()> {
//!         let mut writer = TableWriter::new(buffer);
//!         writer.field(1, self.id).field(2, self.text.as_str());
//!         Ok(writer.finish()?)
//!     }
//!
//!     fn decode(id: ObjectId, bytes: &[u8]) -> CoreResult<Self> {
//!         let record = TableReader::parse(bytes)?;
//!         Ok(Note { id, text: record.string(2)? })
//!     }
//! }
//!
//! let model = Model::new()
//!     .entity("Note", 1)
//!     .property("id", 1, PropertyType::Long, PropertyFlags::ID)
//!     .property("text", 2, PropertyType::String, PropertyFlags::NONE);
//! let store = Store::open(Options::new().model(model)).unwrap();
//!
//! let notes: EntityBox<'_, Note> = EntityBox::new(&store).unwrap();
//! let mut note = Note { id: 0, text: "hello".into() };
//! let id = notes.put(&mut note).unwrap();
//! assert_eq!(note.id, id);
//! assert_eq!(notes.get(id).unwrap(), Some(note));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod entity;
mod entity_box;
mod error;
mod store;
mod transaction;

pub use config::Options;
pub use entity::{Entity, ToMany, ToOne};
pub use entity_box::EntityBox;
pub use error::{CoreError, CoreResult};
pub use store::Store;
pub use transaction::Transaction;

// Re-export the types needed to describe models and write entity bindings.
pub use boxdb_codec::{CodecError, EncodeBuffer, TableReader, TableWriter};
pub use boxdb_engine::{
    Engine, EngineError, EntityTypeId, ErrorCode, MemoryEngine, Model, ObjectId, PropertyFlags,
    PropertyId, PropertyType, PutMode, RelationId, TimeSeriesMinMax, TxMode, ID_NEW,
};
