//! # BoxDB Engine
//!
//! The boundary between BoxDB's resource-management layer and the storage
//! engine that actually persists objects.
//!
//! The engine is reached only through the opaque, handle-based [`Engine`]
//! trait: transactions and cursors are plain handles, object payloads are
//! raw record bytes, and id lists come back as engine-owned [`IdArray`]s that
//! must be handed back through [`Engine::free_id_array`].
//!
//! ## Available Engines
//!
//! - [`MemoryEngine`] - in-process engine with snapshot isolation, used for
//!   tests, demos and ephemeral stores
//!
//! ## Example
//!
//! ```rust
//! use boxdb_engine::{Engine, EngineOptions, MemoryEngine, Model, PropertyFlags, PropertyType, TxMode};
//!
//! let model = Model::new()
//!     .entity("Note", 1)
//!     .property("id", 1, PropertyType::Long, PropertyFlags::ID)
//!     .property("text", 2, PropertyType::String, PropertyFlags::NONE);
//! let engine = MemoryEngine::open(model, EngineOptions::default()).unwrap();
//!
//! let txn = engine.txn_begin(TxMode::Read).unwrap();
//! engine.txn_close(txn).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod id_array;
mod memory;
mod model;
mod types;

pub use config::EngineOptions;
pub use engine::Engine;
pub use error::{clear_last_error, last_error, set_last_error, EngineError, EngineResult, ErrorCode};
pub use id_array::IdArray;
pub use memory::MemoryEngine;
pub use model::{EntityModel, Model, Property, PropertyFlags, PropertyType, StandaloneRelation};
pub use types::{
    CursorHandle, EntityTypeId, ObjectId, PropertyId, PutMode, RelationId, TimeSeriesMinMax,
    TxMode, TxnHandle, ID_NEW,
};
