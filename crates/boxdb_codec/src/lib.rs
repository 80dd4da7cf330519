//! # BoxDB Codec
//!
//! The record format shared by the BoxDB engine and entity bindings.
//!
//! A record is a CBOR map from field slot (the property id of the entity
//! model) to a field [`Value`]. The object identifier is never part of the
//! record; the engine keys records by id.
//!
//! This crate provides:
//! - [`TableWriter`] / [`TableReader`] for building and reading records
//! - [`EncodeBuffer`], the reusable serialization buffer
//! - [`BufferPool`], a pool of encode buffers shared by all boxes of a store
//!
//! ## Usage
//!
//! ```
//! use boxdb_codec::{EncodeBuffer, TableReader, TableWriter};
//!
//! let mut buffer = EncodeBuffer::new();
//! let mut writer = TableWriter::new(&mut buffer);
//! writer.field(2, 42i64).field(3, "green");
//! writer.finish().unwrap();
//!
//! let reader = TableReader::parse(buffer.as_bytes()).unwrap();
//! assert_eq!(reader.i64(2).unwrap(), 42);
//! assert_eq!(reader.string(3).unwrap(), "green");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod error;
mod table;
mod value;

pub use buffer::{BufferPool, EncodeBuffer, PooledBuffer, BUFFER_RETAIN_LIMIT};
pub use error::{CodecError, CodecResult};
pub use table::{FieldSlot, TableReader, TableWriter};
pub use value::Value;
