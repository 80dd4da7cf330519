//! Record writer and reader.
//!
//! Fields are addressed by slot, which is the property id from the entity
//! model. Reading a slot that was never written yields the type's default
//! (`0`, `0.0`, `false`, empty string), so records written by an older
//! model version stay readable.

use crate::buffer::EncodeBuffer;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::{Integer, Value as Cbor};

/// Slot number of a field within a record.
pub type FieldSlot = u16;

/// Builds one record into an [`EncodeBuffer`].
///
/// The buffer is cleared when the writer is created.
pub struct TableWriter<'b> {
    buffer: &'b mut EncodeBuffer,
    fields: Vec<(Cbor, Cbor)>,
}

impl<'b> TableWriter<'b> {
    /// Starts a new record, clearing the buffer.
    pub fn new(buffer: &'b mut EncodeBuffer) -> Self {
        buffer.clear();
        Self {
            buffer,
            fields: Vec::new(),
        }
    }

    /// Adds a field. Writing the same slot twice keeps the last value.
    pub fn field(&mut self, slot: FieldSlot, value: impl Into<Value>) -> &mut Self {
        let key = Cbor::Integer(Integer::from(slot));
        let value = value.into().to_cbor();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((key, value)),
        }
        self
    }

    /// Writes the record into the buffer.
    pub fn finish(self) -> CodecResult<()> {
        let mut fields = self.fields;
        fields.sort_by_key(|(k, _)| slot_of(k));
        ciborium::ser::into_writer(&Cbor::Map(fields), self.buffer.writer())
            .map_err(|e| CodecError::encoding_failed(e.to_string()))
    }
}

fn slot_of(key: &Cbor) -> Option<FieldSlot> {
    match key {
        Cbor::Integer(n) => FieldSlot::try_from(*n).ok(),
        _ => None,
    }
}

/// Read access to a decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct TableReader {
    fields: Vec<(FieldSlot, Value)>,
}

impl TableReader {
    /// Parses a record.
    pub fn parse(bytes: &[u8]) -> CodecResult<Self> {
        let cbor: Cbor = ciborium::de::from_reader(bytes)
            .map_err(|e| CodecError::decoding_failed(e.to_string()))?;

        let Cbor::Map(entries) = cbor else {
            return Err(CodecError::invalid_structure("record is not a map"));
        };

        let mut fields = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let slot = slot_of(&key)
                .ok_or_else(|| CodecError::invalid_structure("field key is not a slot number"))?;
            let value = Value::from_cbor(value).ok_or_else(|| {
                CodecError::invalid_structure(format!("field {slot}: unsupported value"))
            })?;
            fields.push((slot, value));
        }
        Ok(Self { fields })
    }

    /// Returns the raw value of a slot, if present.
    #[must_use]
    pub fn get(&self, slot: FieldSlot) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, v)| v)
    }

    /// Number of fields present in the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reads a signed integer field.
    pub fn i64(&self, slot: FieldSlot) -> CodecResult<i64> {
        match self.get(slot) {
            None | Some(Value::Null) => Ok(0),
            Some(Value::Integer(n)) => Ok(*n),
            Some(Value::Unsigned(n)) => {
                i64::try_from(*n).map_err(|_| CodecError::IntegerOverflow { slot })
            }
            Some(other) => Err(mismatch(slot, "integer", other)),
        }
    }

    /// Reads an unsigned integer field.
    pub fn u64(&self, slot: FieldSlot) -> CodecResult<u64> {
        match self.get(slot) {
            None | Some(Value::Null) => Ok(0),
            Some(Value::Unsigned(n)) => Ok(*n),
            Some(Value::Integer(n)) => {
                u64::try_from(*n).map_err(|_| CodecError::IntegerOverflow { slot })
            }
            Some(other) => Err(mismatch(slot, "integer", other)),
        }
    }

    /// Reads a 32-bit signed integer field.
    pub fn i32(&self, slot: FieldSlot) -> CodecResult<i32> {
        i32::try_from(self.i64(slot)?).map_err(|_| CodecError::IntegerOverflow { slot })
    }

    /// Reads a float field.
    pub fn f64(&self, slot: FieldSlot) -> CodecResult<f64> {
        match self.get(slot) {
            None | Some(Value::Null) => Ok(0.0),
            Some(Value::Float(f)) => Ok(*f),
            Some(other) => Err(mismatch(slot, "float", other)),
        }
    }

    /// Reads a boolean field.
    pub fn bool(&self, slot: FieldSlot) -> CodecResult<bool> {
        match self.get(slot) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(mismatch(slot, "bool", other)),
        }
    }

    /// Reads a text field.
    pub fn string(&self, slot: FieldSlot) -> CodecResult<String> {
        match self.get(slot) {
            None | Some(Value::Null) => Ok(String::new()),
            Some(Value::Text(s)) => Ok(s.clone()),
            Some(other) => Err(mismatch(slot, "text", other)),
        }
    }

    /// Reads a byte string field.
    pub fn bytes(&self, slot: FieldSlot) -> CodecResult<Vec<u8>> {
        match self.get(slot) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Bytes(b)) => Ok(b.clone()),
            Some(other) => Err(mismatch(slot, "bytes", other)),
        }
    }

    /// Reads a list of strings.
    pub fn strings(&self, slot: FieldSlot) -> CodecResult<Vec<String>> {
        match self.get(slot) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::TextList(list)) => Ok(list.clone()),
            Some(other) => Err(mismatch(slot, "text list", other)),
        }
    }
}

fn mismatch(slot: FieldSlot, expected: &'static str, found: &Value) -> CodecError {
    CodecError::TypeMismatch {
        slot,
        expected,
        found: found.type_name(),
    }
}
