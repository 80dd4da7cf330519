//! Field values stored in records.

use ciborium::value::{Integer, Value as Cbor};

/// A single field value of a record.
///
/// Floats are allowed (time series payloads are mostly doubles). Unsigned
/// values that fit into `i64` decode back as [`Value::Integer`]; the typed
/// accessors of [`crate::TableReader`] accept either representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Unsigned integer above `i64::MAX`, or an explicitly unsigned value.
    Unsigned(u64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// List of strings.
    TextList(Vec<String>),
}

impl Value {
    /// Returns the name of the value's type, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) | Value::Unsigned(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::TextList(_) => "text list",
        }
    }

    pub(crate) fn to_cbor(&self) -> Cbor {
        match self {
            Value::Null => Cbor::Null,
            Value::Bool(b) => Cbor::Bool(*b),
            Value::Integer(n) => Cbor::Integer(Integer::from(*n)),
            Value::Unsigned(n) => Cbor::Integer(Integer::from(*n)),
            Value::Float(f) => Cbor::Float(*f),
            Value::Text(s) => Cbor::Text(s.clone()),
            Value::Bytes(b) => Cbor::Bytes(b.clone()),
            Value::TextList(list) => {
                Cbor::Array(list.iter().map(|s| Cbor::Text(s.clone())).collect())
            }
        }
    }

    pub(crate) fn from_cbor(cbor: Cbor) -> Option<Self> {
        Some(match cbor {
            Cbor::Null => Value::Null,
            Cbor::Bool(b) => Value::Bool(b),
            Cbor::Integer(n) => match i64::try_from(n) {
                Ok(v) => Value::Integer(v),
                Err(_) => Value::Unsigned(u64::try_from(n).ok()?),
            },
            Cbor::Float(f) => Value::Float(f),
            Cbor::Text(s) => Value::Text(s),
            Cbor::Bytes(b) => Value::Bytes(b),
            Cbor::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Cbor::Text(s) => list.push(s),
                        _ => return None,
                    }
                }
                Value::TextList(list)
            }
            _ => return None,
        })
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Unsigned(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::TextList(v)
    }
}
