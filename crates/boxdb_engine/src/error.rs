//! Engine error codes and the per-thread last error.

use std::cell::RefCell;
use std::fmt;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Stable numeric error codes reported by engines.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The requested object, link or position does not exist.
    NotFound = 404,
    /// The call is not allowed in the current state (closed handle, wrong thread...).
    IllegalState = 10001,
    /// An argument was rejected.
    IllegalArgument = 10002,
    /// Unspecified engine failure.
    General = 10098,
    /// The configured maximum database size would be exceeded.
    DbFull = 10101,
    /// Too many concurrent read transactions.
    MaxReadersExceeded = 10102,
    /// A write was attempted through a read transaction.
    ReadOnly = 10104,
    /// A commit could not be completed.
    CommitFailed = 10199,
    /// The stored value does not match the declared property type.
    PropertyTypeMismatch = 10203,
    /// An insert used an id that already exists.
    IdAlreadyExists = 10210,
    /// Time series operation on an entity without a time property.
    TimeSeries = 10212,
    /// The schema descriptor is invalid.
    Schema = 10501,
    /// An entity, property or relation is not part of the schema.
    SchemaObjectNotFound = 10503,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Maps a numeric code back to a known code; unknown codes map to `General`.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            404 => Self::NotFound,
            10001 => Self::IllegalState,
            10002 => Self::IllegalArgument,
            10101 => Self::DbFull,
            10102 => Self::MaxReadersExceeded,
            10104 => Self::ReadOnly,
            10199 => Self::CommitFailed,
            10203 => Self::PropertyTypeMismatch,
            10210 => Self::IdAlreadyExists,
            10212 => Self::TimeSeries,
            10501 => Self::Schema,
            10503 => Self::SchemaObjectNotFound,
            _ => Self::General,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A failure reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct EngineError {
    /// The error code.
    pub code: ErrorCode,
    /// Human readable diagnostic.
    pub message: String,
}

impl EngineError {
    /// Creates an engine error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a not-found outcome.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IllegalState, message)
    }

    /// Creates an illegal argument error.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IllegalArgument, message)
    }

    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Schema, message)
    }

    /// Returns true for the not-found outcome.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::NotFound
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<EngineError>> = const { RefCell::new(None) };
}

/// Records the last error of the current thread.
pub fn set_last_error(error: &EngineError) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some(error.clone());
    });
}

/// Clears the last error of the current thread.
pub fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Returns the last error recorded on the current thread.
#[must_use]
pub fn last_error() -> Option<EngineError> {
    LAST_ERROR.with(|e| e.borrow().clone())
}
