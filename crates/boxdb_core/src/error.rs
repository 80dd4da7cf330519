//! Error types for BoxDB core.

use boxdb_engine::{EngineError, ErrorCode};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in BoxDB core operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A caller-supplied precondition was violated.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
        /// Code reported by the validator, if any.
        code: Option<ErrorCode>,
    },

    /// An object was used in a state that does not allow the operation.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the problem.
        message: String,
    },

    /// The engine refused or failed an operation.
    #[error("engine error {code}: {message}")]
    Engine {
        /// Engine error code.
        code: ErrorCode,
        /// Engine diagnostic.
        message: String,
    },

    /// The addressed object does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Engine diagnostic.
        message: String,
    },

    /// Record encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] boxdb_codec::CodecError),
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            code: None,
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// The engine or validator code attached to this error, if any.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::InvalidArgument { code, .. } => *code,
            Self::Engine { code, .. } => Some(*code),
            Self::NotFound { .. } => Some(ErrorCode::NotFound),
            Self::InvalidState { .. } | Self::Codec(_) => None,
        }
    }

    /// Returns true for [`CoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<EngineError> for CoreError {
    fn from(error: EngineError) -> Self {
        match error.code {
            ErrorCode::NotFound => Self::NotFound {
                message: error.message,
            },
            code => Self::Engine {
                code,
                message: error.message,
            },
        }
    }
}
