//! Error types for control-plane calls.

use thiserror::Error;

/// Result type alias for control-plane calls.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors returned by a cloud backend.
///
/// "Already exists" and "not found" are not errors here; those come back
/// as [`CreateOutcome`](crate::CreateOutcome) / [`DeleteOutcome`](crate::DeleteOutcome).
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("{operation} rejected: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} returned a malformed response: {message}")]
    Malformed {
        operation: &'static str,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl CloudError {
    pub fn rejected(operation: &'static str, message: impl Into<String>) -> Self {
        CloudError::Rejected {
            operation,
            message: message.into(),
        }
    }
}
