//! Domain error model.

use thiserror::Error;

/// Result type used across the local (non-backend) layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Local, deterministic failure.
///
/// Raised before anything is sent to the backend (malformed form input,
/// unparseable identifiers). Backend faults have their own error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation. The message is shown to the user as-is.
    #[error("{0}")]
    Validation(String),

    /// An identifier was invalid (e.g. blank).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
