//! Error kinds reported by the alignment store and the depth scanner.

use thiserror::Error;

/// Errors from alignment store operations.
///
/// All errors are reported synchronously.
/// Storage errors from the SQLite container and from file I/O are converted into [`HalError::Storage`].
#[derive(Debug, Error)]
pub enum HalError {
    /// A tree node or genome with the same name already exists.
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// Unknown node, genome, sequence, or edge.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Empty required argument or an invalid combination of options.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Coordinate range outside the genome or the sequence.
    #[error("Out of range: {0}")]
    Range(String),

    /// Internal consistency has been broken.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Failure in the underlying container or in file I/O.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl HalError {
    pub(crate) fn not_found<S: Into<String>>(message: S) -> Self {
        HalError::NotFound(message.into())
    }

    pub(crate) fn invalid<S: Into<String>>(message: S) -> Self {
        HalError::InvalidArgument(message.into())
    }

    pub(crate) fn range<S: Into<String>>(message: S) -> Self {
        HalError::Range(message.into())
    }

    pub(crate) fn invariant<S: Into<String>>(message: S) -> Self {
        HalError::InvariantViolation(message.into())
    }

    pub(crate) fn storage<S: Into<String>>(message: S) -> Self {
        HalError::Storage(message.into())
    }
}

impl From<rusqlite::Error> for HalError {
    fn from(error: rusqlite::Error) -> Self {
        HalError::Storage(error.to_string())
    }
}

impl From<std::io::Error> for HalError {
    fn from(error: std::io::Error) -> Self {
        HalError::Storage(error.to_string())
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, HalError>;
