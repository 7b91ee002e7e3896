//! Error types for cagra.

use crate::precision::NumericType;
use thiserror::Error;

/// Errors that can occur while building, searching, migrating or decoding an index.
#[derive(Debug, Error)]
pub enum CagraError {
    /// Unsupported or internally inconsistent build/context configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid per-call argument (k out of range, empty batch, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Vector dimension disagrees with the index dimension.
    #[error("dimension mismatch: index has {expected} dimensions, input has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Numeric representation of the input disagrees with the stored vectors.
    #[error("numeric representation mismatch: index stores {expected}, input is {actual}")]
    NumericMismatch {
        expected: NumericType,
        actual: NumericType,
    },

    /// A memory pool could not satisfy a reservation.
    #[error("insufficient memory: requested {requested} bytes, {available} available")]
    InsufficientMemory { requested: usize, available: usize },

    /// Corrupt, truncated or foreign-version serialized index.
    #[error("malformed index: {0}")]
    MalformedIndex(String),

    /// The execution context was cancelled while the call was in flight.
    #[error("operation cancelled: execution context released")]
    Cancelled,

    /// I/O error while reading or writing a serialized index.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classification.
///
/// `NumericMismatch` is reported as [`ErrorKind::DimensionMismatch`]: both
/// mean the input does not have the shape the index was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidConfig,
    InvalidArgument,
    DimensionMismatch,
    InsufficientMemory,
    MalformedIndex,
    Cancelled,
    Io,
}

impl CagraError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CagraError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            CagraError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CagraError::DimensionMismatch { .. } | CagraError::NumericMismatch { .. } => {
                ErrorKind::DimensionMismatch
            }
            CagraError::InsufficientMemory { .. } => ErrorKind::InsufficientMemory,
            CagraError::MalformedIndex(_) => ErrorKind::MalformedIndex,
            CagraError::Cancelled => ErrorKind::Cancelled,
            CagraError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        CagraError::InvalidConfig(msg.into())
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        CagraError::MalformedIndex(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CagraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_mismatch_is_dimension_class() {
        let err = CagraError::NumericMismatch {
            expected: NumericType::Float16,
            actual: NumericType::Float32,
        };
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert!(err.to_string().contains("f16"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: CagraError = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
