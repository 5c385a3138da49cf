//! Error types for the LSH engine.
//!
//! Every fallible operation returns [`LshError`], a code plus a message.
//! The code decides whether a failure is local to one record or fatal to
//! the whole job.

use std::fmt;
use thiserror::Error;

/// Error codes for LSH operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Persisted artifact does not match the expected shape or version.
    ConfigMismatch,
    /// Malformed input record.
    ParseError,
    /// Fewer candidates survived filtering than neighbors were requested.
    InsufficientCandidates,
    /// Vector, hash family, or signature disagree on dimensionality.
    DimensionMismatch,
    /// Invalid argument or configuration value.
    InvalidArgument,
    /// Job was aborted between stages.
    Cancelled,
    /// Underlying I/O failure.
    Io,
    /// Internal invariant violated.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::ConfigMismatch => write!(f, "CONFIG_MISMATCH"),
            ErrorCode::ParseError => write!(f, "PARSE_ERROR"),
            ErrorCode::InsufficientCandidates => write!(f, "INSUFFICIENT_CANDIDATES"),
            ErrorCode::DimensionMismatch => write!(f, "DIMENSION_MISMATCH"),
            ErrorCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            ErrorCode::Cancelled => write!(f, "CANCELLED"),
            ErrorCode::Io => write!(f, "IO"),
            ErrorCode::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Main error type for LSH operations.
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct LshError {
    code: ErrorCode,
    message: String,
}

impl LshError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this error invalidates the whole job rather than one record.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.code,
            ErrorCode::ParseError | ErrorCode::InsufficientCandidates | ErrorCode::InvalidArgument
        )
    }

    // Convenience constructors

    /// Create a config mismatch error.
    pub fn config_mismatch(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigMismatch, msg)
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, msg)
    }

    /// Create an insufficient candidates error.
    pub fn insufficient_candidates(requested: usize, available: usize) -> Self {
        Self::new(
            ErrorCode::InsufficientCandidates,
            format!("requested {requested} neighbors but only {available} candidates survived"),
        )
    }

    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::new(
            ErrorCode::DimensionMismatch,
            format!("expected dimension {expected}, got {actual}"),
        )
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, msg)
    }

    /// Create a cancellation error.
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Cancelled, msg)
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    /// Prefix the message with record context, keeping the code.
    pub fn at_record(self, ordinal: usize) -> Self {
        Self {
            code: self.code,
            message: format!("record {ordinal}: {}", self.message),
        }
    }
}

impl From<std::io::Error> for LshError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, err.to_string())
    }
}

impl From<serde_json::Error> for LshError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::ConfigMismatch, format!("artifact decode failed: {err}"))
    }
}

/// Result type alias for LSH operations.
pub type Result<T> = std::result::Result<T, LshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LshError::parse("bad token");
        assert_eq!(err.code(), ErrorCode::ParseError);
        assert_eq!(err.message(), "bad token");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = LshError::dimension_mismatch(4, 3);
        let display = format!("{}", err);
        assert!(display.contains("DIMENSION_MISMATCH"));
        assert!(display.contains("expected dimension 4"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_at_record_keeps_code() {
        let err = LshError::parse("missing ':'").at_record(7);
        assert_eq!(err.code(), ErrorCode::ParseError);
        assert_eq!(err.message(), "record 7: missing ':'");
    }

    #[test]
    fn test_serde_error_is_config_mismatch() {
        let err: LshError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert_eq!(err.code(), ErrorCode::ConfigMismatch);
        assert!(err.is_fatal());
    }
}
