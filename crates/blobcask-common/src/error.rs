//! Error types for blobcask
//!
//! This module defines the common error type used throughout the
//! storage stack. Errors are tagged values: every layer either
//! propagates them unchanged or remaps them according to its contract.

use thiserror::Error;

/// Common result type for blobcask operations
pub type Result<T> = std::result::Result<T, Error>;

/// A single precondition violation attached to a
/// [`Error::FailedPrecondition`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Violation kind, e.g. `"MISSING"`.
    pub kind: String,
    /// The subject the violation applies to, e.g. `"blobs/<hash>/<size>"`.
    pub subject: String,
}

/// Common error type for blobcask
#[derive(Debug, Error)]
pub enum Error {
    #[error("blob not found")]
    NotFound,

    #[error("failed precondition: {message}")]
    FailedPrecondition {
        message: String,
        violations: Vec<Violation>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a new invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a new unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Check if this is a retryable error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// The wire-level status code this error maps to.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::FailedPrecondition { .. } => "FAILED_PRECONDITION",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Internal(_) | Self::Io(_) => "INTERNAL",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Cancelled => "CANCELLED",
            Self::Configuration(_) => "FAILED_PRECONDITION",
        }
    }

    /// Wrap this error into an `std::io::Error` so it can travel
    /// through an `std::io::Read` boundary without losing its kind.
    /// [`Error::from_io`] on the other side recovers it losslessly.
    #[must_use]
    pub fn into_io(self) -> std::io::Error {
        std::io::Error::other(self)
    }

    /// Recover an error that crossed an `std::io::Read` boundary.
    /// Plain I/O errors are wrapped as [`Error::Io`].
    #[must_use]
    pub fn from_io(err: std::io::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(err) => err,
            Err(err) => Self::Io(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err)
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        err.into_io()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        assert!(Error::NotFound.is_not_found());
        assert!(!Error::internal("x").is_not_found());
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::unavailable("all shards drained").is_retryable());
        assert!(!Error::NotFound.is_retryable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::NotFound.code(), "NOT_FOUND");
        assert_eq!(Error::invalid_argument("x").code(), "INVALID_ARGUMENT");
        assert_eq!(Error::internal("x").code(), "INTERNAL");
        assert_eq!(Error::Cancelled.code(), "CANCELLED");
    }

    #[test]
    fn test_io_round_trip() {
        let io_err = Error::invalid_argument("bad digest").into_io();
        match Error::from_io(io_err) {
            Error::InvalidArgument(msg) => assert_eq!(msg, "bad digest"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_io_plain_error_wrapped() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(Error::from_io(io_err), Error::Io(_)));
    }
}
