//! Error types for the warcstore repository
//!
//! All public repository APIs return [`Result`], whose error type is the
//! unified [`RepositoryError`]. Lower layers (codec, pool, configuration)
//! define their own small error enums and convert into `RepositoryError`
//! at the boundary where path/offset context is known.
//!
//! ## Error Classification
//!
//! - `InvalidArgument`: malformed identifier, bad storage URL, negative
//!   size. Requires input changes to resolve.
//! - `NotFound`: referenced artifact or storage URL does not resolve.
//! - `AlreadyCommitted`: soft, non-fatal; commit is idempotent.
//! - `MalformedRecord`: WARC framing broken. Rebuild reports these per
//!   file and truncates a torn tail at end-of-file.
//! - `Io`: underlying storage failure; propagated, caller decides retry.
//! - `IllegalState`: an operation was invoked before its prerequisites
//!   (e.g. reload with no index set).
//! - `StreamAlreadyConsumed`: an artifact payload was read twice.

use std::io;
use thiserror::Error;

/// Result type alias for repository operations
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Unified error type for all repository operations
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// I/O error from the underlying storage
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Null or malformed input: identifier, storage URL, size
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced artifact or storage URL does not resolve
    #[error("not found: {0}")]
    NotFound(String),

    /// The artifact was already committed; the operation is a no-op
    #[error("artifact already committed: {0}")]
    AlreadyCommitted(String),

    /// WARC record framing is broken
    #[error("malformed WARC record at {location}: {reason}")]
    MalformedRecord {
        /// File path and offset of the broken record
        location: String,
        /// What was wrong with the framing
        reason: String,
    },

    /// Operation invoked in a state that does not permit it
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The artifact payload stream was consumed more than once
    #[error("payload stream already consumed")]
    StreamAlreadyConsumed,
}

impl RepositoryError {
    /// Create an `InvalidArgument` error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        RepositoryError::InvalidArgument(message.into())
    }

    /// Create a `NotFound` error
    pub fn not_found(what: impl Into<String>) -> Self {
        RepositoryError::NotFound(what.into())
    }

    /// Create an `IllegalState` error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        RepositoryError::IllegalState(message.into())
    }

    /// Create a `MalformedRecord` error
    pub fn malformed_record(location: impl Into<String>, reason: impl Into<String>) -> Self {
        RepositoryError::MalformedRecord {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }

    /// Check if this is a validation error that retrying cannot fix
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, RepositoryError::InvalidArgument(_))
    }

    /// Check if this error indicates broken on-disk framing
    pub fn is_malformed(&self) -> bool {
        matches!(self, RepositoryError::MalformedRecord { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_io() {
        let err = RepositoryError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_display_malformed_record() {
        let err = RepositoryError::malformed_record("/tmp/a.warc:120", "missing Content-Length");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/a.warc:120"));
        assert!(msg.contains("missing Content-Length"));
    }

    #[test]
    fn test_classification() {
        assert!(RepositoryError::not_found("artifact xyz").is_not_found());
        assert!(RepositoryError::invalid_argument("bad url").is_invalid_argument());
        assert!(RepositoryError::malformed_record("f:0", "r").is_malformed());
        assert!(!RepositoryError::illegal_state("no index").is_not_found());
    }

    #[test]
    fn test_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: RepositoryError = io_err.into();
        assert!(matches!(err, RepositoryError::Io(_)));
    }
}
