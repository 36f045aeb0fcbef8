//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// None of these are worth retrying against another backend: they point at a
/// mismatch between the configured archive template and what was published.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The container (or its compression layer) could not be parsed.
    #[display("malformed archive: {_0}")]
    MalformedArchive(#[error(not(source))] String),
    /// The archive was readable but has no entry at the requested path.
    #[display("archive member not found: {_0}")]
    MemberNotFound(#[error(not(source))] String),
    /// The source name does not end in a suffix we know how to open.
    #[display("unsupported archive format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
