//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use toolpin_archive::error::{Error as ArchiveError, ErrorKind as ArchiveErrorKind};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing to fetch at the resolved locator.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Store collision; cache entries are immutable once written.
    #[display("already exists: {_0}")]
    AlreadyExists(#[error(not(source))] String),
    /// Access denied (filesystem permissions).
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// Local filesystem failure other than the above.
    #[display("I/O error: {_0}")]
    Io(#[error(not(source))] String),
    /// Network or remote API failure.
    #[display("transport error: {_0}")]
    Transport(#[error(not(source))] String),
    /// An HTTP endpoint answered with a non-success status.
    #[display("unexpected HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },
    /// Write attempted on a read-only backend.
    #[display("unsupported operation: {_0}")]
    Unsupported(#[error(not(source))] String),
    /// Zero or multiple backend shapes, or a required field is missing.
    #[display("invalid backend configuration: {_0}")]
    InvalidConfig(#[error(not(source))] String),
    /// The fetched object could not be unpacked.
    #[display("archive error: {_0}")]
    Archive(ArchiveErrorKind),
}

impl ErrorKind {
    /// Convert an archive error into a storage error, preserving the archive
    /// crate's `Exn` frame (error tree) as a child in its own error tree.
    #[track_caller]
    pub fn archive(err: ArchiveError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Archive(inner))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(_) | Self::Transport(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Archive(kind) => kind.is_retryable(),
            _ => false,
        }
    }
}
