//! Lock Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A lock error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for lock operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unexpected failures of the lock protocol itself. Contention is not an
/// error: it is handled by waiting.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The lock file could not be created (other than because it exists).
    #[display("unable to create lock file: {}", _0.display())]
    Create(#[error(not(source))] PathBuf),
    /// The lock file exists but could not be inspected.
    #[display("unable to inspect lock file: {}", _0.display())]
    Inspect(#[error(not(source))] PathBuf),
    /// The lock file could not be removed.
    #[display("unable to release lock file: {}", _0.display())]
    Release(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Create(_))
    }
}
