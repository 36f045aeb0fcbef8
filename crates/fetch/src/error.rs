//! Fetch Error Types
//!
//! Failures from the storage, lock and configuration crates are wrapped with
//! their kind preserved, so callers can still match on the underlying
//! category (`ErrorKind::Backend(StorageErrorKind::NotFound(..))`).

use derive_more::{Display, Error};
use std::fmt;
use toolpin_config::error::{Error as ConfigError, ErrorKind as ConfigErrorKind};
use toolpin_lock::error::{Error as LockError, ErrorKind as LockErrorKind};
use toolpin_storage::Binary;
use toolpin_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};

/// A fetch error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Neither a remote cache nor an origin source is configured.
    #[display("no backends configured for {_0}")]
    NoBackends(#[error(not(source))] String),
    /// The last backend in the chain failed (or connecting to one did).
    #[display("backend error: {_0}")]
    Backend(StorageErrorKind),
    /// The local cache could not be read or written.
    #[display("local cache error: {_0}")]
    Cache(StorageErrorKind),
    #[display("download lock error: {_0}")]
    Lock(LockErrorKind),
    #[display("configuration error: {_0}")]
    Config(ConfigErrorKind),
    /// One or more binaries of a batch could not be resolved.
    #[display("{_0}")]
    Batch(#[error(not(source))] Failures),
}

impl ErrorKind {
    #[track_caller]
    pub fn backend(err: StorageError) -> Error {
        let kind = (*err).clone();
        err.raise(ErrorKind::Backend(kind))
    }

    #[track_caller]
    pub fn cache(err: StorageError) -> Error {
        let kind = (*err).clone();
        err.raise(ErrorKind::Cache(kind))
    }

    #[track_caller]
    pub fn lock(err: LockError) -> Error {
        let kind = (*err).clone();
        err.raise(ErrorKind::Lock(kind))
    }

    #[track_caller]
    pub fn config(err: ConfigError) -> Error {
        let kind = (*err).clone();
        err.raise(ErrorKind::Config(kind))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend(kind) | Self::Cache(kind) => kind.is_retryable(),
            Self::Lock(kind) => kind.is_retryable(),
            Self::Batch(failures) => failures.0.iter().all(|(_, kind)| kind.is_retryable()),
            Self::NoBackends(_) | Self::Config(_) => false,
        }
    }
}

/// Every binary of a batch that failed, with its cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failures(pub Vec<(Binary, ErrorKind)>);

impl fmt::Display for Failures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to fetch {} binaries", self.0.len())?;
        for (binary, kind) in &self.0 {
            write!(f, "\n  {binary}: {kind}")?;
        }
        Ok(())
    }
}
