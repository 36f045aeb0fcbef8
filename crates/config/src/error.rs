//! Configuration Error Types

use derive_more::{Display, Error};
use toolpin_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The settings document could not be read or deserialized.
    #[display("unable to load settings: {_0}")]
    Load(#[error(not(source))] String),
    /// Neither `cache_dir` nor a platform cache directory is available.
    #[display("no cache directory configured and none could be determined for this platform")]
    NoCacheDir,
    #[display("invalid remote cache configuration: {_0}")]
    RemoteCache(#[error(not(source))] String),
    /// A tool's origin source failed validation.
    #[display("invalid source for tool `{tool}`: {kind}")]
    Source { tool: String, kind: StorageErrorKind },
}

impl ErrorKind {
    /// Wrap a source validation error, keeping the storage frame as a child.
    #[track_caller]
    pub fn invalid_source(tool: &str, err: StorageError) -> Error {
        let kind = (*err).clone();
        err.raise(ErrorKind::Source { tool: tool.to_string(), kind })
    }
}
