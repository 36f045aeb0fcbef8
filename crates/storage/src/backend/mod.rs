//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a uniform
//! fetch/store interface over every place a binary can come from: the local
//! filesystem, S3 and GCS buckets, plain HTTPS endpoints and GitHub releases.
//!

mod filesystem;
#[cfg(feature = "gcs")]
mod gcs;
mod github;
mod https;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::filesystem::FileSystemBackend;
#[cfg(feature = "gcs")]
pub use self::gcs::GcsBackend;
pub use self::github::GitHubBackend;
pub use self::https::HttpsBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::config::Source;
use crate::error::Result;
use crate::{BackendHandle, Binary};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for existence/metadata probes against remote stores.
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(60);
/// Upper bound for a whole HTTP download, body included.
pub(crate) const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const USER_AGENT: &str = concat!("toolpin/", env!("CARGO_PKG_VERSION"));

/// Unified interface for storage backends.
///
/// Every backend resolves its own locator template against the requested
/// [`Binary`], and every `fetch` passes the retrieved bytes through the
/// archive extractor, so callers always receive the raw executable.
///
/// # Examples
///
/// ```
/// use toolpin_storage::{Binary, backend::StorageBackend, error::{ErrorKind, Result}};
///
/// async fn fetch_if_present(backend: &dyn StorageBackend, binary: &Binary) -> Result<Option<Vec<u8>>> {
///     match backend.fetch(binary).await {
///         Ok(content) => Ok(Some(content)),
///         Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => Ok(None),
///         Err(err) => Err(err),
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Human-readable description of where this backend looks (used for
    /// logging and diagnostics only).
    fn describe(&self) -> &str;

    /// Retrieve the binary's content.
    async fn fetch(&self, binary: &Binary) -> Result<Vec<u8>>;

    /// Store content for a binary. Fails with
    /// [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists) if anything
    /// is already present: stored binaries are immutable.
    async fn store(&self, binary: &Binary, content: &[u8]) -> Result<()>;
}

/// Construct the backend for a validated source.
///
/// Bucket backends pick up credentials from the ambient environment, which is
/// why construction is asynchronous.
pub async fn connect(source: &Source) -> Result<BackendHandle> {
    let handle: BackendHandle = match source {
        Source::FileSystem(config) => Arc::new(FileSystemBackend::new(config.clone())),
        Source::Https(config) => Arc::new(HttpsBackend::new(config.clone())?),
        Source::GitHub(config) => Arc::new(GitHubBackend::new(config.clone())?),
        #[cfg(feature = "gcs")]
        Source::Gcs(config) => Arc::new(GcsBackend::connect(config.clone()).await?),
        #[cfg(not(feature = "gcs"))]
        Source::Gcs(_) => exn::bail!(crate::error::ErrorKind::InvalidConfig("gcs backend disabled".into())),
        #[cfg(feature = "s3")]
        Source::S3(config) => Arc::new(S3Backend::connect(config.clone()).await?),
        #[cfg(not(feature = "s3"))]
        Source::S3(_) => exn::bail!(crate::error::ErrorKind::InvalidConfig("s3 backend disabled".into())),
    };
    tracing::debug!(backend = handle.describe(), "Configured storage backend");
    Ok(handle)
}
