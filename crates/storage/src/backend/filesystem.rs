//! Local filesystem storage backend.
//!
//! This module provides a storage backend implementation for the local
//! filesystem. Reads go through `tokio::fs`; writes land in a temporary file
//! next to the target which is then atomically renamed into place, so readers
//! never observe a partially-written binary.

use crate::config::FileSystemConfig;
use crate::error::{ErrorKind, Result};
use crate::{Binary, StorageBackend};
use async_trait::async_trait;
use exn::ResultExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::instrument;

/// Local filesystem storage backend.
///
/// The configured template resolves to a path on disk. That path may point
/// at an archive, in which case the common `archive_path_template` is used to
/// pull the binary out of it.
///
/// # Examples
///
/// ```no_run
/// use toolpin_storage::backend::FileSystemBackend;
/// use toolpin_storage::config::FileSystemConfig;
/// use toolpin_storage::{Arch, Binary, Platform};
///
/// let backend = FileSystemBackend::new(FileSystemConfig {
///     common: Default::default(),
///     path_template: "/opt/tools/{tool}/{version}/{platform}/{arch}/{tool}{exe}".into(),
/// });
/// let binary = Binary::new("jq", "1.7.1", Platform::Linux, Arch::X86_64);
/// assert_eq!(backend.path(&binary).to_str(), Some("/opt/tools/jq/1.7.1/linux/x86_64/jq"));
/// ```
#[derive(Clone, Debug)]
pub struct FileSystemBackend {
    config: FileSystemConfig,
}

impl FileSystemBackend {
    pub fn new(config: FileSystemConfig) -> Self {
        Self { config }
    }

    /// Where this backend keeps `binary`. Pure template resolution, no I/O.
    pub fn path(&self, binary: &Binary) -> PathBuf {
        PathBuf::from(self.config.common.resolve(binary, &self.config.path_template))
    }

    pub(crate) fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        let path = path.display().to_string();
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path),
            std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists(path),
            _ => ErrorKind::Io(format!("{path}: {e}")),
        }
    }
}

/// Write `content` to a uniquely-named sibling of `target`, mark it
/// executable, then rename it over `target` unless something got there first.
fn write_atomically(target: &Path, content: &[u8]) -> Result<()> {
    let dir = target.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| FileSystemBackend::map_io_error(e, dir))?;
    tmp.write_all(content).map_err(|e| FileSystemBackend::map_io_error(e, tmp.path()))?;
    tmp.as_file().sync_all().map_err(|e| FileSystemBackend::map_io_error(e, tmp.path()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o755))
            .map_err(|e| FileSystemBackend::map_io_error(e, tmp.path()))?;
    }
    // The temporary file is removed on drop if the rename fails.
    tmp.persist_noclobber(target)
        .map_err(|e| FileSystemBackend::map_io_error(e.error, target))?;
    Ok(())
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    fn describe(&self) -> &str {
        &self.config.path_template
    }

    #[instrument(skip(self), fields(backend = self.describe(), binary = %binary))]
    async fn fetch(&self, binary: &Binary) -> Result<Vec<u8>> {
        let path = self.path(binary);
        let raw = fs::read(&path).await.map_err(|e| Self::map_io_error(e, &path))?;
        self.config.common.extract(raw, &path.to_string_lossy(), binary)
    }

    #[instrument(skip(self, content), fields(backend = self.describe(), binary = %binary, size = content.len()))]
    async fn store(&self, binary: &Binary, content: &[u8]) -> Result<()> {
        let target = self.path(binary);
        if fs::try_exists(&target).await.map_err(|e| Self::map_io_error(e, &target))? {
            exn::bail!(ErrorKind::AlreadyExists(target.display().to_string()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, parent))?;
        }
        let content = content.to_vec();
        let written = target.clone();
        tokio::task::spawn_blocking(move || write_atomically(&written, &content))
            .await
            .or_raise(|| ErrorKind::Io(format!("{}: write task failed", target.display())))??;
        tracing::debug!(path = %target.display(), "Stored binary");
        Ok(())
    }
}
