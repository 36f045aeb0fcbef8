use crate::backend::FileSystemBackend;
use crate::config::FileSystemConfig;
use crate::error::Result;
use crate::{Binary, StorageBackend};
use std::path::PathBuf;
use tokio::fs;

/// Layout of cache entries below a cache root, one component per element.
pub const CACHE_LAYOUT: [&str; 6] = ["v1", "{tool}", "{version}", "{platform}", "{arch}", "{tool}{exe}"];

/// The local binary cache.
///
/// A filesystem backend rooted at the cache directory using
/// [`CACHE_LAYOUT`]. An entry exists if and only if a regular file exists at
/// its path; there is no index to keep in sync.
#[derive(Clone, Debug)]
pub struct LocalCache {
    backend: FileSystemBackend,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let template = CACHE_LAYOUT.iter().fold(root, |path, component| path.join(component));
        let backend = FileSystemBackend::new(FileSystemConfig {
            common: Default::default(),
            path_template: template.to_string_lossy().into_owned(),
        });
        Self { backend }
    }

    /// Cache location of `binary`. No I/O.
    pub fn path(&self, binary: &Binary) -> PathBuf {
        self.backend.path(binary)
    }

    /// Whether a regular file is present at [`path`](Self::path).
    pub async fn contains(&self, binary: &Binary) -> Result<bool> {
        let path = self.path(binary);
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FileSystemBackend::map_io_error(e, &path).into()),
        }
    }

    /// Atomically publish `content`; never overwrites an existing entry.
    pub async fn store(&self, binary: &Binary, content: &[u8]) -> Result<()> {
        self.backend.store(binary, content).await
    }
}
