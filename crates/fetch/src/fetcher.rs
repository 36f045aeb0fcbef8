use crate::error::{ErrorKind, Failures, Result};
use std::path::PathBuf;
use tokio::fs;
use toolpin_lock::DownloadLock;
use toolpin_storage::error::ErrorKind as StorageErrorKind;
use toolpin_storage::{BackendHandle, Binary, LocalCache};
use tracing::instrument;

/// Resolves binaries into the local cache.
///
/// Backends are tried in a fixed order, the shared remote cache first and the
/// tool's origin source second, stopping at the first that has the binary.
/// Population of a cache entry is serialized across processes by a
/// [`DownloadLock`] on the entry's path.
pub struct Fetcher {
    cache: LocalCache,
    remote: Option<BackendHandle>,
    origin: Option<BackendHandle>,
    lock: DownloadLock,
}

impl Fetcher {
    pub fn new(cache: LocalCache, remote: Option<BackendHandle>, origin: Option<BackendHandle>) -> Self {
        Self {
            cache,
            remote,
            origin,
            lock: DownloadLock::default(),
        }
    }

    pub fn with_lock(mut self, lock: DownloadLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Where `binary` lives once resolved. No I/O.
    pub fn path(&self, binary: &Binary) -> PathBuf {
        self.cache.path(binary)
    }

    fn backends(&self) -> impl Iterator<Item = &BackendHandle> {
        self.remote.iter().chain(self.origin.iter())
    }

    async fn is_cached(&self, binary: &Binary) -> Result<bool> {
        self.cache.contains(binary).await.map_err(ErrorKind::cache)
    }

    /// Make `binary` available in the local cache and return its path.
    #[instrument(skip(self), fields(binary = %binary))]
    pub async fn resolve(&self, binary: &Binary) -> Result<PathBuf> {
        let path = self.path(binary);
        if self.is_cached(binary).await? {
            tracing::debug!(path = %path.display(), "Found binary in local cache");
            return Ok(path);
        }
        if self.backends().next().is_none() {
            exn::bail!(ErrorKind::NoBackends(binary.tool.clone()));
        }
        tracing::debug!(path = %path.display(), "Binary not present in local cache");

        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent).await {
                exn::bail!(ErrorKind::Cache(StorageErrorKind::Io(format!("{}: {err}", parent.display()))));
            }
        }
        loop {
            if self.lock.acquire(&path).await.map_err(ErrorKind::lock)? {
                break;
            }
            // Whoever held the lock may have populated the entry.
            if self.is_cached(binary).await? {
                tracing::debug!(path = %path.display(), "Binary was fetched by another process");
                return Ok(path);
            }
        }

        // A competitor may have acquired and released the lock between our
        // cache miss and our acquisition.
        let outcome = match self.is_cached(binary).await {
            Ok(true) => Ok(()),
            Ok(false) => self.populate(binary).await,
            Err(err) => Err(err),
        };
        if let Err(err) = self.lock.release(&path).await {
            tracing::warn!(path = %path.display(), error = %err, "Failed to release download lock");
        }
        outcome.map(|()| path)
    }

    /// Walk the fallback chain. Must be called with the lock held.
    async fn populate(&self, binary: &Binary) -> Result<()> {
        let mut last = None;
        for backend in self.backends() {
            tracing::debug!(backend = backend.describe(), "Attempting to fetch binary");
            match backend.fetch(binary).await {
                Ok(content) => {
                    self.cache.store(binary, &content).await.map_err(ErrorKind::cache)?;
                    tracing::info!(backend = backend.describe(), size = content.len(), "Fetched binary into local cache");
                    return Ok(());
                },
                // The object was found but does not match the archive
                // template; other backends will serve the same object.
                Err(err) if matches!(&*err, StorageErrorKind::Archive(_)) => {
                    return Err(ErrorKind::backend(err));
                },
                Err(err) => {
                    tracing::warn!(backend = backend.describe(), error = %err, "Backend failed to provide binary");
                    last = Some(err);
                },
            }
        }
        match last {
            Some(err) => Err(ErrorKind::backend(err)),
            None => exn::bail!(ErrorKind::NoBackends(binary.tool.clone())),
        }
    }

    /// Resolve every binary, independently and in order.
    ///
    /// A failure does not stop the remaining binaries from being attempted.
    /// If any failed, the error lists each of them with its cause.
    pub async fn resolve_all(&self, binaries: &[Binary]) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(binaries.len());
        let mut failures = Vec::new();
        for binary in binaries {
            match self.resolve(binary).await {
                Ok(path) => paths.push(path),
                Err(err) => {
                    tracing::debug!(binary = %binary, error = %err, "Failed to resolve binary");
                    failures.push((binary.clone(), (*err).clone()));
                },
            }
        }
        if !failures.is_empty() {
            exn::bail!(ErrorKind::Batch(Failures(failures)));
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use toolpin_storage::StorageBackend;
    use toolpin_storage::backend::MockBackend;
    use toolpin_storage::{Arch, Platform};

    fn binary() -> Binary {
        Binary::new("tool", "v1.2.3", Platform::Linux, Arch::X86_64)
    }

    fn fast_lock() -> DownloadLock {
        DownloadLock::new().with_poll_interval(Duration::from_millis(5))
    }

    fn fetcher(root: &std::path::Path, remote: Option<&Arc<MockBackend>>, origin: Option<&Arc<MockBackend>>) -> Fetcher {
        Fetcher::new(
            LocalCache::new(root),
            remote.map(|b| b.clone() as BackendHandle),
            origin.map(|b| b.clone() as BackendHandle),
        )
        .with_lock(fast_lock())
    }

    #[tokio::test]
    async fn falls_back_to_origin_then_serves_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MockBackend::new().named("remote"));
        let origin = Arc::new(MockBackend::with_binaries([(binary(), b"B".to_vec())]).named("origin"));
        let fetcher = fetcher(dir.path(), Some(&remote), Some(&origin));

        let path = fetcher.resolve(&binary()).await.unwrap();
        assert_eq!(path, fetcher.path(&binary()));
        assert_eq!(std::fs::read(&path).unwrap(), b"B");
        assert_eq!((remote.fetch_count(), origin.fetch_count()), (1, 1));
        assert!(!DownloadLock::lock_file(&path).exists());

        let again = fetcher.resolve(&binary()).await.unwrap();
        assert_eq!(again, path);
        assert_eq!((remote.fetch_count(), origin.fetch_count()), (1, 1));
    }

    #[tokio::test]
    async fn remote_cache_is_tried_first() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MockBackend::with_binaries([(binary(), b"cached".to_vec())]));
        let origin = Arc::new(MockBackend::with_binaries([(binary(), b"origin".to_vec())]));
        let fetcher = fetcher(dir.path(), Some(&remote), Some(&origin));

        let path = fetcher.resolve(&binary()).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"cached");
        assert_eq!(origin.fetch_count(), 0);
    }

    #[tokio::test]
    async fn no_backends_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher(dir.path(), None, None);

        let err = fetcher.resolve(&binary()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::NoBackends("tool".into()));
        assert!(!err.is_retryable());
        let path = fetcher.path(&binary());
        assert!(!DownloadLock::lock_file(&path).exists());
        assert!(!path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn cached_entry_needs_no_backends() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher(dir.path(), None, None);
        fetcher.cache().store(&binary(), b"local").await.unwrap();
        assert_eq!(fetcher.resolve(&binary()).await.unwrap(), fetcher.path(&binary()));
    }

    #[tokio::test]
    async fn last_backend_error_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MockBackend::failing(StorageErrorKind::Transport("connection reset".into())));
        let origin = Arc::new(MockBackend::new());
        let fetcher = fetcher(dir.path(), Some(&remote), Some(&origin));

        let err = fetcher.resolve(&binary()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Backend(StorageErrorKind::NotFound(_))));
        assert_eq!(origin.fetch_count(), 1);
        assert!(!DownloadLock::lock_file(&fetcher.path(&binary())).exists());
        assert!(!fetcher.cache().contains(&binary()).await.unwrap());
    }

    #[tokio::test]
    async fn archive_errors_stop_the_chain() {
        use toolpin_archive::error::ErrorKind as ArchiveErrorKind;

        let dir = tempfile::tempdir().unwrap();
        let kind = StorageErrorKind::Archive(ArchiveErrorKind::MemberNotFound("bin/tool".into()));
        let remote = Arc::new(MockBackend::failing(kind.clone()));
        let origin = Arc::new(MockBackend::with_binaries([(binary(), b"B".to_vec())]));
        let fetcher = fetcher(dir.path(), Some(&remote), Some(&origin));

        let err = fetcher.resolve(&binary()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Backend(kind));
        assert_eq!(origin.fetch_count(), 0);
    }

    #[tokio::test]
    async fn waits_for_a_competing_download() {
        let dir = tempfile::tempdir().unwrap();
        let origin = Arc::new(MockBackend::with_binaries([(binary(), b"B".to_vec())]));
        let fetcher = fetcher(dir.path(), None, Some(&origin));
        let path = fetcher.path(&binary());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        // Held by a live process: this one.
        std::fs::write(DownloadLock::lock_file(&path), std::process::id().to_string()).unwrap();

        let wanted = binary();
        let (resolved, _) = tokio::join!(fetcher.resolve(&wanted), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            fetcher.cache().store(&binary(), b"competitor").await.unwrap();
            std::fs::remove_file(DownloadLock::lock_file(&path)).unwrap();
        });
        assert_eq!(resolved.unwrap(), path);
        assert_eq!(std::fs::read(&path).unwrap(), b"competitor");
        assert_eq!(origin.fetch_count(), 0);
    }

    #[tokio::test]
    async fn failed_cache_store_ends_the_attempt_and_releases_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let origin = Arc::new(MockBackend::with_binaries([(binary(), b"B".to_vec())]));
        let fetcher = fetcher(dir.path(), None, Some(&origin));
        let path = fetcher.path(&binary());
        // Not a regular file, so not a cache entry, but it blocks the store.
        std::fs::create_dir_all(&path).unwrap();

        let err = fetcher.resolve(&binary()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cache(StorageErrorKind::AlreadyExists(_))));
        assert_eq!(origin.fetch_count(), 1);
        assert!(!DownloadLock::lock_file(&path).exists());
    }

    /// Replaces the held lock file with a directory while fetching, so that
    /// releasing it afterwards fails.
    struct LockClobberingBackend {
        lock: PathBuf,
    }

    #[async_trait::async_trait]
    impl StorageBackend for LockClobberingBackend {
        fn describe(&self) -> &str {
            "clobber"
        }

        async fn fetch(&self, _binary: &Binary) -> toolpin_storage::error::Result<Vec<u8>> {
            std::fs::remove_file(&self.lock).unwrap();
            std::fs::create_dir(&self.lock).unwrap();
            std::fs::write(self.lock.join("keep"), b"").unwrap();
            Ok(b"B".to_vec())
        }

        async fn store(&self, _binary: &Binary, _content: &[u8]) -> toolpin_storage::error::Result<()> {
            unreachable!("the fetcher never writes to its backends")
        }
    }

    #[tokio::test]
    async fn release_failure_does_not_mask_success() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        let lock = DownloadLock::lock_file(&cache.path(&binary()));
        let origin: BackendHandle = Arc::new(LockClobberingBackend { lock: lock.clone() });
        let fetcher = Fetcher::new(cache, None, Some(origin)).with_lock(fast_lock());

        let path = fetcher.resolve(&binary()).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"B");
        assert!(lock.is_dir());
    }

    #[tokio::test]
    async fn batch_attempts_everything_and_aggregates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let darwin = Binary::new("tool", "v1.2.3", Platform::Darwin, Arch::Arm64);
        let windows = Binary::new("tool", "v1.2.3", Platform::Windows, Arch::X86_64);
        let origin = Arc::new(MockBackend::with_binaries([(darwin.clone(), b"D".to_vec())]));
        let fetcher = fetcher(dir.path(), None, Some(&origin));

        let err = fetcher.resolve_all(&[windows.clone(), darwin.clone(), binary()]).await.unwrap_err();
        let ErrorKind::Batch(Failures(failures)) = &*err else {
            panic!("unexpected error: {err:?}");
        };
        let failed: Vec<&Binary> = failures.iter().map(|(b, _)| b).collect();
        assert_eq!(failed, [&windows, &binary()]);
        assert!(failures.iter().all(|(_, kind)| matches!(kind, ErrorKind::Backend(StorageErrorKind::NotFound(_)))));
        // The failure of the first binary did not prevent the second.
        assert!(fetcher.cache().contains(&darwin).await.unwrap());
    }

    #[tokio::test]
    async fn batch_returns_paths_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let arm = Binary::new("tool", "v1.2.3", Platform::Linux, Arch::Arm64);
        let origin = Arc::new(MockBackend::with_binaries([(binary(), b"x".to_vec()), (arm.clone(), b"a".to_vec())]));
        let fetcher = fetcher(dir.path(), None, Some(&origin));

        let paths = fetcher.resolve_all(&[arm.clone(), binary()]).await.unwrap();
        assert_eq!(paths, [fetcher.path(&arm), fetcher.path(&binary())]);
    }
}
