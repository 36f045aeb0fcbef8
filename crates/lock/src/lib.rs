//! Cross-process download lock.
//!
//! Populating a cache entry is guarded by a sidecar `<path>.pid` file holding
//! the PID of the owner. Ownership is established by creating that file
//! exclusively and proven by the owner still being alive; native file locks
//! are avoided because the cache may live on a network filesystem that does
//! not honour them.
//!
//! A waiter polls the lock file until one of the following happens:
//!
//! - the file disappears (released normally),
//! - the file holds no parseable PID and is older than the grace period (the
//!   owner crashed between creating the file and writing its PID),
//! - the file holds the PID of a process that is no longer running (the owner
//!   crashed while holding the lock).
//!
//! In the last two cases the waiter deletes the stale file itself, unless it
//! changed since it was judged (another waiter got there first and a new
//! owner has claimed it), in which case it keeps polling. Once the file is
//! gone the waiter has to try [`DownloadLock::acquire`] again; it never
//! inherits the lock.
//!
//! This is advisory locking between cooperating toolpin processes only.

pub mod error;
mod process;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::ffi::OsString;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::instrument;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long a freshly created lock file may stay without a PID in it.
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);
/// Emit a progress message every this many polls.
const LOG_EVERY_N_POLLS: u64 = 100;

enum LockState {
    Released,
    Held(Option<u32>),
    Stale(&'static str, Snapshot),
}

/// What a lock file looked like when it was judged.
#[derive(Debug, PartialEq, Eq)]
struct Snapshot {
    content: Vec<u8>,
    modified: SystemTime,
}

impl Snapshot {
    /// `None` when the lock file is gone.
    async fn take(lock: &Path) -> Result<Option<Self>> {
        let inspect = || ErrorKind::Inspect(lock.to_path_buf());
        let content = match fs::read(lock).await {
            Ok(content) => content,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).or_raise(inspect),
        };
        let modified = match fs::metadata(lock).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).or_raise(inspect),
        };
        Ok(Some(Self { content, modified }))
    }
}

/// PID-file lock keyed by the path it protects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DownloadLock {
    poll_interval: Duration,
    grace_period: Duration,
}

impl Default for DownloadLock {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl DownloadLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// The sidecar lock file guarding `path`.
    pub fn lock_file(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(".pid");
        PathBuf::from(name)
    }

    /// Try to take the lock for `path`.
    ///
    /// Returns `true` if the lock is now held by this process. Returns `false`
    /// once a competing holder has gone away (released or proven stale), after
    /// which the caller should re-check whatever the lock protects and try
    /// again.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn acquire(&self, path: &Path) -> Result<bool> {
        let lock = Self::lock_file(path);
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        match options.open(&lock).await {
            Ok(mut file) => {
                let written = async {
                    file.write_all(std::process::id().to_string().as_bytes()).await?;
                    file.sync_all().await
                }
                .await;
                if let Err(err) = written {
                    discard(&lock).await;
                    return Err(err).or_raise(|| ErrorKind::Create(lock.clone()));
                }
                tracing::debug!(lock = %lock.display(), "Acquired download lock");
                Ok(true)
            },
            Err(err) if err.kind() == IoErrorKind::AlreadyExists => {
                self.wait(&lock).await?;
                Ok(false)
            },
            Err(err) => Err(err).or_raise(|| ErrorKind::Create(lock.clone())),
        }
    }

    /// Remove the lock file for `path`. Releasing a lock that is not held is
    /// not an error.
    pub async fn release(&self, path: &Path) -> Result<()> {
        let lock = Self::lock_file(path);
        match fs::remove_file(&lock).await {
            Ok(()) => {
                tracing::debug!(lock = %lock.display(), "Released download lock");
                Ok(())
            },
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).or_raise(|| ErrorKind::Release(lock)),
        }
    }

    async fn wait(&self, lock: &Path) -> Result<()> {
        let mut polls: u64 = 0;
        loop {
            match self.inspect(lock).await? {
                LockState::Released => return Ok(()),
                LockState::Stale(reason, seen) => {
                    if remove_if_unchanged(lock, &seen, reason).await? {
                        return Ok(());
                    }
                    // Replaced by a new holder since it was judged; judge it afresh.
                    tracing::debug!(lock = %lock.display(), "Lock file changed before stale removal");
                    continue;
                },
                LockState::Held(pid) => {
                    polls += 1;
                    if polls % LOG_EVERY_N_POLLS == 0 {
                        tracing::info!(lock = %lock.display(), ?pid, "Waiting for download lock to be released");
                    }
                },
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn inspect(&self, lock: &Path) -> Result<LockState> {
        let Some(seen) = Snapshot::take(lock).await? else {
            return Ok(LockState::Released);
        };
        if let Ok(pid) = String::from_utf8_lossy(&seen.content).trim().parse::<u32>() {
            return Ok(if process::is_alive(pid) {
                LockState::Held(Some(pid))
            } else {
                LockState::Stale("owner process is no longer running", seen)
            });
        }
        // A timestamp in the future counts as brand new.
        let age = SystemTime::now().duration_since(seen.modified).unwrap_or_default();
        Ok(if age > self.grace_period {
            LockState::Stale("no owner PID recorded within the grace period", seen)
        } else {
            LockState::Held(None)
        })
    }
}

/// Delete a stale lock file, but only if it still is the file that was judged
/// stale. Returns `false` if it has been replaced in the meantime.
async fn remove_if_unchanged(lock: &Path, seen: &Snapshot, reason: &str) -> Result<bool> {
    match Snapshot::take(lock).await? {
        None => return Ok(true),
        Some(current) if current != *seen => return Ok(false),
        Some(_) => {},
    }
    tracing::warn!(lock = %lock.display(), reason, "Removing stale download lock");
    match fs::remove_file(lock).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == IoErrorKind::NotFound => Ok(true),
        Err(err) => Err(err).or_raise(|| ErrorKind::Release(lock.to_path_buf())),
    }
}

/// Best-effort removal of a lock file whose PID could not be written. Returns
/// whether the file is gone; if it is not, waiters expire it after the grace
/// period.
async fn discard(lock: &Path) -> bool {
    match fs::remove_file(lock).await {
        Ok(()) => true,
        Err(err) if err.kind() == IoErrorKind::NotFound => true,
        Err(err) => {
            tracing::warn!(lock = %lock.display(), error = %err, "Unable to remove incomplete download lock");
            false
        },
    }
}
