//! In-memory storage backend for testing.

use crate::error::{ErrorKind, Result};
use crate::{Binary, StorageBackend};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Binaries are stored in a `HashMap` behind a [`RwLock`], so all trait
/// methods can operate on `&self` without external synchronisation. Calls are
/// counted so tests can assert whether a backend was consulted at all.
///
/// # Examples
///
/// ```
/// use toolpin_storage::backend::{MockBackend, StorageBackend};
/// use toolpin_storage::{Arch, Binary, Platform};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let binary = Binary::new("tool", "1.0", Platform::Linux, Arch::X86_64);
/// let backend = MockBackend::with_binaries([(binary.clone(), b"content")]);
/// assert_eq!(backend.fetch(&binary).await?, b"content");
/// assert_eq!(backend.fetch_count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<Binary, Vec<u8>>>,
    failure: Option<ErrorKind>,
    fetches: AtomicUsize,
    stores: AtomicUsize,
}

impl MockBackend {
    /// An empty backend; every fetch is [`NotFound`](ErrorKind::NotFound).
    pub fn new() -> Self {
        Self::with_binaries(std::iter::empty::<(Binary, Vec<u8>)>())
    }

    /// A backend pre-populated with binaries.
    pub fn with_binaries(binaries: impl IntoIterator<Item = (Binary, impl Into<Vec<u8>>)>) -> Self {
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(binaries.into_iter().map(|(b, data)| (b, data.into())).collect()),
            failure: None,
            fetches: AtomicUsize::new(0),
            stores: AtomicUsize::new(0),
        }
    }

    /// A backend on which every operation fails with `kind`.
    pub fn failing(kind: ErrorKind) -> Self {
        Self {
            failure: Some(kind),
            ..Self::new()
        }
    }

    /// Rename the backend (reported by `describe`).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    /// Content currently held for `binary`.
    pub async fn get(&self, binary: &Binary) -> Option<Vec<u8>> {
        self.storage.read().await.get(binary).cloned()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn describe(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, binary: &Binary) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = &self.failure {
            exn::bail!(kind.clone());
        }
        match self.storage.read().await.get(binary) {
            Some(data) => Ok(data.clone()),
            None => exn::bail!(ErrorKind::NotFound(binary.to_string())),
        }
    }

    async fn store(&self, binary: &Binary, content: &[u8]) -> Result<()> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = &self.failure {
            exn::bail!(kind.clone());
        }
        let mut storage = self.storage.write().await;
        if storage.contains_key(binary) {
            exn::bail!(ErrorKind::AlreadyExists(binary.to_string()));
        }
        storage.insert(binary.clone(), content.to_vec());
        Ok(())
    }
}
