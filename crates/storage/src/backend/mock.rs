//! In-memory storage backend for testing.

use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::{to_key, validate as validate_path};
use crate::StorageBackend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Blobs live in a `HashMap` behind a [`RwLock`], so all trait methods
/// operate on `&self`. Addresses are `mock://{name}/{key}`.
///
/// ```
/// use regmirror_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("a/-/a-1.0.0.tgz", b"tarball")]);
/// assert_eq!(backend.contents(Path::new("a/-/a-1.0.0.tgz")).await.as_deref(), Some(&b"tarball"[..]));
/// assert_eq!(backend.url(Path::new("a/-/a-1.0.0.tgz"))?, "mock://mock/a/-/a-1.0.0.tgz");
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    blobs: RwLock<HashMap<PathBuf, (OffsetDateTime, Vec<u8>)>>,
    fail_uploads: AtomicBool,
}

impl MockBackend {
    /// Create a mock backend pre-populated with blobs.
    ///
    /// Panics if any key fails validation: broken test setup should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let now = OffsetDateTime::now_utc();
        let mut map = HashMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            blobs: RwLock::new(map),
            fail_uploads: AtomicBool::new(false),
        }
    }

    /// Change the name of the mock backend (appears in addresses).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every subsequent [`upload`](StorageBackend::upload) fail with a
    /// backend error, or succeed again.
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Every stored key, sorted.
    pub async fn keys(&self) -> Vec<PathBuf> {
        let mut keys: Vec<_> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Bytes stored under `path`, if any.
    pub async fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        let path = validate_path(path).ok()?;
        self.blobs.read().await.get(&path).map(|(_, data)| data.clone())
    }

    fn file_info(&self, path: &Path, size: u64, modified: OffsetDateTime) -> Result<FileInfo> {
        Ok(FileInfo::new(path, size, modified, self.url(path)?))
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, source: &Path, path: &Path, size: u64) -> Result<FileInfo> {
        let path = validate_path(path)?;
        if self.fail_uploads.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::BackendError(format!("{}: uploads disabled", self.name)));
        }
        let data = tokio::fs::read(source).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(source.to_path_buf()),
            _ => ErrorKind::Io(e),
        })?;
        let actual = data.len() as u64;
        if actual != size {
            exn::bail!(ErrorKind::SizeMismatch { expected: size, actual });
        }
        let now = OffsetDateTime::now_utc();
        self.blobs.write().await.insert(path.clone(), (now, data));
        self.file_info(&path, size, now)
    }

    fn url(&self, path: &Path) -> Result<String> {
        Ok(format!("mock://{}/{}", self.name, to_key(path)?))
    }
}
