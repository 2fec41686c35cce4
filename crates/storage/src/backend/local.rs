//! Local filesystem storage backend.
//!
//! Blobs are stored in a configured directory via `tokio::fs`. When a public
//! base URL is configured, addresses are `{base_url}/{key}` (the directory is
//! expected to be served by something else); otherwise they are `file://`
//! URLs pointing straight at the stored file.

use crate::error::{ErrorKind, Result};
use crate::path::{to_key, validate as validate_path};
use crate::{FileInfo, StorageBackend};
use async_trait::async_trait;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local filesystem storage backend.
///
/// ```no_run
/// use regmirror_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("local", "/srv/mirror/tarballs")?
///     .with_base_url("https://mirror.example.com/tarballs");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory for stored blobs
    root: PathBuf,
    base_url: Option<String>,
}
impl LocalBackend {
    /// Create a new local filesystem backend rooted at an absolute directory,
    /// creating it if it does not exist yet.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Only happens once at startup; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::io_error(e, &root))?;
        }
        Ok(Self {
            name: name.into(),
            root,
            base_url: None,
        })
    }

    /// Address blobs relative to a public URL prefix instead of `file://`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn info(&self, path: &Path, metadata: &Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(validate_path(path)?, metadata.len(), modified, self.url(path)?))
    }

    fn io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    async fn create_parent(&self, target: &Path, path: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::io_error(e, path))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self), fields(backend = %self.name))]
    async fn upload(&self, source: &Path, path: &Path, size: u64) -> Result<FileInfo> {
        let target = self.resolve(path)?;
        self.create_parent(&target, path).await?;
        let copied = fs::copy(source, &target).await.map_err(|e| Self::io_error(e, source))?;
        if copied != size {
            if let Err(error) = fs::remove_file(&target).await {
                tracing::warn!(%error, path = %target.display(), "Could not remove short upload");
            }
            exn::bail!(ErrorKind::SizeMismatch { expected: size, actual: copied });
        }
        let metadata = fs::metadata(&target).await.map_err(|e| Self::io_error(e, path))?;
        let info = self.info(path, &metadata)?;
        tracing::debug!(url = %info.url, size, "Stored blob");
        Ok(info)
    }

    fn url(&self, path: &Path) -> Result<String> {
        match &self.base_url {
            Some(base) => Ok(format!("{base}/{}", to_key(path)?)),
            None => Ok(format!("file://{}", self.resolve(path)?.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(dir: &tempfile::TempDir) -> LocalBackend {
        LocalBackend::new("local", dir.path()).unwrap()
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let root = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("local", root.path()).is_ok());
        assert!(LocalBackend::new("local", "relative/path").is_err());
    }

    #[test]
    fn test_new_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/tarballs");
        LocalBackend::new("local", &root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_url() {
        let root = tempfile::tempdir().unwrap();
        let key = Path::new("@scope/pkg/-/pkg-1.0.0.tgz");
        let plain = backend(&root);
        assert_eq!(
            plain.url(key).unwrap(),
            format!("file://{}", root.path().join("@scope/pkg/-/pkg-1.0.0.tgz").display())
        );
        let served = backend(&root).with_base_url("https://mirror.test/tarballs/");
        assert_eq!(served.url(key).unwrap(), "https://mirror.test/tarballs/@scope/pkg/-/pkg-1.0.0.tgz");
        assert!(served.url(Path::new("../escape.tgz")).is_err());
    }

    #[tokio::test]
    async fn test_upload() {
        let root = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let source = staging.path().join("a-1.0.0.tgz");
        std::fs::write(&source, b"0123456789").unwrap();

        let backend = backend(&root).with_base_url("http://mirror.test");
        let info = backend.upload(&source, Path::new("a/-/a-1.0.0.tgz"), 10).await.unwrap();
        assert_eq!(info.path, Path::new("a/-/a-1.0.0.tgz"));
        assert_eq!(info.size, 10);
        assert_eq!(info.url, "http://mirror.test/a/-/a-1.0.0.tgz");
        assert_eq!(std::fs::read(root.path().join("a/-/a-1.0.0.tgz")).unwrap(), b"0123456789");
        // The source is copied, not moved.
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_upload_overwrites() {
        let root = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let backend = backend(&root);
        let key = Path::new("a/-/a-1.0.0.tgz");
        for body in [&b"first"[..], &b"second"[..]] {
            let source = staging.path().join("a.tgz");
            std::fs::write(&source, body).unwrap();
            backend.upload(&source, key, body.len() as u64).await.unwrap();
        }
        assert_eq!(std::fs::read(root.path().join(key)).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_upload_size_mismatch_leaves_nothing() {
        let root = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let source = staging.path().join("a-1.0.0.tgz");
        std::fs::write(&source, b"short").unwrap();

        let backend = backend(&root);
        let err = backend.upload(&source, Path::new("a/-/a-1.0.0.tgz"), 99).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::SizeMismatch { expected: 99, actual: 5 }));
        assert!(!root.path().join("a/-/a-1.0.0.tgz").exists());
    }

    #[tokio::test]
    async fn test_upload_missing_source() {
        let root = tempfile::tempdir().unwrap();
        let backend = backend(&root);
        let err = backend
            .upload(&root.path().join("missing.tgz"), Path::new("a/-/a.tgz"), 1)
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_path_security() {
        let root = tempfile::tempdir().unwrap();
        let backend = backend(&root);
        let staging = tempfile::tempdir().unwrap();
        let source = staging.path().join("x.tgz");
        std::fs::write(&source, b"x").unwrap();
        assert!(backend.upload(&source, Path::new("a/../../escape"), 1).await.is_err());
        assert!(!root.path().parent().unwrap().join("escape").exists());
        assert!(backend.upload(Path::new("/etc/hostname"), Path::new("../../x"), 0).await.is_err());
    }
}
