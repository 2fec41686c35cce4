//! Storage backend trait and implementations.
//!
//! A backend durably stores tarball blobs under validated keys and hands out
//! an address each blob can later be retrieved from.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::models::FileInfo;
use async_trait::async_trait;
use std::path::Path;

/// Unified interface for blob storage.
///
/// All paths are keys relative to the storage root and must be validated
/// using [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use regmirror_storage::{backend::StorageBackend, error::Result};
///
/// async fn rehost(backend: &dyn StorageBackend, downloaded: &Path, size: u64) -> Result<String> {
///     let info = backend.upload(downloaded, Path::new("left-pad/-/left-pad-1.3.0.tgz"), size).await?;
///     Ok(info.url)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Copy a local file into storage under `path`.
    ///
    /// `size` is the byte count the caller verified; if the stored blob ends
    /// up a different size the upload fails with
    /// [`SizeMismatch`](crate::error::ErrorKind::SizeMismatch) and nothing is
    /// left behind under `path`.
    async fn upload(&self, source: &Path, path: &Path, size: u64) -> Result<FileInfo>;

    /// Address a blob stored under `path` is retrievable from. Does not check
    /// that the blob exists.
    fn url(&self, path: &Path) -> Result<String>;
}
