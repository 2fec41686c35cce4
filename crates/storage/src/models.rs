use std::path::PathBuf;
use time::OffsetDateTime;

/// Metadata for a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Key (relative path from the storage root)
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
    /// Durable address the blob can be retrieved from.
    pub url: String,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: impl Into<OffsetDateTime>, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size,
            modified: modified.into(),
            url: url.into(),
        }
    }
}
