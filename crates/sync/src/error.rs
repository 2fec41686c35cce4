//! Sync Error Types
//!
//! Version-level errors stop at the per-version loop and name-level errors
//! stop at the job loop; a job itself never fails.

use derive_more::{Display, Error};
use regmirror_registry::VersionDescriptor;

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The upstream registry has no such package.
    #[display("package {name} does not exist upstream (HTTP {status})")]
    UpstreamNotFound { name: String, status: u16 },
    /// The upstream metadata request failed.
    #[display("could not fetch package metadata from upstream")]
    Upstream,
    /// The tarball request completed with a status other than 200 or 404.
    #[display("download of {url} failed with HTTP {status}")]
    DownloadFailed {
        url: String,
        status: u16,
        descriptor: Box<VersionDescriptor>,
    },
    /// The tarball transfer broke off (connect, timeout, body read).
    #[display("tarball transfer failed")]
    Transfer,
    /// The downloaded bytes do not hash to the declared checksum.
    #[display("checksum of {url} is {computed}, expected {expected}")]
    ChecksumMismatch {
        url: String,
        computed: String,
        expected: String,
        descriptor: Box<VersionDescriptor>,
    },
    #[display("could not store tarball")]
    StorageWriteFailed,
    #[display("could not read the local catalog")]
    CatalogReadFailed,
    #[display("could not write to the local catalog")]
    CatalogWriteFailed,
    /// The declared tarball URL has no usable filename.
    #[display("invalid tarball URL: {_0}")]
    InvalidTarballUrl(#[error(not(source))] String),
    /// Local temp file handling failed.
    #[display("local I/O error")]
    Io,
}

/// Renders an error followed by each of its causes, `outer: inner: root`.
pub(crate) fn chain(frame: &exn::Frame) -> String {
    let mut message = frame.error().to_string();
    for child in frame.children() {
        let cause = chain(child);
        if !message.contains(&cause) {
            message.push_str(": ");
            message.push_str(&cause);
        }
    }
    message
}
