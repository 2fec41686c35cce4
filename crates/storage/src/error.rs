//! Blob store errors.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No blob is stored under the key.
    #[display("no blob stored at {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("not allowed to access {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    #[display("blob store I/O failed: {_0}")]
    Io(IoError),
    /// The key is empty, absolute, or escapes the store root.
    #[display("unusable blob key: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// An upload stored a different number of bytes than the caller declared.
    #[display("size mismatch: declared {expected} bytes, stored {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[display("{_0}")]
    BackendError(#[error(not(source))] String),
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
