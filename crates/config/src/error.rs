//! Errors raised while loading configuration.

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An explicitly requested configuration file does not exist.
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The configuration file extension is not one of TOML, YAML or JSON.
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// One of the layered providers could not be parsed or extracted.
    #[display("configuration could not be parsed")]
    Parse,
    /// The configuration parsed, but a value is unusable.
    #[display("invalid configuration value for `{_0}`")]
    Invalid(#[error(not(source))] &'static str),
}
