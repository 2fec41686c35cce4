//! Command-line error types.

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open the local catalog")]
    Catalog,
    #[display("could not set up the upstream client")]
    Http,
    #[display("could not open tarball storage")]
    Storage,
    #[display("could not start the sync job")]
    Sync,
    #[display("sync job terminated abnormally")]
    Join,
    #[display("no sync log with id {_0}")]
    LogNotFound(#[error(not(source))] i64),
}
