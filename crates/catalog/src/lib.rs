//! Local catalog of mirrored packages.
//!
//! The catalog records every mirrored version (with a snapshot of its
//! manifest), the dist-tags pointing at them, and the append-only activity
//! log of each sync job. Everything lives in one SQLite database.
//!
//! The sync engine only sees the [`Catalog`] and [`ActivityLog`] traits;
//! [`Repository`] implements both over a single connection pool.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::{LogRecord, NewVersion, TagRecord, VersionRecord};
pub use crate::repo::{ActivityLog, Catalog, Repository};
use std::sync::Arc;

pub type CatalogHandle = Arc<dyn Catalog + Send + Sync>;
pub type LogHandle = Arc<dyn ActivityLog + Send + Sync>;
