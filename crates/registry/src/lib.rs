//! Upstream registry client.
//!
//! [`SourcePackage`] models the registry's metadata document for one package
//! name. [`Registry`] is the seam the sync engine fetches through;
//! [`HttpRegistry`] is the production implementation.

mod client;
pub mod error;
mod models;

pub use crate::client::{Fetched, HttpRegistry, Registry};
pub use crate::models::{Dist, Maintainer, SourcePackage, VersionDescriptor, parse_timestamp};
use std::sync::Arc;

pub type RegistryHandle = Arc<dyn Registry + Send + Sync>;
