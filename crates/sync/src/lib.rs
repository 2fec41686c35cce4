//! Package synchronisation engine.
//!
//! Given a package name, a [`SyncJob`] fetches the upstream document,
//! [`reconcile`]s it against the local catalog, downloads every missing
//! version's tarball, checks it against the declared SHA-1, re-hosts it on
//! the blob store and records it in the catalog. Every dependency discovered
//! on the way is queued and synced the same way, each name at most once per
//! job.
//!
//! [`trigger`] is the entry point for callers that only want to start a job
//! and poll its activity log.

mod checksum;
mod context;
pub mod error;
mod fanout;
mod job;
mod log;
mod pipeline;
mod queue;
mod reconcile;
mod trigger;

pub use crate::context::{Context, KeyFn, PipelineConfig, tarball_key};
pub use crate::fanout::Barrier;
pub use crate::job::{PackageReport, SyncJob, SyncSummary};
pub use crate::log::JobLog;
pub use crate::pipeline::SyncedVersion;
pub use crate::queue::WorkQueue;
pub use crate::reconcile::{Candidate, ExistingTags, ExistingVersions, Reconciliation, Skipped, reconcile};
pub use crate::trigger::{Triggered, trigger};
