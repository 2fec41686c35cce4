use crate::context::Context;
use crate::error::{ErrorKind, Result};
use crate::job::{SyncJob, SyncSummary};
use crate::log::JobLog;
use exn::ResultExt;
use regmirror_registry::SourcePackage;
use tokio::task::JoinHandle;

/// Result of asking for a package to be synced.
#[derive(Debug)]
pub enum Triggered {
    /// The package does not exist upstream; no job was started.
    Missing { status: u16 },
    /// A job is running in the background.
    Started {
        log_id: i64,
        package: Box<SourcePackage>,
        /// Resolves once the job has finished.
        handle: JoinHandle<SyncSummary>,
    },
}

/// Check that `name` exists upstream, then start syncing it in the
/// background on behalf of `username`. Returns without waiting for the job.
///
/// Must be called from within a tokio runtime.
#[tracing::instrument(skip(ctx))]
pub async fn trigger(ctx: &Context, name: &str, username: &str) -> Result<Triggered> {
    let fetched = ctx.registry.fetch(name).await.or_raise(|| ErrorKind::Upstream)?;
    let package = match fetched.package {
        Some(package) if package.exists() => package,
        _ => {
            tracing::info!(status = fetched.status, "Package does not exist upstream");
            return Ok(Triggered::Missing { status: fetched.status });
        },
    };

    let log_id = ctx.activity.create(name, username).await.or_raise(|| ErrorKind::CatalogWriteFailed)?;
    let job = SyncJob::new(ctx.clone(), JobLog::new(log_id, ctx.activity.clone()), name, username);
    let handle = tokio::spawn(job.start());
    tracing::info!(log_id, "Sync job started");
    Ok(Triggered::Started {
        log_id,
        package: Box::new(package),
        handle,
    })
}
