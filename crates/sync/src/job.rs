use crate::context::Context;
use crate::error::{ErrorKind, Result, chain};
use crate::fanout::{self, Barrier};
use crate::log::JobLog;
use crate::pipeline::{SyncedVersion, VersionPipeline};
use crate::queue::WorkQueue;
use crate::reconcile::{ExistingTags, ExistingVersions, Skipped, reconcile};
use exn::ResultExt;
use regmirror_registry::SourcePackage;

/// Outcome of syncing one package name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    pub name: String,
    /// Versions written to the catalog, in the order they were synced.
    pub synced: Vec<SyncedVersion>,
    /// Versions the pipeline gave up on.
    pub failed: Vec<String>,
    /// Versions left out because their publish time or manifest was unusable.
    pub skipped: Vec<Skipped>,
    pub descriptions: Barrier,
    pub tags: Barrier,
}

impl PackageReport {
    /// The newest version synced by this job. Informational only; tags are
    /// only ever moved by tag reconciliation.
    pub fn latest(&self) -> Option<&SyncedVersion> {
        self.synced.last()
    }

    pub fn synced_versions(&self) -> Vec<&str> {
        self.synced.iter().map(|v| v.version.as_str()).collect()
    }
}

/// Final state of a finished job. `successes` and `fails` partition every
/// name the job dequeued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub log_id: i64,
    pub name: String,
    pub successes: Vec<String>,
    pub fails: Vec<String>,
    pub reports: Vec<PackageReport>,
}

impl SyncSummary {
    pub fn report(&self, name: &str) -> Option<&PackageReport> {
        self.reports.iter().find(|report| report.name == name)
    }
}

/// Syncs one package and, transitively, everything it depends on.
///
/// Names are processed strictly one at a time, as are the versions within a
/// name. A failure is recorded against the name or version it happened to and
/// the job moves on; the job itself always finishes.
pub struct SyncJob {
    ctx: Context,
    log: JobLog,
    name: String,
    username: String,
    queue: WorkQueue,
    successes: Vec<String>,
    fails: Vec<String>,
    reports: Vec<PackageReport>,
}

impl SyncJob {
    pub fn new(ctx: Context, log: JobLog, name: impl Into<String>, username: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            ctx,
            log,
            queue: WorkQueue::new(name.clone()),
            name,
            username: username.into(),
            successes: Vec::new(),
            fails: Vec::new(),
            reports: Vec::new(),
        }
    }

    /// Run until the queue is empty. Resolving is the "finished" signal.
    #[tracing::instrument(skip(self), fields(name = %self.name, log_id = self.log.id()))]
    pub async fn start(mut self) -> SyncSummary {
        self.log.line(format!("user: {}, sync {} worker start.", self.username, self.name)).await;
        while let Some(name) = self.queue.pop() {
            self.next(name).await;
        }
        self.finish().await
    }

    async fn next(&mut self, name: String) {
        let package = match self.fetch(&name).await {
            Ok(package) => package,
            Err(error) => {
                tracing::warn!(%name, error = ?error, "Could not fetch package");
                self.log.line(format!("[error] [{name}] get package error: {}", chain(error.frame()))).await;
                self.fails.push(name);
                return;
            },
        };

        self.log.line(format!("[{name}] start...")).await;
        match self.sync_package(&name, &package).await {
            Ok(report) => {
                self.log
                    .line(format!(
                        "[{name}] synced success, {} versions: {}",
                        report.synced.len(),
                        report.synced_versions().join(", ")
                    ))
                    .await;
                self.successes.push(name);
                self.reports.push(report);
            },
            Err(error) => {
                tracing::warn!(%name, error = ?error, "Package sync failed");
                self.log.line(format!("[error] [{name}] sync error: {}", chain(error.frame()))).await;
                self.fails.push(name);
            },
        }
    }

    async fn fetch(&self, name: &str) -> Result<SourcePackage> {
        let fetched = self.ctx.registry.fetch(name).await.or_raise(|| ErrorKind::Upstream)?;
        match fetched.package {
            Some(package) => Ok(package),
            None => exn::bail!(ErrorKind::UpstreamNotFound { name: name.to_string(), status: fetched.status }),
        }
    }

    async fn sync_package(&mut self, requested: &str, package: &SourcePackage) -> Result<PackageReport> {
        let name = if package.name.is_empty() { requested } else { package.name.as_str() };
        let catalog = self.ctx.catalog.as_ref();
        let (records, tag_records) = futures::try_join!(
            async { catalog.list_versions(name).await.or_raise(|| ErrorKind::CatalogReadFailed) },
            async { catalog.list_tags(name).await.or_raise(|| ErrorKind::CatalogReadFailed) },
        )?;
        let existing = ExistingVersions::from_records(records);
        if let Some(latest) = existing.latest() {
            tracing::debug!(name, latest = %latest.version, known = existing.len(), "Local catalog snapshot");
        }
        let plan = reconcile(package, &existing, &ExistingTags::from_records(tag_records));

        for skipped in &plan.skipped {
            self.log.line(format!("  [{name}] skipped version {}: {}", skipped.version, skipped.reason)).await;
        }
        if plan.missing_versions.is_empty() {
            self.log.line(format!("  [{name}] all versions are synced")).await;
        } else {
            self.log.line(format!("  [{name}] {} versions", plan.missing_versions.len())).await;
        }

        let pipeline = VersionPipeline::new(&self.ctx, &self.log, &self.username);
        let mut synced = Vec::new();
        let mut failed = Vec::new();
        for (index, candidate) in plan.missing_versions.into_iter().enumerate() {
            let version = candidate.descriptor.version.clone();
            match pipeline.run(&mut self.queue, index, candidate).await {
                Ok(result) => synced.push(result),
                Err(error) => {
                    tracing::warn!(name, version, error = ?error, "Version sync failed");
                    let error = chain(error.frame());
                    self.log.line(format!("    [{name}:{index}] error, version: {version}, {error}")).await;
                    failed.push(version);
                },
            }
        }

        let (descriptions, tags) = futures::join!(
            fanout::save_descriptions(catalog, &self.log, name, &plan.missing_descriptions),
            fanout::add_tags(catalog, &self.log, name, &plan.missing_tags),
        );

        Ok(PackageReport {
            name: name.to_string(),
            synced,
            failed,
            skipped: plan.skipped,
            descriptions,
            tags,
        })
    }

    async fn finish(self) -> SyncSummary {
        self.log
            .line(format!(
                "[done] Sync {} module finished, {} success, {} fail\nSuccess: [ {} ]\nFail: [ {} ]",
                self.name,
                self.successes.len(),
                self.fails.len(),
                self.successes.join(", "),
                self.fails.join(", "),
            ))
            .await;
        tracing::info!(
            name = %self.name,
            successes = self.successes.len(),
            fails = self.fails.len(),
            "Sync job finished"
        );
        SyncSummary {
            log_id: self.log.id(),
            name: self.name,
            successes: self.successes,
            fails: self.fails,
            reports: self.reports,
        }
    }
}
