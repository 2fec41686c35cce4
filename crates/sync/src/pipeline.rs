//! Download, verify, re-host and persist a single version.

use crate::checksum::sha1_file;
use crate::context::Context;
use crate::error::{ErrorKind, Result};
use crate::log::JobLog;
use crate::queue::WorkQueue;
use crate::reconcile::Candidate;
use exn::ResultExt;
use regmirror_catalog::NewVersion;
use regmirror_registry::Dist;
use reqwest::{StatusCode, Url};
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// A version that made it into the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedVersion {
    pub id: i64,
    pub version: String,
    /// Address of the re-hosted tarball, or the upstream URL when upstream
    /// no longer had the content.
    pub tarball: String,
    pub checksum: String,
    pub size: u64,
}

impl SyncedVersion {
    pub fn noattachment(&self) -> bool {
        self.size == 0
    }
}

/// Where the tarball ended up.
struct Stored {
    tarball: String,
    checksum: String,
    size: u64,
}

pub(crate) struct VersionPipeline<'a> {
    ctx: &'a Context,
    log: &'a JobLog,
    username: &'a str,
}

impl<'a> VersionPipeline<'a> {
    pub(crate) fn new(ctx: &'a Context, log: &'a JobLog, username: &'a str) -> Self {
        Self { ctx, log, username }
    }

    /// Sync one version. Dependencies are enqueued before anything can fail,
    /// and the temp download is removed whatever the outcome.
    pub(crate) async fn run(&self, queue: &mut WorkQueue, index: usize, candidate: Candidate) -> Result<SyncedVersion> {
        let descriptor = &candidate.descriptor;
        let name = descriptor.name.as_str();
        let dist_json = descriptor.dist.as_ref().and_then(|d| serde_json::to_string(d).ok()).unwrap_or_default();
        self.log.line(format!("    [{name}:{index}] syncing, version: {}, dist: {dist_json}", descriptor.version)).await;

        for dependency in descriptor.dependency_names() {
            if queue.add(dependency) {
                self.log.line(format!("    add dependency: {dependency}")).await;
            }
        }

        let Some(dist) = descriptor.dist.as_ref() else {
            exn::bail!(ErrorKind::InvalidTarballUrl(String::new()));
        };
        let filename = tarball_filename(&dist.tarball)?;
        let temp = self.ctx.config.download_dir.join(&filename);

        let stored = self.transfer(&candidate, dist, &filename, &temp).await;
        remove_temp(&temp).await;
        let stored = stored?;

        self.persist(index, candidate, stored).await
    }

    async fn transfer(&self, candidate: &Candidate, dist: &Dist, filename: &str, temp: &Path) -> Result<Stored> {
        let url = dist.tarball.as_str();
        fs::create_dir_all(&self.ctx.config.download_dir).await.or_raise(|| ErrorKind::Io)?;

        let mut response = self
            .ctx
            .http
            .get(url)
            .timeout(self.ctx.config.download_timeout)
            .send()
            .await
            .or_raise(|| ErrorKind::Transfer)?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                tracing::debug!(url, "Tarball gone upstream, keeping declared checksum");
                return Ok(Stored {
                    tarball: url.to_string(),
                    checksum: dist.shasum.clone(),
                    size: 0,
                });
            },
            StatusCode::OK => {},
            status => exn::bail!(ErrorKind::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
                descriptor: Box::new(candidate.descriptor.clone()),
            }),
        }

        let mut file = fs::File::create(temp).await.or_raise(|| ErrorKind::Io)?;
        while let Some(chunk) = response.chunk().await.or_raise(|| ErrorKind::Transfer)? {
            file.write_all(&chunk).await.or_raise(|| ErrorKind::Io)?;
        }
        file.flush().await.or_raise(|| ErrorKind::Io)?;
        drop(file);

        let (computed, size) = sha1_file(temp).await.or_raise(|| ErrorKind::Io)?;
        if computed != dist.shasum {
            exn::bail!(ErrorKind::ChecksumMismatch {
                url: url.to_string(),
                computed,
                expected: dist.shasum.clone(),
                descriptor: Box::new(candidate.descriptor.clone()),
            });
        }

        let key = (self.ctx.config.key)(&candidate.descriptor.name, filename);
        let info = self
            .ctx
            .storage
            .upload(temp, Path::new(&key), size)
            .await
            .or_raise(|| ErrorKind::StorageWriteFailed)?;
        Ok(Stored {
            tarball: info.url,
            checksum: computed,
            size,
        })
    }

    async fn persist(&self, index: usize, candidate: Candidate, stored: Stored) -> Result<SyncedVersion> {
        let Candidate { mut descriptor, publish_time, .. } = candidate;
        let author = descriptor.first_maintainer().unwrap_or(self.username).to_string();
        let extra = descriptor.dist.take().map(|dist| dist.extra).unwrap_or_default();
        descriptor.dist = Some(Dist {
            tarball: stored.tarball.clone(),
            shasum: stored.checksum.clone(),
            size: Some(stored.size),
            noattachment: Some(stored.size == 0),
            extra,
        });

        let version = NewVersion {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            author: author.clone(),
            description: descriptor.description.clone(),
            checksum: stored.checksum.clone(),
            publish_time,
            package: descriptor,
        };
        let id = self.ctx.catalog.insert_version(&version).await.or_raise(|| ErrorKind::CatalogWriteFailed)?;

        self.log
            .line(format!(
                "    [{}:{index}] done, insertId: {id}, author: {author}, version: {}, size: {}, publish_time: {}",
                version.name,
                version.version,
                stored.size,
                format_millis(publish_time),
            ))
            .await;
        Ok(SyncedVersion {
            id,
            version: version.version,
            tarball: stored.tarball,
            checksum: stored.checksum,
            size: stored.size,
        })
    }
}

/// Last path segment of a tarball URL.
pub(crate) fn tarball_filename(url: &str) -> Result<String> {
    let parsed = Url::parse(url).or_raise(|| ErrorKind::InvalidTarballUrl(url.to_string()))?;
    match parsed.path_segments().and_then(|mut segments| segments.next_back()) {
        Some(segment) if !segment.is_empty() && segment != "." && segment != ".." => Ok(segment.to_string()),
        _ => exn::bail!(ErrorKind::InvalidTarballUrl(url.to_string())),
    }
}

async fn remove_temp(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {},
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {},
        Err(error) => tracing::debug!(%error, path = %path.display(), "Could not remove temporary download"),
    }
}

fn format_millis(millis: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| millis.to_string())
}
