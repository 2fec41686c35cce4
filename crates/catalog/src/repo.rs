//! Catalog and activity-log queries.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{LogRecord, LogRow, NewVersion, NewVersionRow, TagRecord, VersionRecord, VersionRow};
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::SqlitePool;
use time::OffsetDateTime;

/// Mirrored versions and dist-tags.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Every version row for `name`, most recently created first.
    async fn list_versions(&self, name: &str) -> Result<Vec<VersionRecord>>;

    async fn list_tags(&self, name: &str) -> Result<Vec<TagRecord>>;

    /// Insert a version, replacing the existing row for the same
    /// `(name, version)`. Returns the row id, which is stable across
    /// replacements.
    async fn insert_version(&self, version: &NewVersion) -> Result<i64>;

    /// Point `tag` at `version`, linking it to the version's row if the
    /// version is mirrored.
    async fn add_tag(&self, name: &str, tag: &str, version: &str) -> Result<TagRecord>;

    /// Fails with [`NotFound`](ErrorKind::NotFound) if no row has `id`.
    async fn update_description(&self, id: i64, description: &str) -> Result<()>;
}

/// Append-only, per-job activity log.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    /// Start a new log for a job syncing `name` on behalf of `username`.
    async fn create(&self, name: &str, username: &str) -> Result<i64>;

    async fn append(&self, id: i64, line: &str) -> Result<()>;

    async fn read(&self, id: i64) -> Result<Option<LogRecord>>;
}

#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}
impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn now() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }
}

#[async_trait]
impl Catalog for Repository {
    async fn list_versions(&self, name: &str) -> Result<Vec<VersionRecord>> {
        let rows: Vec<VersionRow> = sqlx::query_as(include_str!("../queries/select_versions_by_name.sql"))
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(VersionRecord::try_from).collect()
    }

    async fn list_tags(&self, name: &str) -> Result<Vec<TagRecord>> {
        sqlx::query_as::<_, TagRecord>(include_str!("../queries/select_tags_by_name.sql"))
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    #[tracing::instrument(skip_all, fields(name = %version.name, version = %version.version))]
    async fn insert_version(&self, version: &NewVersion) -> Result<i64> {
        let row = NewVersionRow::try_from(version)?;
        let (id,): (i64,) = sqlx::query_as(include_str!("../queries/upsert_version.sql"))
            .bind(row.name)
            .bind(row.version)
            .bind(row.author)
            .bind(row.description)
            .bind(row.checksum)
            .bind(row.publish_time)
            .bind(row.package)
            .bind(Self::now())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(id, "Stored version");
        Ok(id)
    }

    async fn add_tag(&self, name: &str, tag: &str, version: &str) -> Result<TagRecord> {
        sqlx::query_as::<_, TagRecord>(include_str!("../queries/upsert_tag.sql"))
            .bind(name)
            .bind(tag)
            .bind(version)
            .bind(Self::now())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    async fn update_description(&self, id: i64, description: &str) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/update_description.sql"))
            .bind(id)
            .bind(description)
            .bind(Self::now())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound("version"));
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityLog for Repository {
    async fn create(&self, name: &str, username: &str) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(include_str!("../queries/insert_log.sql"))
            .bind(name)
            .bind(username)
            .bind(Self::now())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(id)
    }

    async fn append(&self, id: i64, line: &str) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/append_log.sql"))
            .bind(id)
            .bind(line)
            .bind(Self::now())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound("sync log"));
        }
        Ok(())
    }

    async fn read(&self, id: i64) -> Result<Option<LogRecord>> {
        let row: Option<LogRow> = sqlx::query_as(include_str!("../queries/select_log.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(LogRecord::try_from).transpose()
    }
}
