//! Database connection and pool management.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// Sync jobs write sequentially; the fan-out phases are the only bursts.
const MAX_CONNECTIONS: u32 = 4;

/// Connection pool for the catalog database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Query-based PRAGMAs must be applied to every pooled connection,
            // not just the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open (creating if needed) the catalog database at `path` and run
    /// migrations. Missing parent directories are created.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database)?;
        }
        tracing::debug!(path = %path.display(), "Opening catalog database");
        let options = Self::base_options().filename(path).create_if_missing(true);
        Self::new(options, MAX_CONNECTIONS).await
    }

    /// Connect to an in-memory database.
    ///
    /// Not gated behind `#[cfg(test)]` so dependent crates can use it in
    /// their own tests. The database is gone once the pool closes.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // Every in-memory connection is its own database, so the pool is
        // limited to exactly one.
        Self::new(options, 1).await
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // Description and tag writes are fanned out concurrently and
            // contend for the single WAL writer.
            .busy_timeout(Duration::from_millis(5000))
    }

    /// PRAGMAs not exposed via [`SqliteConnectOptions`].
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA wal_autocheckpoint = 1000;
                PRAGMA temp_store = MEMORY;
                PRAGMA cache_size = -4096;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    #[instrument("performing database migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for all connections to be returned, then close the pool.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}
