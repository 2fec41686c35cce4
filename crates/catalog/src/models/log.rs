use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use time::OffsetDateTime;

/// The activity log of one sync job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub id: i64,
    /// Package name the job was started for.
    pub name: String,
    pub username: String,
    /// Newline-terminated log lines.
    pub log: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
impl LogRecord {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.log.lines()
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LogRow {
    id: i64,
    name: String,
    username: String,
    log: String,
    created_at: i64,
    updated_at: i64,
}
impl TryFrom<LogRow> for LogRecord {
    type Error = Error;
    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            username: row.username,
            log: row.log,
            created_at: OffsetDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("log creation date"))?,
            updated_at: OffsetDateTime::from_unix_timestamp(row.updated_at)
                .or_raise(|| ErrorKind::InvalidData("log update date"))?,
        })
    }
}
