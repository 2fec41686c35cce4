use regmirror_catalog::LogHandle;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const TIMESTAMP: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Writer for one job's activity log.
///
/// Every line is prefixed with a UTC timestamp and mirrored to `tracing`.
/// Appending is best-effort: a failed write is reported as a warning and
/// otherwise ignored, so logging can never abort a job.
#[derive(Clone)]
pub struct JobLog {
    id: i64,
    sink: LogHandle,
}

impl JobLog {
    pub fn new(id: i64, sink: LogHandle) -> Self {
        Self { id, sink }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub async fn line(&self, message: impl AsRef<str>) {
        let line = format!("[{}] {}", timestamp(OffsetDateTime::now_utc()), message.as_ref());
        tracing::debug!(log_id = self.id, "{line}");
        if let Err(error) = self.sink.append(self.id, &line).await {
            tracing::warn!(log_id = self.id, error = ?error, "Could not append to activity log");
        }
    }
}

fn timestamp(now: OffsetDateTime) -> String {
    let utc = now.to_offset(time::UtcOffset::UTC);
    utc.format(TIMESTAMP).unwrap_or_else(|_| utc.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use regmirror_catalog::{ActivityLog, Database, Repository};
    use std::sync::Arc;
    use time::macros::datetime;

    #[test]
    fn test_timestamp_is_utc() {
        assert_eq!(timestamp(datetime!(2026-03-04 05:06:07 UTC)), "2026-03-04 05:06:07");
        assert_eq!(timestamp(datetime!(2026-03-04 05:06:07 +02:00)), "2026-03-04 03:06:07");
    }

    #[tokio::test]
    async fn test_lines_are_appended() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Arc::new(Repository::from(&db));
        let id = repo.create("a", "admin").await.unwrap();
        let log = JobLog::new(id, repo.clone());
        log.line("first").await;
        log.line(format!("second {}", 2)).await;

        let record = repo.read(id).await.unwrap().unwrap();
        let lines: Vec<_> = record.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('[') && lines[0].ends_with("] first"));
        assert!(lines[1].ends_with("] second 2"));
    }

    #[tokio::test]
    async fn test_append_failure_is_swallowed() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Arc::new(Repository::from(&db));
        // No log with this id exists.
        JobLog::new(404, repo).line("goes nowhere").await;
    }
}
