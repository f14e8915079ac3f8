//! Copy record repository: the dedup store consulted at copy time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

use uposs_core::defaults::COPY_STATUS_COPIED;
use uposs_core::{CopyRecord, DedupStore, Error, NewCopyRecord, Result, TaskKind};

const SELECT_COLUMNS: &str =
    "SELECT id, task_kind, file_name, copy_dir, date_range, copy_time, status FROM copy_records";

/// SQLite copy record repository.
#[derive(Clone)]
pub struct SqliteCopyRecordRepository {
    pool: Pool<Sqlite>,
}

impl SqliteCopyRecordRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// List records of one task kind, newest first, optionally limited to a
    /// single date folder.
    pub async fn list(
        &self,
        kind: TaskKind,
        copy_dir: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CopyRecord>> {
        let rows = match copy_dir {
            Some(dir) => {
                sqlx::query(&format!(
                    "{SELECT_COLUMNS} WHERE task_kind = ? AND copy_dir = ?
                     ORDER BY copy_time DESC, id DESC LIMIT ? OFFSET ?"
                ))
                .bind(kind.as_str())
                .bind(dir)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "{SELECT_COLUMNS} WHERE task_kind = ?
                     ORDER BY copy_time DESC, id DESC LIMIT ? OFFSET ?"
                ))
                .bind(kind.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    /// List bounded-task records copied under a window label (`start-end`).
    pub async fn list_by_date_range(
        &self,
        label: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CopyRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE task_kind = ? AND date_range = ?
             ORDER BY copy_time DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(TaskKind::Bounded.as_str())
        .bind(label)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    /// Records whose file name contains `needle`, across task kinds.
    pub async fn search(&self, needle: &str, limit: i64) -> Result<Vec<CopyRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE instr(file_name, ?) > 0
             ORDER BY copy_time DESC, id DESC LIMIT ?"
        ))
        .bind(needle)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    /// Number of records held for a task kind.
    pub async fn count(&self, kind: TaskKind) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM copy_records WHERE task_kind = ?")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.try_get("n").map_err(Error::Database)
    }

    /// Number of records whose `copy_dir` lies in `[start, end]`.
    ///
    /// Date folder names sort lexically in date order, so a string range
    /// is a date range.
    pub async fn count_copy_dir_range(&self, start: &str, end: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM copy_records WHERE copy_dir BETWEEN ? AND ?",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.try_get("n").map_err(Error::Database)
    }

    /// Delete records of both kinds whose `copy_dir` lies in `[start, end]`.
    pub async fn purge_copy_dir_range(&self, start: &str, end: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM copy_records WHERE copy_dir BETWEEN ? AND ?")
            .bind(start)
            .bind(end)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "copy_records",
            op = "purge",
            start,
            end,
            removed = result.rows_affected(),
            "Purged copy records"
        );
        Ok(result.rows_affected())
    }

    /// Reclaim space after a purge.
    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        debug!(subsystem = "db", component = "copy_records", op = "vacuum", "Vacuum complete");
        Ok(())
    }

    fn parse_row(row: &SqliteRow) -> Result<CopyRecord> {
        let kind: String = row.try_get("task_kind").map_err(Error::Database)?;
        let copy_time: DateTime<Utc> = row.try_get("copy_time").map_err(Error::Database)?;
        Ok(CopyRecord {
            id: row.try_get("id").map_err(Error::Database)?,
            task_kind: kind.parse()?,
            file_name: row.try_get("file_name").map_err(Error::Database)?,
            copy_dir: row.try_get("copy_dir").map_err(Error::Database)?,
            date_range: row.try_get("date_range").map_err(Error::Database)?,
            copy_time,
            status: row.try_get("status").map_err(Error::Database)?,
        })
    }
}

#[async_trait]
impl DedupStore for SqliteCopyRecordRepository {
    async fn exists(&self, kind: TaskKind, file_name: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM copy_records WHERE task_kind = ? AND file_name = ?) AS present",
        )
        .bind(kind.as_str())
        .bind(file_name)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        let present: bool = row.try_get("present").map_err(Error::Database)?;
        Ok(present)
    }

    async fn record(&self, record: &NewCopyRecord) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO copy_records
                (task_kind, file_name, copy_dir, date_range, copy_time, status)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.task_kind.as_str())
        .bind(&record.file_name)
        .bind(&record.copy_dir)
        .bind(&record.date_range)
        .bind(Utc::now())
        .bind(COPY_STATUS_COPIED)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn remove(&self, file_name: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM copy_records WHERE file_name = ?")
            .bind(file_name)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use tempfile::TempDir;

    async fn open() -> (TempDir, SqliteCopyRecordRepository) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("test.db")).await.unwrap();
        (dir, db.copy_records)
    }

    fn new_record(kind: TaskKind, name: &str, dir: &str) -> NewCopyRecord {
        NewCopyRecord {
            task_kind: kind,
            file_name: name.to_string(),
            copy_dir: dir.to_string(),
            date_range: None,
        }
    }

    #[tokio::test]
    async fn test_record_then_exists() {
        let (_dir, repo) = open().await;
        assert!(!repo.exists(TaskKind::Continuous, "a.jpg").await.unwrap());

        repo.record(&new_record(TaskKind::Continuous, "a.jpg", "2025.01.01"))
            .await
            .unwrap();
        assert!(repo.exists(TaskKind::Continuous, "a.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_kinds_do_not_cross_contaminate() {
        let (_dir, repo) = open().await;
        repo.record(&new_record(TaskKind::Continuous, "a.jpg", "2025.01.01"))
            .await
            .unwrap();
        assert!(!repo.exists(TaskKind::Bounded, "a.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_on_conflict_keeps_one_row() {
        let (_dir, repo) = open().await;
        repo.record(&new_record(TaskKind::Bounded, "a.jpg", "2025.01.01"))
            .await
            .unwrap();
        repo.record(&new_record(TaskKind::Bounded, "a.jpg", "2025.01.02"))
            .await
            .unwrap();

        assert_eq!(repo.count(TaskKind::Bounded).await.unwrap(), 1);
        let rows = repo.list(TaskKind::Bounded, None, 10, 0).await.unwrap();
        assert_eq!(rows[0].copy_dir, "2025.01.02");
        assert_eq!(rows[0].status, "copied");
    }

    #[tokio::test]
    async fn test_remove_clears_both_kinds() {
        let (_dir, repo) = open().await;
        for kind in TaskKind::ALL {
            repo.record(&new_record(kind, "bad.jpg", "2025.01.01"))
                .await
                .unwrap();
        }
        assert_eq!(repo.remove("bad.jpg").await.unwrap(), 2);
        assert!(!repo.exists(TaskKind::Continuous, "bad.jpg").await.unwrap());
        assert_eq!(repo.remove("bad.jpg").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let (_dir, repo) = open().await;
        for i in 0..5 {
            repo.record(&new_record(
                TaskKind::Continuous,
                &format!("f{i}.jpg"),
                if i < 3 { "2025.01.01" } else { "2025.01.02" },
            ))
            .await
            .unwrap();
        }

        let day1 = repo
            .list(TaskKind::Continuous, Some("2025.01.01"), 10, 0)
            .await
            .unwrap();
        assert_eq!(day1.len(), 3);

        let page = repo.list(TaskKind::Continuous, None, 2, 2).await.unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_list_by_date_range_and_search() {
        let (_dir, repo) = open().await;
        let mut rec = new_record(TaskKind::Bounded, "SO100-a.jpg", "2025.01.01");
        rec.date_range = Some("2025.01.01-2025.01.03".into());
        repo.record(&rec).await.unwrap();
        repo.record(&new_record(TaskKind::Continuous, "SO200-b.jpg", "2025.01.02"))
            .await
            .unwrap();

        let ranged = repo
            .list_by_date_range("2025.01.01-2025.01.03", 10, 0)
            .await
            .unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].file_name, "SO100-a.jpg");

        let hits = repo.search("SO", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        let hits = repo.search("%", 10).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_purge_copy_dir_range() {
        let (_dir, repo) = open().await;
        for (name, dir) in [
            ("a.jpg", "2024.12.31"),
            ("b.jpg", "2025.01.01"),
            ("c.jpg", "2025.01.15"),
            ("d.jpg", "2025.02.01"),
        ] {
            repo.record(&new_record(TaskKind::Continuous, name, dir))
                .await
                .unwrap();
        }
        repo.record(&new_record(TaskKind::Bounded, "e.jpg", "2025.01.20"))
            .await
            .unwrap();

        assert_eq!(
            repo.count_copy_dir_range("2025.01.01", "2025.01.31")
                .await
                .unwrap(),
            3
        );
        let removed = repo
            .purge_copy_dir_range("2025.01.01", "2025.01.31")
            .await
            .unwrap();
        assert_eq!(removed, 3);
        repo.vacuum().await.unwrap();
        assert_eq!(repo.count(TaskKind::Continuous).await.unwrap(), 2);
        assert_eq!(repo.count(TaskKind::Bounded).await.unwrap(), 0);
    }
}
