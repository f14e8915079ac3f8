//! Retention cleanup: dedup records by folder date, log files by mtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use uposs_core::{format_folder_date, DateWindow, Error, LogSink, Result};
use uposs_db::SqliteCopyRecordRepository;

/// A directory holding log files, optionally restricted to names with a
/// given prefix (daily appenders add a date suffix to the prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLocation {
    pub dir: PathBuf,
    pub prefix: Option<String>,
}

impl LogLocation {
    /// Every file under `dir`.
    pub fn all(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: None,
        }
    }

    /// Files directly in `dir` whose name starts with `prefix`.
    pub fn prefixed(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: Some(prefix.into()),
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        match &self.prefix {
            None => true,
            Some(prefix) => {
                path.parent() == Some(self.dir.as_path())
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(prefix.as_str()))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Records deleted, or that would be deleted on a dry run.
    pub records: u64,
    /// Log files deleted, or that would be deleted on a dry run.
    pub log_files: usize,
    pub log_bytes: u64,
    pub dry_run: bool,
}

pub struct RetentionCleaner {
    records: SqliteCopyRecordRepository,
    logs: Vec<LogLocation>,
    sink: Arc<dyn LogSink>,
}

impl RetentionCleaner {
    pub fn new(
        records: SqliteCopyRecordRepository,
        logs: Vec<LogLocation>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            records,
            logs,
            sink,
        }
    }

    /// Delete records whose `copy_dir` lies in `window` (both task kinds),
    /// compact the database, then delete log files last modified inside
    /// `window`. With `dry_run` nothing is deleted.
    pub async fn clean(&self, window: DateWindow, dry_run: bool) -> Result<RetentionReport> {
        let start = format_folder_date(window.start);
        let end = format_folder_date(window.end);
        let mut report = RetentionReport {
            dry_run,
            ..Default::default()
        };

        if dry_run {
            report.records = u64::try_from(self.records.count_copy_dir_range(&start, &end).await?)
                .unwrap_or_default();
        } else {
            report.records = self.records.purge_copy_dir_range(&start, &end).await?;
            self.records.vacuum().await?;
        }

        let candidates = self.expired_logs(window).await?;
        for (path, size) in candidates {
            if !dry_run {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(file = %path.display(), error = %e, "Failed to delete log file");
                    self.sink
                        .warn(&format!("Could not delete {}: {e}", path.display()));
                    continue;
                }
            }
            debug!(file = %path.display(), dry_run, "Log file expired");
            report.log_files += 1;
            report.log_bytes += size;
        }

        info!(
            subsystem = "jobs",
            component = "retention",
            op = "clean",
            window = %window.label(),
            records = report.records,
            log_files = report.log_files,
            dry_run,
            "Retention cleanup complete"
        );
        let verb = if dry_run { "Would delete" } else { "Deleted" };
        self.sink.info(&format!(
            "{verb} {} record(s) and {} log file(s) for {}",
            report.records,
            report.log_files,
            window.label()
        ));
        Ok(report)
    }

    async fn expired_logs(&self, window: DateWindow) -> Result<Vec<(PathBuf, u64)>> {
        let logs = self.logs.clone();
        tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            for location in &logs {
                if !location.dir.is_dir() {
                    continue;
                }
                let depth = if location.prefix.is_some() { 1 } else { usize::MAX };
                for entry in WalkDir::new(&location.dir)
                    .max_depth(depth)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                {
                    if !location.accepts(entry.path()) {
                        continue;
                    }
                    let Ok(meta) = entry.metadata() else { continue };
                    let Ok(modified) = meta.modified() else { continue };
                    let day = DateTime::<Local>::from(modified).date_naive();
                    if window.contains(day) {
                        found.push((entry.path().to_path_buf(), meta.len()));
                    }
                }
            }
            found
        })
        .await
        .map_err(|e| Error::Internal(format!("log scan task failed: {e}")))
    }
}
