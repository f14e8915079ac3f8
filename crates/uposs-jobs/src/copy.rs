//! Dedup-aware Copy Engine.
//!
//! Mirrors a source tree into staging, streaming each file in fixed-size
//! chunks. A file already recorded in the dedup store for the same task kind
//! is skipped, so copying the same source twice is a no-op.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use uposs_core::{
    matches_order_filter, DedupStore, Error, FolderMatcher, LogSink, NewCopyRecord, Result,
    TaskKind,
};

/// Per-call copy parameters.
#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub kind: TaskKind,
    /// Bytes per read/write iteration. Must be non-zero.
    pub chunk_size: usize,
    /// Order tokens a file name must contain (bounded kind only).
    pub candidate_filter: Vec<String>,
    /// Window label stored with bounded records.
    pub date_range: Option<String>,
}

impl CopyRequest {
    pub fn new(kind: TaskKind, chunk_size: usize) -> Self {
        Self {
            kind,
            chunk_size,
            candidate_filter: Vec::new(),
            date_range: None,
        }
    }

    pub fn with_candidate_filter(mut self, filter: Vec<String>) -> Self {
        self.candidate_filter = filter;
        self
    }

    pub fn with_date_range(mut self, label: Option<String>) -> Self {
        self.date_range = label;
        self
    }

    fn accepts(&self, file_name: &str) -> bool {
        self.kind != TaskKind::Bounded || matches_order_filter(file_name, &self.candidate_filter)
    }
}

/// Counters for one copy call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub folders: usize,
    pub copied: usize,
    pub skipped_existing: usize,
    pub skipped_filtered: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl CopyReport {
    fn absorb(&mut self, other: CopyReport) {
        self.folders += other.folders;
        self.copied += other.copied;
        self.skipped_existing += other.skipped_existing;
        self.skipped_filtered += other.skipped_filtered;
        self.failed += other.failed;
        self.bytes += other.bytes;
    }
}

pub struct CopyEngine {
    store: Arc<dyn DedupStore>,
    sink: Arc<dyn LogSink>,
}

impl CopyEngine {
    pub fn new(store: Arc<dyn DedupStore>, sink: Arc<dyn LogSink>) -> Self {
        Self { store, sink }
    }

    /// Copy every date folder under `source_root` accepted by `matcher` into
    /// `staging_root/<folder name>`. Matched folders are not descended into
    /// further; their whole subtree is copied.
    pub async fn sync_matched_folders(
        &self,
        source_root: &Path,
        staging_root: &Path,
        matcher: &FolderMatcher,
        request: &CopyRequest,
    ) -> Result<CopyReport> {
        if request.chunk_size == 0 {
            return Err(Error::InvalidInput("chunk size must be greater than 0".into()));
        }
        if !source_root.is_dir() {
            return Err(Error::Config(format!(
                "source folder not found: {}",
                source_root.display()
            )));
        }

        let root = source_root.to_path_buf();
        let matcher = *matcher;
        let folders = tokio::task::spawn_blocking(move || matched_folders(&root, &matcher))
            .await
            .map_err(|e| Error::Internal(format!("folder scan panicked: {e}")))?;

        if folders.is_empty() {
            self.sink.info("No matching date folders in source");
            return Ok(CopyReport::default());
        }

        let mut total = CopyReport::default();
        for folder in folders {
            let Some(name) = folder.file_name().map(|n| n.to_owned()) else {
                continue;
            };
            self.sink
                .info(&format!("Copying folder {}", name.to_string_lossy()));
            let report = self
                .copy_tree(&folder, &staging_root.join(&name), request)
                .await?;
            total.absorb(report);
            total.folders += 1;
        }
        Ok(total)
    }

    /// Recursively mirror `src` into `dst`.
    ///
    /// Unreadable entries (dangling links, unlistable subdirectories, per-file
    /// read/write failures) are logged, counted as failed and skipped. Failing
    /// to list `src` itself or to create a destination directory aborts the
    /// call.
    pub async fn copy_tree(&self, src: &Path, dst: &Path, request: &CopyRequest) -> Result<CopyReport> {
        if request.chunk_size == 0 {
            return Err(Error::InvalidInput("chunk size must be greater than 0".into()));
        }

        let start = Instant::now();
        let mut report = CopyReport::default();
        let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];

        while let Some((src_dir, dst_dir)) = pending.pop() {
            tokio::fs::create_dir_all(&dst_dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("cannot create {}: {e}", dst_dir.display()),
                ))
            })?;

            let mut entries = match tokio::fs::read_dir(&src_dir).await {
                Ok(entries) => entries,
                Err(e) if src_dir.as_path() == src => return Err(e.into()),
                Err(e) => {
                    self.skip_entry(&src_dir, &e, &mut report);
                    continue;
                }
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        self.skip_entry(&src_dir, &e, &mut report);
                        break;
                    }
                };
                let path = entry.path();
                let target = dst_dir.join(entry.file_name());
                // Follows symlinks; a dangling link fails here.
                let metadata = match tokio::fs::metadata(&path).await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        self.skip_entry(&path, &e, &mut report);
                        continue;
                    }
                };
                if metadata.is_dir() {
                    pending.push((path, target));
                } else if metadata.is_file() {
                    self.copy_file(&path, &target, request, &mut report).await;
                }
            }
        }

        info!(
            subsystem = "jobs",
            component = "copy",
            op = "copy_tree",
            task = %request.kind,
            src = %src.display(),
            copied = report.copied,
            skipped = report.skipped_existing,
            failed = report.failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Copy tree complete"
        );
        Ok(report)
    }

    fn skip_entry(&self, path: &Path, error: &std::io::Error, report: &mut CopyReport) {
        warn!(path = %path.display(), error = %error, "Skipping unreadable source entry");
        self.sink
            .warn(&format!("Skipping unreadable {}: {error}", path.display()));
        report.failed += 1;
    }

    async fn copy_file(&self, src: &Path, dst: &Path, request: &CopyRequest, report: &mut CopyReport) {
        let file_name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !request.accepts(&file_name) {
            trace!(file = %file_name, "Not in order filter, skipping");
            report.skipped_filtered += 1;
            return;
        }

        match self.store.exists(request.kind, &file_name).await {
            Ok(true) => {
                debug!(file = %file_name, task = %request.kind, "Already copied, skipping");
                report.skipped_existing += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(file = %file_name, error = %e, "Dedup lookup failed, copying anyway");
                self.sink
                    .warn(&format!("Dedup lookup failed for {file_name}: {e}"));
            }
        }

        match stream_copy(src, dst, request.chunk_size).await {
            Ok(bytes) => {
                report.copied += 1;
                report.bytes += bytes;
            }
            Err(e) => {
                self.sink
                    .error(&format!("Copy failed for {}: {e}", src.display()));
                if let Err(e) = tokio::fs::remove_file(dst).await {
                    debug!(file = %dst.display(), error = %e, "Partial file cleanup failed");
                }
                report.failed += 1;
                return;
            }
        }

        let copy_dir = src
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let record = NewCopyRecord {
            task_kind: request.kind,
            file_name: file_name.clone(),
            copy_dir,
            date_range: match request.kind {
                TaskKind::Bounded => request.date_range.clone(),
                TaskKind::Continuous => None,
            },
        };
        if let Err(e) = self.store.record(&record).await {
            self.sink
                .error(&format!("Copied {file_name} but could not record it: {e}"));
        } else {
            self.sink.info(&format!("Copied {file_name}"));
        }
    }
}

/// Stream `src` into `dst` in `chunk_size` pieces. Returns bytes written.
async fn stream_copy(src: &Path, dst: &Path, chunk_size: usize) -> Result<u64> {
    let mut reader = File::open(src).await?;
    let mut writer = File::create(dst).await?;
    let mut buf = vec![0u8; chunk_size];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    writer.flush().await?;
    Ok(total)
}

/// Directories under `root` whose name the matcher accepts, sorted.
fn matched_folders(root: &Path, matcher: &FolderMatcher) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable source entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if matcher.matches(&entry.file_name().to_string_lossy()) {
            found.push(entry.into_path());
            walker.skip_current_dir();
        }
    }
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;
    use uposs_core::MemorySink;

    /// Dedup store backed by a set, recording every insert.
    #[derive(Default)]
    struct SetStore {
        rows: Mutex<HashSet<(TaskKind, String)>>,
        inserts: Mutex<Vec<NewCopyRecord>>,
    }

    #[async_trait]
    impl DedupStore for SetStore {
        async fn exists(&self, kind: TaskKind, file_name: &str) -> Result<bool> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .contains(&(kind, file_name.to_string())))
        }

        async fn record(&self, record: &NewCopyRecord) -> Result<()> {
            self.rows
                .lock()
                .unwrap()
                .insert((record.task_kind, record.file_name.clone()));
            self.inserts.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn remove(&self, file_name: &str) -> Result<u64> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|(_, n)| n != file_name);
            Ok((before - rows.len()) as u64)
        }
    }

    fn engine(store: Arc<SetStore>) -> CopyEngine {
        CopyEngine::new(store, Arc::new(MemorySink::new()))
    }

    fn write(path: &Path, bytes: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[tokio::test]
    async fn test_zero_chunk_size_is_rejected_without_io() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("dst");
        let err = engine(Arc::default())
            .copy_tree(tmp.path(), &dst, &CopyRequest::new(TaskKind::Continuous, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!dst.exists());
    }

    #[tokio::test]
    async fn test_copy_mirrors_tree_with_small_chunks() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("2025.01.01");
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        write(&src.join("a.jpg"), &payload);
        write(&src.join("sub").join("b.jpg"), b"bee");

        let store = Arc::new(SetStore::default());
        let dst = tmp.path().join("staging").join("2025.01.01");
        let report = engine(store.clone())
            .copy_tree(&src, &dst, &CopyRequest::new(TaskKind::Continuous, 7))
            .await
            .unwrap();

        assert_eq!(report.copied, 2);
        assert_eq!(std::fs::read(dst.join("a.jpg")).unwrap(), payload);
        assert_eq!(std::fs::read(dst.join("sub").join("b.jpg")).unwrap(), b"bee");

        let inserts = store.inserts.lock().unwrap();
        let b = inserts.iter().find(|r| r.file_name == "b.jpg").unwrap();
        assert_eq!(b.copy_dir, "sub");
        assert!(b.date_range.is_none());
    }

    #[tokio::test]
    async fn test_second_copy_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src.join("a.jpg"), b"data");
        let dst = tmp.path().join("dst");

        let store = Arc::new(SetStore::default());
        let eng = engine(store.clone());
        let req = CopyRequest::new(TaskKind::Continuous, 1024);
        eng.copy_tree(&src, &dst, &req).await.unwrap();
        let second = eng.copy_tree(&src, &dst, &req).await.unwrap();

        assert_eq!(second.copied, 0);
        assert_eq!(second.skipped_existing, 1);
        assert_eq!(store.inserts.lock().unwrap().len(), 1);
        assert_eq!(std::fs::read_dir(&dst).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_kinds_copy_independently() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src.join("a.jpg"), b"data");

        let store = Arc::new(SetStore::default());
        let eng = engine(store.clone());
        eng.copy_tree(&src, &tmp.path().join("d1"), &CopyRequest::new(TaskKind::Continuous, 64))
            .await
            .unwrap();
        let report = eng
            .copy_tree(&src, &tmp.path().join("d2"), &CopyRequest::new(TaskKind::Bounded, 64))
            .await
            .unwrap();
        assert_eq!(report.copied, 1);
    }

    #[tokio::test]
    async fn test_candidate_filter_applies_to_bounded_only() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src.join("SO1-a.jpg"), b"1");
        write(&src.join("SO2-a.jpg"), b"2");
        let filter = vec!["SO1".to_string()];

        let store = Arc::new(SetStore::default());
        let eng = engine(store.clone());
        let bounded = CopyRequest::new(TaskKind::Bounded, 64)
            .with_candidate_filter(filter.clone())
            .with_date_range(Some("2025.01.01-2025.01.02".into()));
        let report = eng
            .copy_tree(&src, &tmp.path().join("b"), &bounded)
            .await
            .unwrap();
        assert_eq!(report.copied, 1);
        assert_eq!(report.skipped_filtered, 1);
        assert!(!tmp.path().join("b").join("SO2-a.jpg").exists());
        assert_eq!(
            store.inserts.lock().unwrap()[0].date_range.as_deref(),
            Some("2025.01.01-2025.01.02")
        );

        let continuous =
            CopyRequest::new(TaskKind::Continuous, 64).with_candidate_filter(filter);
        let report = eng
            .copy_tree(&src, &tmp.path().join("c"), &continuous)
            .await
            .unwrap();
        assert_eq!(report.copied, 2);
    }

    #[tokio::test]
    async fn test_sync_matched_folders_selects_window() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source");
        write(&source.join("2025.01.01").join("a.jpg"), b"a");
        write(&source.join("2025.01.05").join("b.jpg"), b"b");
        write(&source.join("misc").join("2025.01.02").join("c.jpg"), b"c");
        write(&source.join("notes").join("d.jpg"), b"d");
        let staging = tmp.path().join("staging");

        let matcher = FolderMatcher::bounded("2025.01.01", "2025.01.02");
        let report = engine(Arc::default())
            .sync_matched_folders(
                &source,
                &staging,
                &matcher,
                &CopyRequest::new(TaskKind::Bounded, 16),
            )
            .await
            .unwrap();

        assert_eq!(report.folders, 2);
        assert!(staging.join("2025.01.01").join("a.jpg").exists());
        assert!(staging.join("2025.01.02").join("c.jpg").exists());
        assert!(!staging.join("2025.01.05").exists());
        assert!(!staging.join("notes").exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let err = engine(Arc::default())
            .sync_matched_folders(
                &tmp.path().join("absent"),
                tmp.path(),
                &FolderMatcher::bounded("2025.01.01", "2025.01.02"),
                &CopyRequest::new(TaskKind::Bounded, 16),
            )
            .await
            .unwrap_err();
        assert!(err.is_config());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_is_counted_and_skipped() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src.join("a.jpg"), b"a");
        write(&src.join("sub").join("b.jpg"), b"b");
        write(&src.join("z.jpg"), b"z");
        std::os::unix::fs::symlink(src.join("gone.jpg"), src.join("broken.jpg")).unwrap();

        let sink = Arc::new(MemorySink::new());
        let dst = tmp.path().join("dst");
        let report = CopyEngine::new(Arc::new(SetStore::default()), sink.clone())
            .copy_tree(&src, &dst, &CopyRequest::new(TaskKind::Continuous, 16))
            .await
            .unwrap();

        assert_eq!(report.copied, 3);
        assert_eq!(report.failed, 1);
        assert!(dst.join("z.jpg").exists());
        assert!(dst.join("sub").join("b.jpg").exists());
        assert!(!dst.join("broken.jpg").exists());
        assert!(sink.contains("Skipping unreadable"));
    }

    #[tokio::test]
    async fn test_unwritable_target_is_counted_and_left_alone() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src.join("a.jpg"), b"a");
        write(&src.join("b.jpg"), b"b");
        let dst = tmp.path().join("dst");
        std::fs::create_dir_all(dst.join("a.jpg").join("inner")).unwrap();

        let sink = Arc::new(MemorySink::new());
        let store = Arc::new(SetStore::default());
        let report = CopyEngine::new(store.clone(), sink.clone())
            .copy_tree(&src, &dst, &CopyRequest::new(TaskKind::Continuous, 16))
            .await
            .unwrap();

        assert_eq!(report.copied, 1);
        assert_eq!(report.failed, 1);
        assert!(dst.join("a.jpg").join("inner").is_dir());
        assert_eq!(std::fs::read(dst.join("b.jpg")).unwrap(), b"b");
        assert!(sink.contains("Copy failed"));
        assert!(!store.inserts.lock().unwrap().iter().any(|r| r.file_name == "a.jpg"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_destination_creation_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src.join("a.jpg"), b"a");
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"file, not dir").unwrap();

        let result = engine(Arc::default())
            .copy_tree(&src, &blocker.join("dst"), &CopyRequest::new(TaskKind::Continuous, 16))
            .await;
        assert!(result.is_err());
    }
}
