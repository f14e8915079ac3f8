//! Upload Orchestrator.
//!
//! For every image in staging: extract candidate order numbers, validate
//! them one by one, upload the file under `prefix/dateFolder/name`, report
//! the public URL to the push API and delete the local copy.
//!
//! Per-file outcomes:
//!
//! | Situation | Local file |
//! |-----------|------------|
//! | no candidate in the name | deleted |
//! | every candidate explicitly invalid | deleted |
//! | no valid candidate, at least one indeterminate | kept for next cycle |
//! | larger than the size gate | kept for next cycle |
//! | uploaded (push succeeded or not) | deleted |
//! | unreadable (dangling link, read error) | kept, counted as failed |
//!
//! Storage failures abort the whole pass with an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use uposs_core::defaults::STORAGE_PROBE_TIMEOUT_SECS;
use uposs_core::{
    extract_order_candidates, format_folder_date, is_image_path, local_today, Config, Error,
    FolderMatcher, LogSink, Result, TaskKind,
};
use uposs_remote::http::default_timeout;
use uposs_remote::{
    classify, content_type_for, object_key, public_object_url, ObjectStore, ObjectStoreProvider,
    PushClient, RetryPolicy, ValidationClient, Verdict,
};

/// Result of a pass that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Staging held no image files. Not an error, never alerted on.
    NothingToUpload,
    Completed(UploadReport),
}

impl UploadOutcome {
    /// Files pushed successfully (0 for an empty staging tree).
    pub fn pushed(&self) -> usize {
        match self {
            UploadOutcome::NothingToUpload => 0,
            UploadOutcome::Completed(report) => report.pushed,
        }
    }
}

/// Counters for one upload pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Uploaded and acknowledged by the push API.
    pub pushed: usize,
    /// Uploaded, push failed after retry; local file still removed.
    pub push_failed: usize,
    /// Stored in object storage.
    pub uploaded: usize,
    /// Deleted because the name held no order number.
    pub unparseable: usize,
    /// Deleted because every candidate was rejected.
    pub rejected: usize,
    /// Left in place: validation never gave a clear answer.
    pub indeterminate: usize,
    /// Left in place: above the size gate.
    pub oversized: usize,
    /// Left in place: folder outside the task window.
    pub out_of_window: usize,
    /// Left in place: the local file could not be inspected or read.
    pub failed: usize,
    /// Stopped early on the stop signal.
    pub interrupted: bool,
}

enum FileOutcome {
    Pushed,
    PushFailed,
    Unparseable,
    Rejected,
    Indeterminate,
    Oversized,
    Failed,
}

/// Runs upload passes against the object store built for each pass.
pub struct UploadOrchestrator {
    provider: Arc<dyn ObjectStoreProvider>,
    sink: Arc<dyn LogSink>,
    retry: RetryPolicy,
    http_timeout: Duration,
    probe_timeout: Duration,
}

impl UploadOrchestrator {
    pub fn new(provider: Arc<dyn ObjectStoreProvider>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            provider,
            sink,
            retry: RetryPolicy::transient(),
            http_timeout: default_timeout(),
            probe_timeout: Duration::from_secs(STORAGE_PROBE_TIMEOUT_SECS),
        }
    }

    /// Override the transient retry policy (validation and push).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the validation/push request timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Run one pass over `config.local_folder` for `kind`.
    pub async fn upload(
        &self,
        config: &Config,
        kind: TaskKind,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome> {
        let local_root = PathBuf::from(config.local_folder.trim());
        let files = list_images(&local_root).await?;
        if files.is_empty() {
            self.sink.info("Nothing to upload");
            return Ok(UploadOutcome::NothingToUpload);
        }

        let prefix = config.machine_code.trim();
        if prefix.is_empty() {
            return Err(Error::Config("machine_code is not configured".into()));
        }
        let bucket = config.bucket_name.trim();
        if bucket.is_empty() {
            return Err(Error::Config("bucket_name is not configured".into()));
        }

        let validator = ValidationClient::with_timeout(&config.api1, self.http_timeout)?;
        let pusher = PushClient::with_timeout(&config.api2, config.push_method, self.http_timeout)?;
        let store = self.provider.connect(config)?;
        self.probe(store.as_ref()).await?;
        self.ensure_bucket(store.as_ref(), bucket).await?;

        let today = local_today();
        let matcher = config
            .upload_matching_folders_only
            .then(|| FolderMatcher::for_task(kind, config, today));
        let ctx = PassContext {
            config,
            local_root: &local_root,
            prefix,
            bucket,
            today_folder: format_folder_date(today),
            store: store.as_ref(),
            validator: &validator,
            pusher: &pusher,
            cancel,
        };

        let start = Instant::now();
        let mut report = UploadReport::default();
        for path in files {
            if cancel.is_cancelled() {
                self.sink.info("Stop requested, ending upload pass early");
                report.interrupted = true;
                break;
            }
            if let Some(m) = &matcher {
                if !in_window(&path, &local_root, m) {
                    report.out_of_window += 1;
                    continue;
                }
            }
            match self.process_file(&ctx, &path).await? {
                FileOutcome::Pushed => report.pushed += 1,
                FileOutcome::PushFailed => report.push_failed += 1,
                FileOutcome::Unparseable => report.unparseable += 1,
                FileOutcome::Rejected => report.rejected += 1,
                FileOutcome::Indeterminate => report.indeterminate += 1,
                FileOutcome::Oversized => report.oversized += 1,
                FileOutcome::Failed => report.failed += 1,
            }
        }
        report.uploaded = report.pushed + report.push_failed;

        info!(
            subsystem = "jobs",
            component = "upload",
            op = "upload",
            task = %kind,
            bucket,
            pushed = report.pushed,
            push_failed = report.push_failed,
            indeterminate = report.indeterminate,
            failed = report.failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Upload pass complete"
        );
        self.sink.info(&format!(
            "Upload pass done: {} pushed, {} push failures, {} rejected, {} unparseable, {} pending, {} unreadable",
            report.pushed,
            report.push_failed,
            report.rejected,
            report.unparseable,
            report.indeterminate + report.oversized,
            report.failed
        ));
        Ok(UploadOutcome::Completed(report))
    }

    /// List buckets under a timeout to prove the service is reachable.
    async fn probe(&self, store: &dyn ObjectStore) -> Result<()> {
        match tokio::time::timeout(self.probe_timeout, store.list_buckets()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Storage(format!(
                "storage connection test timed out after {}s",
                self.probe_timeout.as_secs()
            ))),
        }
    }

    async fn ensure_bucket(&self, store: &dyn ObjectStore, bucket: &str) -> Result<()> {
        if store.bucket_exists(bucket).await? {
            self.sink.info(&format!("Bucket {bucket} exists"));
        } else {
            store.create_bucket(bucket).await?;
            self.sink.info(&format!("Bucket {bucket} created"));
        }
        Ok(())
    }

    async fn process_file(&self, ctx: &PassContext<'_>, path: &Path) -> Result<FileOutcome> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let candidates = extract_order_candidates(&file_name);
        if candidates.is_empty() {
            self.sink
                .warn(&format!("No order number in {file_name}, deleting"));
            self.delete_local(path).await;
            return Ok(FileOutcome::Unparseable);
        }

        let Some(resolved) = self.resolve_order(ctx, &file_name, &candidates).await? else {
            return Ok(FileOutcome::Indeterminate);
        };
        let order = match resolved {
            Resolved::Valid(order) => order,
            Resolved::AllInvalid => {
                self.sink.warn(&format!(
                    "Every order number in {file_name} was rejected, deleting"
                ));
                self.delete_local(path).await;
                return Ok(FileOutcome::Rejected);
            }
        };

        let size = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(e) => return Ok(self.unreadable(&file_name, &e)),
        };
        if let Some(limit) = ctx.config.max_upload_bytes() {
            if size > limit {
                self.sink.warn(&format!(
                    "{file_name} is {size} bytes, above the {limit} byte limit; keeping it"
                ));
                return Ok(FileOutcome::Oversized);
            }
        }

        let date_folder = match path.parent() {
            Some(parent) if parent != ctx.local_root => parent
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| ctx.today_folder.clone()),
            _ => ctx.today_folder.clone(),
        };
        let key = object_key(ctx.prefix, &date_folder, &file_name);
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(self.unreadable(&file_name, &e)),
        };
        let content_type = content_type_for(path, &bytes);
        ctx.store
            .put_object(ctx.bucket, &key, bytes, content_type)
            .await?;
        self.sink.info(&format!("Uploaded {file_name} to {}/{key}", ctx.bucket));

        let url = public_object_url(&ctx.config.public_base_url(), ctx.bucket, &key);
        let pushed = self
            .retry
            .run(ctx.cancel, self.sink.as_ref(), "push", |_| {
                ctx.pusher.push(&order, &url)
            })
            .await;

        let outcome = match pushed {
            Ok(_) => {
                self.sink.info(&format!("Pushed order {order} for {file_name}"));
                FileOutcome::Pushed
            }
            Err(e) => {
                warn!(file = %file_name, order = %order, error = %e, "Push failed after retry");
                self.sink.error(&format!(
                    "Push failed for order {order} ({file_name}): {e}; file already stored"
                ));
                FileOutcome::PushFailed
            }
        };
        self.delete_local(path).await;
        Ok(outcome)
    }

    /// Walk candidates in order. `None` means no clear answer for this
    /// cycle; the file stays.
    async fn resolve_order(
        &self,
        ctx: &PassContext<'_>,
        file_name: &str,
        candidates: &[String],
    ) -> Result<Option<Resolved>> {
        let mut indeterminate = false;
        for candidate in candidates {
            let looked_up = self
                .retry
                .run(ctx.cancel, self.sink.as_ref(), "validation", |_| {
                    ctx.validator.lookup(candidate)
                })
                .await;

            let verdict = match looked_up {
                Ok(body) => classify(
                    &body,
                    &ctx.config.api1_response1,
                    &ctx.config.api1_response2,
                ),
                Err(e) => {
                    self.sink.warn(&format!(
                        "Validation of {candidate} for {file_name} failed: {e}"
                    ));
                    Verdict::Indeterminate
                }
            };
            debug!(file = %file_name, order = %candidate, ?verdict, "Validation verdict");

            match verdict {
                Verdict::Valid => return Ok(Some(Resolved::Valid(candidate.clone()))),
                Verdict::Invalid => {
                    self.sink
                        .info(&format!("Order {candidate} rejected for {file_name}"));
                }
                Verdict::Indeterminate => indeterminate = true,
            }
            if ctx.cancel.is_cancelled() {
                indeterminate = true;
                break;
            }
        }

        if indeterminate {
            self.sink.warn(&format!(
                "No confirmed order for {file_name}; keeping it for the next cycle"
            ));
            Ok(None)
        } else {
            Ok(Some(Resolved::AllInvalid))
        }
    }

    fn unreadable(&self, file_name: &str, error: &std::io::Error) -> FileOutcome {
        warn!(file = %file_name, error = %error, "Cannot read staged file");
        self.sink
            .warn(&format!("Cannot read {file_name}: {error}; keeping it"));
        FileOutcome::Failed
    }

    async fn delete_local(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            self.sink
                .error(&format!("Cannot delete {}: {e}", path.display()));
        }
    }
}

enum Resolved {
    Valid(String),
    AllInvalid,
}

struct PassContext<'a> {
    config: &'a Config,
    local_root: &'a Path,
    prefix: &'a str,
    bucket: &'a str,
    today_folder: String,
    store: &'a dyn ObjectStore,
    validator: &'a ValidationClient,
    pusher: &'a PushClient,
    cancel: &'a CancellationToken,
}

/// Files directly under the staging root are always eligible; others need
/// their folder to pass the task's matcher.
fn in_window(path: &Path, local_root: &Path, matcher: &FolderMatcher) -> bool {
    match path.parent() {
        Some(parent) if parent != local_root => parent
            .file_name()
            .map(|n| matcher.matches(&n.to_string_lossy()))
            .unwrap_or(false),
        _ => true,
    }
}

/// Image files under `root`, sorted. Symlinks are listed unresolved so a
/// broken one surfaces as a per-file failure. A missing root has none.
pub async fn list_images(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut files: Vec<PathBuf> = WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                (e.file_type().is_file() || e.path_is_symlink()) && is_image_path(e.path())
            })
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    })
    .await
    .map_err(|e| Error::Internal(format!("staging scan panicked: {e}")))
}
