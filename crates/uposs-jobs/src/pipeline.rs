//! The per-cycle pipeline: copy → normalize → upload.
//!
//! [`Pipeline`] owns the long-lived collaborators (dedup store, object store
//! provider, retry policy). Each step takes the configuration loaded at the
//! start of the cycle so operators can change parameters between cycles.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use uposs_core::{
    local_today, Config, DedupStore, Error, FolderMatcher, LogSink, Result, TaskKind,
};
use uposs_remote::http::default_timeout;
use uposs_remote::{FailureReport, ObjectStoreProvider, RetryPolicy, WebhookNotifier};

use crate::copy::{CopyEngine, CopyReport, CopyRequest};
use crate::normalize::{ImageNormalizer, NormalizeReport};
use crate::upload::{UploadOrchestrator, UploadOutcome};

/// Shared collaborators for every cycle of every task.
pub struct Pipeline {
    config_path: PathBuf,
    store: Arc<dyn DedupStore>,
    provider: Arc<dyn ObjectStoreProvider>,
    retry: RetryPolicy,
    http_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        config_path: impl Into<PathBuf>,
        store: Arc<dyn DedupStore>,
        provider: Arc<dyn ObjectStoreProvider>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            store,
            provider,
            retry: RetryPolicy::transient(),
            http_timeout: default_timeout(),
        }
    }

    /// Override the fixed-delay retry used for API calls and the upload
    /// escalation.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the validation/push/webhook request timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Reload configuration from disk.
    pub fn load_config(&self) -> Result<Config> {
        Ok(Config::load(&self.config_path)?)
    }

    /// Folder match + copy for `kind`.
    ///
    /// The bounded kind requires a well-ordered window (start ≤ end ≤ today);
    /// anything else is a configuration error.
    pub async fn copy_step(
        &self,
        config: &Config,
        kind: TaskKind,
        order_filter: &[String],
        sink: Arc<dyn LogSink>,
    ) -> Result<CopyReport> {
        let chunk_size = config.chunk_size()?;
        let today = local_today();
        let (matcher, date_range) = match kind {
            TaskKind::Continuous => (FolderMatcher::continuous(today), None),
            TaskKind::Bounded => {
                let window = config.date_window().ok_or_else(|| {
                    Error::Config(format!(
                        "invalid date window {:?} - {:?}",
                        config.start_time, config.end_time
                    ))
                })?;
                if !window.is_well_ordered(today) {
                    return Err(Error::Config(format!(
                        "date window {} must satisfy start <= end <= today",
                        window.label()
                    )));
                }
                (
                    FolderMatcher::for_task(kind, config, today),
                    Some(config.date_window_label()),
                )
            }
        };

        let request = CopyRequest::new(kind, chunk_size)
            .with_candidate_filter(order_filter.to_vec())
            .with_date_range(date_range);
        CopyEngine::new(self.store.clone(), sink)
            .sync_matched_folders(
                Path::new(config.remote_folder.trim()),
                Path::new(config.local_folder.trim()),
                &matcher,
                &request,
            )
            .await
    }

    /// Normalize images in staging.
    pub async fn normalize_step(
        &self,
        config: &Config,
        sink: Arc<dyn LogSink>,
    ) -> Result<NormalizeReport> {
        ImageNormalizer::new(self.store.clone(), sink)
            .normalize_tree(
                Path::new(config.local_folder.trim()),
                &config.pic_compress,
                &config.pic_width,
                config.pic_size_kb,
            )
            .await
    }

    /// Upload with one escalation retry of the whole pass. A pass that still
    /// fails triggers the failure webhook, unless the stop signal cut the
    /// escalation short. "Nothing to upload" is success.
    pub async fn upload_step(
        &self,
        config: &Config,
        kind: TaskKind,
        sink: Arc<dyn LogSink>,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome> {
        let orchestrator = UploadOrchestrator::new(self.provider.clone(), sink.clone())
            .with_retry_policy(self.retry)
            .with_http_timeout(self.http_timeout);

        let result = self
            .retry
            .run(cancel, sink.as_ref(), "upload pass", |_| {
                orchestrator.upload(config, kind, cancel)
            })
            .await;

        match &result {
            Err(e) if cancel.is_cancelled() => {
                warn!(task = %kind, error = %e, "Upload interrupted by stop signal");
                sink.warn(&format!("Upload interrupted by stop signal: {e}"));
            }
            Err(e) => {
                sink.error(&format!("Upload failed after retry: {e}"));
                self.notify_failure(config, kind, e, sink.as_ref()).await;
            }
            Ok(_) => {}
        }
        result
    }

    async fn notify_failure(&self, config: &Config, kind: TaskKind, error: &Error, sink: &dyn LogSink) {
        let notifier = match WebhookNotifier::with_timeout(&config.webhook_url, self.http_timeout) {
            Ok(n) if n.is_configured() => n,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "Webhook misconfigured, skipping notification");
                sink.warn(&format!("Failure webhook not sent: {e}"));
                return;
            }
        };
        let message = error.to_string();
        let report = FailureReport {
            task: kind,
            bucket: &config.bucket_name,
            machine_code: &config.machine_code,
            error: &message,
        };
        match notifier.notify_failure(&report).await {
            Ok(()) => sink.info("Failure notification sent"),
            Err(e) => sink.error(&format!("Failure notification not delivered: {e}")),
        }
    }
}
