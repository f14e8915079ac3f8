//! Fixed-delay retry for transient failures.
//!
//! A transient failure gets exactly one more attempt after a fixed delay.
//! There is no exponential backoff and no jitter. The delay is cancellable:
//! when the stop signal fires during a pause the last error is returned
//! immediately.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use uposs_core::defaults::RETRY_DELAY;
use uposs_core::{LogSink, Result};

/// Attempts and pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 act as 1.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::transient()
    }
}

impl RetryPolicy {
    /// One initial attempt plus one retry after the fixed delay.
    pub fn transient() -> Self {
        Self {
            attempts: 2,
            delay: RETRY_DELAY,
        }
    }

    /// A single attempt, no retry.
    pub fn once() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Wait out the delay. Returns `false` if `cancel` fired first.
    pub async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = sleep(self.delay) => true,
        }
    }

    /// Run `op` until it succeeds or attempts are exhausted. `op` receives
    /// the 1-based attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        sink: &dyn LogSink,
        label: &str,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!(
                        op = label,
                        attempt,
                        error = %e,
                        retry_in_secs = self.delay.as_secs(),
                        "Attempt failed, retrying"
                    );
                    sink.warn(&format!(
                        "{label} failed (attempt {attempt}/{attempts}): {e}; retrying in {}s",
                        self.delay.as_secs()
                    ));
                    if !self.pause(cancel).await {
                        sink.warn(&format!("{label}: retry cancelled by stop signal"));
                        return Err(e);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
