//! Failure notification webhook (chat-style markdown payload).

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

use uposs_core::{Error, Result, TaskKind};

use crate::http::{build_client, default_timeout, require_url};

/// What went wrong, for the operator message.
#[derive(Debug, Clone)]
pub struct FailureReport<'a> {
    pub task: TaskKind,
    pub bucket: &'a str,
    pub machine_code: &'a str,
    pub error: &'a str,
}

impl FailureReport<'_> {
    /// Markdown body posted to the webhook.
    pub fn to_markdown(&self) -> String {
        format!(
            "**Upload failed**\n> Task: <font color=\"warning\">{}</font>\n> Bucket: {}\n> Machine: {}\n> Error: {}",
            self.task, self.bucket, self.machine_code, self.error
        )
    }
}

/// Posts failure notifications to a chat webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Option<String>,
}

impl WebhookNotifier {
    /// An empty URL yields a notifier that silently does nothing.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, default_timeout())
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let url = if url.trim().is_empty() {
            None
        } else {
            Some(require_url("webhook", url)?)
        };
        Ok(Self {
            client: build_client(timeout)?,
            url,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// Post a markdown message.
    pub async fn send_markdown(&self, content: &str) -> Result<()> {
        let Some(url) = &self.url else {
            debug!(subsystem = "remote", component = "webhook", "Webhook not configured, skipping");
            return Ok(());
        };

        let payload = json!({
            "msgtype": "markdown",
            "markdown": { "content": content },
        });
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Request(format!("webhook unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Request(format!(
                "webhook returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }
        info!(subsystem = "remote", component = "webhook", op = "notify", "Failure notification sent");
        Ok(())
    }

    /// Notify operators of a persistent upload failure.
    pub async fn notify_failure(&self, report: &FailureReport<'_>) -> Result<()> {
        self.send_markdown(&report.to_markdown()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn report() -> FailureReport<'static> {
        FailureReport {
            task: TaskKind::Continuous,
            bucket: "photos",
            machine_code: "M01",
            error: "storage unreachable",
        }
    }

    #[test]
    fn test_markdown_names_bucket_and_machine() {
        let md = report().to_markdown();
        assert!(md.contains("photos"));
        assert!(md.contains("M01"));
        assert!(md.contains("auto"));
    }

    #[tokio::test]
    async fn test_unconfigured_is_noop() {
        let notifier = WebhookNotifier::new("").unwrap();
        assert!(!notifier.is_configured());
        notifier.notify_failure(&report()).await.unwrap();
    }

    #[tokio::test]
    async fn test_posts_markdown_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"msgtype": "markdown"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(&server.uri()).unwrap();
        notifier.notify_failure(&report()).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(&server.uri()).unwrap();
        let err = notifier.notify_failure(&report()).await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }
}
