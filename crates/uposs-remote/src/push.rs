//! Push API client: reports a validated order and its public object URL.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use uposs_core::{Error, PushMethod, Result};

use crate::http::{build_client, default_timeout, require_url};

/// Request body (POST) or query parameters (GET).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest<'a> {
    pub order_number: &'a str,
    pub file_url: &'a str,
}

/// Structured push API response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub trace_id: Option<String>,
}

/// HTTP client for the push API.
#[derive(Debug, Clone)]
pub struct PushClient {
    client: Client,
    url: String,
    method: PushMethod,
}

impl PushClient {
    /// Client with the default 20 s timeout.
    pub fn new(url: &str, method: PushMethod) -> Result<Self> {
        Self::with_timeout(url, method, default_timeout())
    }

    pub fn with_timeout(url: &str, method: PushMethod, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: require_url("push", url)?,
            method,
        })
    }

    /// Report one uploaded file. Any non-2xx status, unparseable body or
    /// `code != 200` is an error.
    pub async fn push(&self, order_number: &str, file_url: &str) -> Result<PushResponse> {
        let start = Instant::now();
        let request = PushRequest {
            order_number,
            file_url,
        };
        let builder = match self.method {
            PushMethod::Post => self.client.post(&self.url).json(&request),
            PushMethod::Get => self.client.get(&self.url).query(&request),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Request(format!("push API unreachable: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Request(format!("push API body unreadable: {e}")))?;

        if !status.is_success() {
            return Err(Error::Request(format!(
                "push API returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: PushResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Request(format!("push API response not understood: {e}")))?;
        if parsed.code != 200 {
            return Err(Error::Request(format!(
                "push API rejected order {order_number}: code {} {}",
                parsed.code, parsed.msg
            )));
        }

        debug!(
            subsystem = "remote",
            component = "push",
            op = "push",
            order = order_number,
            duration_ms = start.elapsed().as_millis() as u64,
            "Push accepted"
        );
        Ok(parsed)
    }
}
