//! Validation API client.
//!
//! The API is called with a form-encoded `orderCode` field. The caller
//! classifies the *raw* response body by comparing its prefix against two
//! configured literals, not by parsing the JSON code.

use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::debug;

use uposs_core::{Error, Result};

use crate::http::{build_client, default_timeout, require_url};

/// Outcome of one validation lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Body starts with the "valid" prefix.
    Valid,
    /// Body starts with the "invalid" prefix.
    Invalid,
    /// Neither prefix matched.
    Indeterminate,
}

/// Classify a raw response body. Empty prefixes never match, so an
/// unconfigured prefix cannot turn every response into a verdict.
pub fn classify(body: &str, valid_prefix: &str, invalid_prefix: &str) -> Verdict {
    if !valid_prefix.is_empty() && body.starts_with(valid_prefix) {
        Verdict::Valid
    } else if !invalid_prefix.is_empty() && body.starts_with(invalid_prefix) {
        Verdict::Invalid
    } else {
        Verdict::Indeterminate
    }
}

/// HTTP client for the validation API.
#[derive(Debug, Clone)]
pub struct ValidationClient {
    client: Client,
    url: String,
}

impl ValidationClient {
    /// Client with the default 20 s timeout.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, default_timeout())
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: require_url("validation", url)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Look up one order code and return the raw body.
    ///
    /// Any HTTP status yields the body; only transport failures (connect,
    /// timeout, unreadable body) are errors.
    pub async fn lookup(&self, order_code: &str) -> Result<String> {
        let start = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("orderCode", order_code)])
            .send()
            .await
            .map_err(|e| Error::Request(format!("validation API unreachable: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Request(format!("validation API body unreadable: {e}")))?;

        debug!(
            subsystem = "remote",
            component = "validation",
            op = "lookup",
            order = order_code,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Validation lookup complete"
        );
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_classify() {
        assert_eq!(classify("200:SO1", "200", "404"), Verdict::Valid);
        assert_eq!(classify("404 not found", "200", "404"), Verdict::Invalid);
        assert_eq!(classify("500 oops", "200", "404"), Verdict::Indeterminate);
        assert_eq!(classify("", "200", "404"), Verdict::Indeterminate);
    }

    #[test]
    fn test_classify_ignores_empty_prefixes() {
        assert_eq!(classify("anything", "", ""), Verdict::Indeterminate);
        assert_eq!(classify("404", "", "404"), Verdict::Invalid);
    }

    #[test]
    fn test_new_rejects_missing_url() {
        assert!(ValidationClient::new("").is_err());
    }

    #[tokio::test]
    async fn test_lookup_posts_form_and_returns_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/check"))
            .and(header("accept", "application/json"))
            .and(body_string_contains("orderCode=SO123"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":200}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = ValidationClient::new(&format!("{}/check", server.uri())).unwrap();
        let body = client.lookup("SO123").await.unwrap();
        assert_eq!(body, r#"{"code":200}"#);
    }

    #[tokio::test]
    async fn test_lookup_returns_body_for_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("busy"))
            .mount(&server)
            .await;

        let client = ValidationClient::new(&server.uri()).unwrap();
        assert_eq!(client.lookup("SO1").await.unwrap(), "busy");
    }

    #[tokio::test]
    async fn test_lookup_timeout_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("200")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client =
            ValidationClient::with_timeout(&server.uri(), Duration::from_millis(50)).unwrap();
        let err = client.lookup("SO1").await.unwrap_err();
        assert!(matches!(err, Error::Request(_)));
    }
}
