//! Shared HTTP client construction.

use std::time::Duration;

use reqwest::Client;

use uposs_core::defaults::HTTP_TIMEOUT_SECS;
use uposs_core::{Error, Result};

/// Default timeout for validation and push calls.
pub fn default_timeout() -> Duration {
    Duration::from_secs(HTTP_TIMEOUT_SECS)
}

/// Build a client with the given request timeout.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Internal(format!("failed to create HTTP client: {e}")))
}

/// Reject empty or scheme-less URLs before any request is attempted.
pub fn require_url(name: &str, url: &str) -> Result<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::Config(format!("{name} URL is not configured")));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::Config(format!("{name} URL must be http(s): {url}")));
    }
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_url() {
        assert!(require_url("validation", "").is_err());
        assert!(require_url("validation", "ftp://x").is_err());
        assert_eq!(
            require_url("validation", " http://api/check ").unwrap(),
            "http://api/check"
        );
    }
}
