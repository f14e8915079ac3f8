//! Object storage abstraction.
//!
//! The upload pass talks to storage only through [`ObjectStore`]. A store is
//! obtained per pass from an [`ObjectStoreProvider`] because credentials and
//! endpoint are part of the configuration reloaded every cycle.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use uposs_core::{Config, Result};

/// S3-compatible bucket/object operations used by the pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Names of all visible buckets. Also serves as the connection test.
    async fn list_buckets(&self) -> Result<Vec<String>>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// Store `body` under `key`, replacing any existing object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;
}

/// Builds a store from the current configuration.
pub trait ObjectStoreProvider: Send + Sync {
    fn connect(&self, config: &Config) -> Result<Arc<dyn ObjectStore>>;
}

/// Join key segments with `/`, normalising backslashes and dropping empty
/// segments so host path conventions never leak into keys.
pub fn object_key(prefix: &str, date_folder: &str, file_name: &str) -> String {
    [prefix, date_folder, file_name]
        .iter()
        .flat_map(|segment| segment.split(['/', '\\']))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Public URL of an object: `{base}/{bucket}/{key}`.
pub fn public_object_url(base_url: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", base_url.trim_end_matches('/'), bucket, key)
}

/// MIME type from magic bytes, falling back to the extension.
pub fn content_type_for(path: &Path, bytes: &[u8]) -> &'static str {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type();
    }
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_uses_forward_slashes() {
        assert_eq!(
            object_key("M01", "2025.01.01", "order123-a.jpg"),
            "M01/2025.01.01/order123-a.jpg"
        );
        assert_eq!(
            object_key("M01\\sub/", "2025.01.01", "a.jpg"),
            "M01/sub/2025.01.01/a.jpg"
        );
        assert_eq!(object_key("", "2025.01.01", "a.jpg"), "2025.01.01/a.jpg");
    }

    #[test]
    fn test_public_object_url() {
        assert_eq!(
            public_object_url("https://cdn.example.com/", "photos", "M01/2025.01.01/a.jpg"),
            "https://cdn.example.com/photos/M01/2025.01.01/a.jpg"
        );
    }

    #[test]
    fn test_content_type_sniffs_then_falls_back() {
        let png_magic = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(content_type_for(Path::new("x.jpg"), &png_magic), "image/png");
        assert_eq!(content_type_for(Path::new("x.JPG"), b"nope"), "image/jpeg");
        assert_eq!(
            content_type_for(Path::new("x.bin"), b"nope"),
            "application/octet-stream"
        );
    }
}
