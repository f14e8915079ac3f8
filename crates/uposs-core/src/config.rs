//! Pipeline configuration.
//!
//! Configuration is a flat JSON document, by default `config.json` in the
//! data home. It is reloaded at the start of every cycle so operators can
//! adjust parameters while a task runs.
//!
//! The I/O chunk size is stored on disk in KB and held in memory in bytes.
//! The conversion happens here, in the serde layer, and nowhere else.
//!
//! Values the loops validate at use time (`pic_compress`, `pic_width`,
//! `auto_interval`, `sched_times`) stay strings so that a bad value becomes a
//! configuration error of the cycle rather than a load failure.
//!
//! # Environment overrides
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `UPOSS_ACCESS_KEY_ID` | `accessKeyID` |
//! | `UPOSS_SECRET_ACCESS_KEY` | `secretAccessKey` |

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::defaults;
use crate::error::Error;
use crate::temporal::DateWindow;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

/// How the push API is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushMethod {
    /// POST with a JSON body.
    #[default]
    Post,
    /// GET with query parameters.
    Get,
}

impl FromStr for PushMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "post" => Ok(Self::Post),
            "get" => Ok(Self::Get),
            _ => Err(ConfigError::Validation(format!("invalid push method: {s}"))),
        }
    }
}

impl fmt::Display for PushMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post => write!(f, "post"),
            Self::Get => write!(f, "get"),
        }
    }
}

/// KB on disk, bytes in memory.
mod kb_as_bytes {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(bytes / 1024)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let kb = u64::deserialize(d)?;
        kb.checked_mul(1024)
            .ok_or_else(|| D::Error::custom("io_buffer is too large"))
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ----- object storage -----
    /// Remote key prefix; identifies this machine.
    pub machine_code: String,
    pub bucket_name: String,
    /// `host[:port]` of the S3-compatible service, without scheme.
    pub endpoint: String,
    pub region: String,
    /// Base URL used to build public object URLs. Falls back to the endpoint.
    pub public_url: String,
    #[serde(rename = "accessKeyID")]
    pub access_key_id: String,
    #[serde(rename = "secretAccessKey")]
    pub secret_access_key: String,
    #[serde(rename = "useSSL")]
    pub use_ssl: bool,

    // ----- folders -----
    /// Source tree containing date folders.
    pub remote_folder: String,
    /// Local staging tree.
    pub local_folder: String,
    /// Copy chunk size in bytes (KB on disk).
    #[serde(rename = "io_buffer", with = "kb_as_bytes")]
    pub io_buffer_bytes: u64,

    // ----- images -----
    /// Re-encode quality, 0–100.
    pub pic_compress: String,
    /// Target width in pixels.
    pub pic_width: String,
    /// Minimum size in KB for an image to be normalized; also the upload
    /// size gate. 0 disables both.
    #[serde(rename = "pic_size")]
    pub pic_size_kb: u64,

    // ----- task loops -----
    /// Continuous-loop interval in seconds.
    pub auto_interval: String,
    /// Bounded-loop repeat count.
    pub sched_times: String,
    /// Bounded window start, `YYYY.MM.DD`.
    pub start_time: String,
    /// Bounded window end, `YYYY.MM.DD`.
    pub end_time: String,
    /// Restrict uploads to files whose folder matches the task window.
    pub upload_matching_folders_only: bool,

    // ----- remote APIs -----
    /// Validation API URL.
    pub api1: String,
    /// Response prefix meaning "valid order".
    pub api1_response1: String,
    /// Response prefix meaning "invalid order".
    pub api1_response2: String,
    /// Push API URL.
    pub api2: String,
    pub push_method: PushMethod,
    /// Failure notification webhook URL.
    pub webhook_url: String,

    // ----- retention -----
    pub clean_start_time: String,
    pub clean_end_time: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            machine_code: String::new(),
            bucket_name: String::new(),
            endpoint: String::new(),
            region: defaults::STORAGE_REGION.to_string(),
            public_url: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            use_ssl: false,
            remote_folder: String::new(),
            local_folder: String::new(),
            io_buffer_bytes: defaults::IO_BUFFER_KB * 1024,
            pic_compress: defaults::IMAGE_QUALITY.to_string(),
            pic_width: defaults::IMAGE_WIDTH.to_string(),
            pic_size_kb: defaults::IMAGE_MIN_SIZE_KB,
            auto_interval: defaults::AUTO_INTERVAL_SECS.to_string(),
            sched_times: defaults::SCHED_TIMES.to_string(),
            start_time: String::new(),
            end_time: String::new(),
            upload_matching_folders_only: false,
            api1: String::new(),
            api1_response1: String::new(),
            api1_response2: String::new(),
            api2: String::new(),
            push_method: PushMethod::Post,
            webhook_url: String::new(),
            clean_start_time: String::new(),
            clean_end_time: String::new(),
        }
    }
}

impl Config {
    /// Load from `path` if it exists, otherwise defaults. Environment
    /// overrides apply in both cases.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            info!(path = %path.display(), "Loading configuration from file");
            Self::from_file(path)
        } else {
            debug!(path = %path.display(), "Config file not found, using defaults");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Load from a JSON file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a JSON document.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Write the document back to `path` (chunk size in KB).
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Apply credential overrides from the environment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("UPOSS_ACCESS_KEY_ID") {
            self.access_key_id = v;
        }
        if let Ok(v) = std::env::var("UPOSS_SECRET_ACCESS_KEY") {
            self.secret_access_key = v;
        }
    }

    /// Chunk size for copying, rejecting zero.
    pub fn chunk_size(&self) -> Result<usize, Error> {
        if self.io_buffer_bytes == 0 {
            return Err(Error::Config("io_buffer must be greater than 0".into()));
        }
        usize::try_from(self.io_buffer_bytes)
            .map_err(|_| Error::Config(format!("io_buffer too large: {}", self.io_buffer_bytes)))
    }

    /// Continuous-loop interval.
    pub fn interval(&self) -> Result<Duration, Error> {
        match self.auto_interval.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(Error::Config(format!(
                "invalid auto_interval: {:?}",
                self.auto_interval
            ))),
        }
    }

    /// Bounded-loop repeat count.
    pub fn repeat_count(&self) -> Result<u32, Error> {
        match self.sched_times.trim().parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(Error::Config(format!(
                "invalid sched_times: {:?}",
                self.sched_times
            ))),
        }
    }

    /// Upload size gate in bytes; `None` when disabled.
    pub fn max_upload_bytes(&self) -> Option<u64> {
        (self.pic_size_kb > 0).then(|| self.pic_size_kb.saturating_mul(1024))
    }

    /// Configured bounded window, if both bounds parse.
    pub fn date_window(&self) -> Option<DateWindow> {
        DateWindow::parse(&self.start_time, &self.end_time)
    }

    /// Window label stored with bounded copy records (`start-end`).
    pub fn date_window_label(&self) -> String {
        format!("{}-{}", self.start_time.trim(), self.end_time.trim())
    }

    /// Retention window, if both bounds parse.
    pub fn clean_window(&self) -> Option<DateWindow> {
        DateWindow::parse(&self.clean_start_time, &self.clean_end_time)
    }

    /// Base URL for public object links.
    pub fn public_base_url(&self) -> String {
        let base = self.public_url.trim();
        if !base.is_empty() {
            return base.trim_end_matches('/').to_string();
        }
        format!("{}://{}", self.scheme(), self.endpoint.trim().trim_end_matches('/'))
    }

    /// Full endpoint URL for the storage client.
    pub fn endpoint_url(&self) -> String {
        let endpoint = self.endpoint.trim();
        if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("{}://{}", self.scheme(), endpoint)
        }
    }

    fn scheme(&self) -> &'static str {
        if self.use_ssl {
            "https"
        } else {
            "http"
        }
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |s: &str| {
            if s.is_empty() {
                String::new()
            } else {
                "********".to_string()
            }
        };
        Self {
            access_key_id: mask(&self.access_key_id),
            secret_access_key: mask(&self.secret_access_key),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "machine_code": "M01",
        "bucket_name": "photos",
        "endpoint": "minio.local:9000",
        "accessKeyID": "ak",
        "secretAccessKey": "sk",
        "useSSL": false,
        "remote_folder": "/mnt/source",
        "local_folder": "/var/staging",
        "io_buffer": 64,
        "pic_compress": "80",
        "pic_width": "1280",
        "pic_size": 300,
        "auto_interval": "60",
        "sched_times": "3",
        "start_time": "2025.01.01",
        "end_time": "2025.01.03",
        "api1": "http://api/check",
        "api1_response1": "200",
        "api1_response2": "404",
        "api2": "http://api/push"
    }"#;

    #[test]
    fn test_io_buffer_is_bytes_in_memory() {
        let cfg = Config::from_json(SAMPLE).unwrap();
        assert_eq!(cfg.io_buffer_bytes, 64 * 1024);
        assert_eq!(cfg.chunk_size().unwrap(), 65536);
    }

    #[test]
    fn test_save_writes_kb() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let cfg = Config::from_json(SAMPLE).unwrap();
        cfg.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["io_buffer"], 64);

        let reloaded = Config::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reloaded, cfg);
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let cfg = Config::from_json(r#"{"bucket_name": "b"}"#).unwrap();
        assert_eq!(cfg.bucket_name, "b");
        assert_eq!(cfg.region, "us-east-1");
        assert_eq!(cfg.io_buffer_bytes, defaults::IO_BUFFER_KB * 1024);
        assert_eq!(cfg.push_method, PushMethod::Post);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg.sched_times, defaults::SCHED_TIMES);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_buffer_is_config_error() {
        let cfg = Config {
            io_buffer_bytes: 0,
            ..Config::default()
        };
        let err = cfg.chunk_size().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_interval_and_repeat_count_validation() {
        let mut cfg = Config::from_json(SAMPLE).unwrap();
        assert_eq!(cfg.interval().unwrap(), Duration::from_secs(60));
        assert_eq!(cfg.repeat_count().unwrap(), 3);

        cfg.auto_interval = "soon".into();
        cfg.sched_times = "0".into();
        assert!(cfg.interval().is_err());
        assert!(cfg.repeat_count().is_err());
    }

    #[test]
    fn test_max_upload_bytes() {
        let mut cfg = Config::from_json(SAMPLE).unwrap();
        assert_eq!(cfg.max_upload_bytes(), Some(300 * 1024));
        cfg.pic_size_kb = 0;
        assert_eq!(cfg.max_upload_bytes(), None);
    }

    #[test]
    fn test_public_base_url() {
        let mut cfg = Config::from_json(SAMPLE).unwrap();
        assert_eq!(cfg.public_base_url(), "http://minio.local:9000");
        cfg.use_ssl = true;
        assert_eq!(cfg.endpoint_url(), "https://minio.local:9000");
        cfg.public_url = "https://cdn.example.com/".into();
        assert_eq!(cfg.public_base_url(), "https://cdn.example.com");
    }

    #[test]
    fn test_window_helpers() {
        let cfg = Config::from_json(SAMPLE).unwrap();
        assert_eq!(cfg.date_window_label(), "2025.01.01-2025.01.03");
        assert!(cfg.date_window().is_some());
        assert!(cfg.clean_window().is_none());
    }

    #[test]
    fn test_redacted_masks_credentials() {
        let cfg = Config::from_json(SAMPLE).unwrap().redacted();
        assert_eq!(cfg.access_key_id, "********");
        assert_eq!(cfg.secret_access_key, "********");
        assert_eq!(cfg.bucket_name, "photos");
    }

    #[test]
    fn test_push_method_parse() {
        assert_eq!("GET".parse::<PushMethod>().unwrap(), PushMethod::Get);
        assert!("put".parse::<PushMethod>().is_err());
        assert_eq!(PushMethod::Post.to_string(), "post");
    }
}
