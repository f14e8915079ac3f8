//! Error types for the uposs pipeline.

use thiserror::Error;

/// Result type alias using the pipeline's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error (bad interval, buffer size, dates, image settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument passed to an operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Object storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Image decode/encode failed
    #[error("Image error: {0}")]
    Image(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Two failures reported together, e.g. a corrupt image whose
    /// dedup record could not be removed either.
    #[error("{primary}; additionally: {secondary}")]
    Compound {
        primary: Box<Error>,
        secondary: Box<Error>,
    },
}

impl Error {
    /// Combine two errors into one report.
    pub fn compound(primary: Error, secondary: Error) -> Self {
        Error::Compound {
            primary: Box::new(primary),
            secondary: Box::new(secondary),
        }
    }

    /// Whether this error belongs to the configuration class (fatal to a cycle).
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_) | Error::InvalidInput(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("bad interval".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad interval");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("chunk size must be > 0".to_string());
        assert_eq!(err.to_string(), "Invalid input: chunk size must be > 0");
    }

    #[test]
    fn test_error_display_request() {
        let err = Error::Request("network unreachable".to_string());
        assert_eq!(err.to_string(), "Request error: network unreachable");
    }

    #[test]
    fn test_error_display_storage() {
        let err = Error::Storage("bucket missing".to_string());
        assert_eq!(err.to_string(), "Storage error: bucket missing");
    }

    #[test]
    fn test_error_display_image() {
        let err = Error::Image("truncated".to_string());
        assert_eq!(err.to_string(), "Image error: truncated");
    }

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_compound_reports_both() {
        let err = Error::compound(
            Error::Image("decode failed".into()),
            Error::Internal("record removal failed".into()),
        );
        let msg = err.to_string();
        assert!(msg.contains("decode failed"));
        assert!(msg.contains("record removal failed"));
    }

    #[test]
    fn test_is_config() {
        assert!(Error::Config("x".into()).is_config());
        assert!(Error::InvalidInput("x".into()).is_config());
        assert!(!Error::Request("x".into()).is_config());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => {
                assert!(!msg.is_empty());
            }
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
