//! # uposs-core
//!
//! Core types, configuration and matching rules for the uposs upload
//! pipeline.
//!
//! This crate provides the error type, defaults, structured-logging schema
//! and the pure decision functions (Folder Matcher, Order Extractor) that the
//! storage, remote and job crates build on.

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod order;
pub mod temporal;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::{Config, ConfigError, ConfigResult, PushMethod};
pub use error::{Error, Result};
pub use logging::{LogChannel, LogSink, MemorySink, TracingSink};
pub use models::*;
pub use order::{extract_order_candidates, matches_order_filter, parse_order_filter};
pub use temporal::{
    folder_matches, format_folder_date, local_today, parse_folder_date, DateWindow,
    FolderMatcher,
};
pub use traits::DedupStore;

/// Whether `path` has an extension the pipeline treats as an image.
pub fn is_image_path(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            defaults::IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}
