//! Centralized default constants for the uposs pipeline.
//!
//! Organized by domain area. Crates reference these constants instead of
//! defining their own magic numbers.

use std::time::Duration;

// =============================================================================
// DATES
// =============================================================================

/// chrono format of a date-folder name (`YYYY.MM.DD`).
pub const DATE_FOLDER_FORMAT: &str = "%Y.%m.%d";

// =============================================================================
// COPY
// =============================================================================

/// Default I/O chunk size in KB as written to a fresh config document.
pub const IO_BUFFER_KB: u64 = 1024;

/// Status stored on every successful copy record.
pub const COPY_STATUS_COPIED: &str = "copied";

// =============================================================================
// IMAGES
// =============================================================================

/// Extensions (lowercase, no dot) the normalizer and uploader recognize.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Default JPEG quality.
pub const IMAGE_QUALITY: &str = "85";

/// Default target width in pixels.
pub const IMAGE_WIDTH: &str = "1920";

/// Default minimum size (KB) for an image to be normalized.
pub const IMAGE_MIN_SIZE_KB: u64 = 500;

// =============================================================================
// REMOTE APIS
// =============================================================================

/// Timeout applied to validation and push API calls.
pub const HTTP_TIMEOUT_SECS: u64 = 20;

/// Timeout applied to the storage connection test.
pub const STORAGE_PROBE_TIMEOUT_SECS: u64 = 10;

/// Fixed delay before the single retry of a transient failure.
pub const RETRY_DELAY: Duration = Duration::from_secs(20);

/// Attempts per validation call (one initial plus one retry).
pub const VALIDATION_ATTEMPTS: u32 = 2;

/// Attempts per push call (one initial plus one retry).
pub const PUSH_ATTEMPTS: u32 = 2;

/// Default S3 region when the document names none.
pub const STORAGE_REGION: &str = "us-east-1";

// =============================================================================
// TASK LOOPS
// =============================================================================

/// Default continuous-loop interval in seconds.
pub const AUTO_INTERVAL_SECS: &str = "600";

/// Default bounded-loop repeat count.
pub const SCHED_TIMES: &str = "1";

/// Capacity of the task event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// RECORDS
// =============================================================================

/// Default page size for record listings.
pub const PAGE_LIMIT: i64 = 50;

/// Default page offset.
pub const PAGE_OFFSET: i64 = 0;
