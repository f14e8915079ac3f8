//! # uposs-jobs
//!
//! The uposs pipeline and its task loops.
//!
//! This crate provides:
//! - Copy Engine: date-folder matching copy from the source tree into staging
//! - Image Normalizer: in-place resize and re-encode of staged images
//! - Upload Orchestrator: order validation, object storage upload, push
//! - A unified task driver for the continuous and bounded loops with a
//!   stop/join handle and broadcast events
//! - Retention cleanup of dedup records and log files
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use uposs_jobs::{Pipeline, Schedule, TaskRunner};
//! use uposs_remote::S3Provider;
//!
//! let db = uposs_db::Database::open(&home.join("uposs.db")).await?;
//! db.migrate().await?;
//!
//! let pipeline = Arc::new(Pipeline::new(
//!     home.join("config.json"),
//!     Arc::new(db.copy_records.clone()),
//!     Arc::new(S3Provider),
//! ));
//! let sink = Arc::new(uposs_core::TracingSink::for_task(uposs_core::TaskKind::Continuous));
//! let handle = TaskRunner::new(pipeline, Schedule::Continuous, sink).start();
//!
//! // Later: fire the stop signal and wait for the clean exit
//! handle.stop().await?;
//! ```

pub mod copy;
pub mod normalize;
pub mod pipeline;
pub mod retention;
pub mod upload;
pub mod worker;

pub use copy::{CopyEngine, CopyReport, CopyRequest};
pub use normalize::{ImageNormalizer, ImageSettings, NormalizeReport};
pub use pipeline::Pipeline;
pub use retention::{LogLocation, RetentionCleaner, RetentionReport};
pub use upload::{list_images, UploadOrchestrator, UploadOutcome, UploadReport};
pub use worker::{Schedule, Step, TaskEvent, TaskExit, TaskHandle, TaskRunner};
