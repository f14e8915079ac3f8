//! # uposs-remote
//!
//! External collaborators of the uposs pipeline.
//!
//! - [`ValidationClient`]: form-encoded order lookup, classified by response prefix
//! - [`PushClient`]: reports validated orders and their public URLs
//! - [`WebhookNotifier`]: chat-style failure notifications
//! - [`ObjectStore`]: S3-compatible storage ([`S3ObjectStore`]) and an
//!   in-memory store for tests ([`memory::MemoryObjectStore`])
//! - [`RetryPolicy`]: the single fixed-delay retry applied to transient failures

pub mod http;
pub mod memory;
pub mod object_store;
pub mod push;
pub mod retry;
pub mod s3;
pub mod validation;
pub mod webhook;

pub use object_store::{
    content_type_for, object_key, public_object_url, ObjectStore, ObjectStoreProvider,
};
pub use push::{PushClient, PushResponse};
pub use retry::RetryPolicy;
pub use s3::{S3ObjectStore, S3Provider};
pub use validation::{classify, ValidationClient, Verdict};
pub use webhook::{FailureReport, WebhookNotifier};
