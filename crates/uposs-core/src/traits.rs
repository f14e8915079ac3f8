//! Storage seams the pipeline depends on.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{NewCopyRecord, TaskKind};

/// Record of files already copied into staging, segregated by task kind.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Whether `file_name` has already been copied by `kind`.
    async fn exists(&self, kind: TaskKind, file_name: &str) -> Result<bool>;

    /// Insert, or replace on conflict, the record for a copied file.
    async fn record(&self, record: &NewCopyRecord) -> Result<()>;

    /// Remove every record for `file_name` regardless of kind. Returns the
    /// number of rows removed.
    async fn remove(&self, file_name: &str) -> Result<u64>;
}
