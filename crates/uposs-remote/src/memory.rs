//! In-memory object store for deterministic testing.
//!
//! ## Usage
//!
//! ```rust
//! use uposs_remote::memory::MemoryObjectStore;
//! use uposs_remote::ObjectStore;
//!
//! # async fn demo() -> uposs_core::Result<()> {
//! let store = MemoryObjectStore::new();
//! store.create_bucket("photos").await?;
//! store.put_object("photos", "M01/a.jpg", vec![1, 2, 3], "image/jpeg").await?;
//! assert_eq!(store.object("photos", "M01/a.jpg").unwrap().body, vec![1, 2, 3]);
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use uposs_core::{Config, Error, Result};

use crate::object_store::{ObjectStore, ObjectStoreProvider};

/// One stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

type Buckets = HashMap<String, BTreeMap<String, StoredObject>>;

/// Object store that keeps everything in a map.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<Buckets>,
    unreachable: AtomicBool,
    fail_puts: AtomicBool,
    puts: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the service were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make `put_object` fail while leaving bucket calls working.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `put_object` calls.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.lock().contains_key(bucket)
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock().get(bucket).and_then(|b| b.get(key)).cloned()
    }

    /// Keys in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Buckets> {
        match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Storage("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        self.check_reachable()?;
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.check_reachable()?;
        Ok(self.lock().contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.check_reachable()?;
        self.lock().entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        self.check_reachable()?;
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("put {bucket}/{key}: injected failure")));
        }
        let mut buckets = self.lock();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::Storage(format!("bucket {bucket} does not exist")))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Provider that always hands out the same shared in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    store: Arc<MemoryObjectStore>,
}

impl MemoryProvider {
    pub fn new(store: Arc<MemoryObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MemoryObjectStore> {
        &self.store
    }
}

impl ObjectStoreProvider for MemoryProvider {
    fn connect(&self, _config: &Config) -> Result<Arc<dyn ObjectStore>> {
        Ok(self.store.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_requires_bucket() {
        let store = MemoryObjectStore::new();
        assert!(store.put_object("b", "k", vec![1], "x").await.is_err());
        store.create_bucket("b").await.unwrap();
        store.put_object("b", "k", vec![1], "x").await.unwrap();
        assert_eq!(store.put_count(), 1);
        assert_eq!(store.keys("b"), vec!["k"]);
    }

    #[tokio::test]
    async fn test_unreachable_fails_everything() {
        let store = MemoryObjectStore::new();
        store.set_unreachable(true);
        assert!(store.list_buckets().await.is_err());
        assert!(store.bucket_exists("b").await.is_err());
    }

    #[tokio::test]
    async fn test_fail_puts_keeps_buckets_working() {
        let store = MemoryObjectStore::new();
        store.create_bucket("b").await.unwrap();
        store.set_fail_puts(true);
        assert!(store.bucket_exists("b").await.unwrap());
        assert!(store.put_object("b", "k", vec![], "x").await.is_err());
        assert_eq!(store.put_count(), 0);
    }
}
