use afl_common::checksum::sha256_hex;
use afl_common::{AflError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

use super::{ObjectStore, UploadResult};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

/// Process-local object store
///
/// Used by the `memory` backend and by tests. Writes and reads can be made to
/// fail on demand.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    put_calls: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn get(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .get(&(bucket.to_string(), path.to_string()))
            .map(|object| object.data.clone())
    }

    pub fn content_type(&self, bucket: &str, path: &str) -> Option<String> {
        self.lock()
            .get(&(bucket.to_string(), path.to_string()))
            .map(|object| object.content_type.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), StoredObject>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadResult> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AflError::storage(format!(
                "Write to {}/{} rejected",
                bucket, path
            )));
        }

        let result = UploadResult {
            key: path.to_string(),
            checksum: sha256_hex(&data),
            size: data.len() as i64,
        };

        debug!(bucket, path, size = result.size, "Stored object in memory");
        self.lock().insert(
            (bucket.to_string(), path.to_string()),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );

        Ok(result)
    }

    async fn exists(&self, bucket: &str, path: &str) -> Result<bool> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AflError::storage(format!(
                "Read of {}/{} rejected",
                bucket, path
            )));
        }
        Ok(self.lock().contains_key(&(bucket.to_string(), path.to_string())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = InMemoryObjectStore::new();
        store.put("b", "k", b"one".to_vec(), "text/csv").await.unwrap();
        let second = store.put("b", "k", b"two".to_vec(), "text/csv").await.unwrap();

        assert_eq!(store.get("b", "k").unwrap(), b"two");
        assert_eq!(store.len(), 1);
        assert_eq!(second.size, 3);
        assert_eq!(store.put_calls(), 2);
        assert_eq!(store.content_type("b", "k").as_deref(), Some("text/csv"));
    }

    #[tokio::test]
    async fn test_failed_write_stores_nothing() {
        let store = InMemoryObjectStore::new();
        store.fail_writes(true);

        let result = store.put("b", "k", b"data".to_vec(), "text/csv").await;
        assert!(matches!(result, Err(AflError::Storage(_))));
        assert!(store.is_empty());
        assert!(!store.exists("b", "k").await.unwrap());
    }
}
