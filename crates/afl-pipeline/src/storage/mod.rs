//! Object storage for staged season files

use afl_common::{Result, YearRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::codec::{encode_csv, CSV_CONTENT_TYPE};
use crate::naming::storage_uri;

pub mod config;
pub mod memory;
pub mod s3;

pub use config::StorageConfig;
pub use memory::InMemoryObjectStore;
pub use s3::S3ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: i64,
}

/// Durable key/blob storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` at `bucket/path`, replacing any existing object
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadResult>;

    async fn exists(&self, bucket: &str, path: &str) -> Result<bool>;
}

/// Bucket-scoped front end used by the pipeline
#[derive(Clone)]
pub struct StorageManager {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl StorageManager {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn uri_for(&self, path: &str) -> String {
        storage_uri(&self.bucket, path)
    }

    /// Serialize `record` as CSV and store it at `path`
    #[instrument(skip(self, record), fields(bucket = %self.bucket))]
    pub async fn upload_record(&self, record: &YearRecord, path: &str) -> Result<UploadResult> {
        let data = encode_csv(record)?;
        let result = self
            .store
            .put(&self.bucket, path, data, CSV_CONTENT_TYPE)
            .await?;

        info!(
            checksum = %result.checksum,
            size = result.size,
            "Uploaded data to {}",
            self.uri_for(path)
        );
        Ok(result)
    }

    /// Errors are logged and reported as a missing object
    pub async fn check_blob_exists(&self, path: &str) -> bool {
        match self.store.exists(&self.bucket, path).await {
            Ok(exists) => exists,
            Err(e) => {
                error!(path, error = %e, "Error checking if blob exists");
                false
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use afl_common::Scalar;

    fn record() -> YearRecord {
        YearRecord::from_rows(
            vec!["Season".into(), "year".into()],
            vec![vec![Scalar::Int(2020), Scalar::Int(2020)]],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_upload_record_writes_csv() {
        let store = Arc::new(InMemoryObjectStore::new());
        let storage = StorageManager::new(store.clone(), "afl-data");

        let result = storage
            .upload_record(&record(), "player_stats/player_stats_2020")
            .await
            .unwrap();

        assert_eq!(result.key, "player_stats/player_stats_2020");
        let stored = store
            .get("afl-data", "player_stats/player_stats_2020")
            .unwrap();
        assert_eq!(String::from_utf8(stored).unwrap(), "Season,year\n2020,2020\n");
        assert!(storage.check_blob_exists("player_stats/player_stats_2020").await);
    }

    #[tokio::test]
    async fn test_check_blob_exists_swallows_errors() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.fail_reads(true);
        let storage = StorageManager::new(store, "afl-data");

        assert!(!storage.check_blob_exists("anything").await);
    }

    #[test]
    fn test_uri_for() {
        let storage = StorageManager::new(Arc::new(InMemoryObjectStore::new()), "afl-data");
        assert_eq!(
            storage.uri_for("player_stats/player_stats_2020"),
            "gs://afl-data/player_stats/player_stats_2020"
        );
    }
}
