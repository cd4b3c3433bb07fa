use afl_common::checksum::sha256_hex;
use afl_common::{AflError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::{config::Region, primitives::ByteStream, Client};
use tracing::{debug, info, instrument};

use super::{config::StorageConfig, ObjectStore, UploadResult};

/// Object store backed by any S3-compatible endpoint
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        debug!(
            endpoint = ?config.endpoint,
            region = %config.region,
            static_credentials = config.has_static_credentials(),
            "Initializing object store"
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            builder = builder.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "afl-storage",
            ));
        }

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());
        info!("Object store client initialized");

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, data))]
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadResult> {
        let checksum = sha256_hex(&data);
        let size = data.len() as i64;

        debug!("Uploading {} bytes to s3://{}/{}", size, bucket, path);

        self.client
            .put_object()
            .bucket(bucket)
            .key(path)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| AflError::storage(format!("Failed to upload {}/{}: {}", bucket, path, e)))?;

        Ok(UploadResult {
            key: path.to_string(),
            checksum,
            size,
        })
    }

    #[instrument(skip(self))]
    async fn exists(&self, bucket: &str, path: &str) -> Result<bool> {
        match self.client.head_object().bucket(bucket).key(path).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|service| service.is_not_found())
                    .unwrap_or(false);
                if not_found || e.to_string().contains("404") {
                    Ok(false)
                } else {
                    Err(AflError::storage(format!(
                        "Failed to check existence of {}/{}: {}",
                        bucket, path, e
                    )))
                }
            },
        }
    }
}
