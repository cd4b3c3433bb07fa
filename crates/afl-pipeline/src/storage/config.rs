use serde::{Deserialize, Serialize};
use std::env;

/// S3-interoperability endpoint of the cloud storage service
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_STORAGE_REGION: &str = "auto";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: Some(DEFAULT_STORAGE_ENDPOINT.to_string()),
            region: DEFAULT_STORAGE_REGION.to_string(),
            access_key: None,
            secret_key: None,
            path_style: true,
        }
    }
}

impl StorageConfig {
    /// Read `S3_*` settings, with the usual AWS variables as fallback for keys.
    ///
    /// When no keys are configured the client falls back to the default
    /// credential chain.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            endpoint: lookup("S3_ENDPOINT").or(defaults.endpoint),
            region: lookup("S3_REGION").unwrap_or(defaults.region),
            access_key: lookup("S3_ACCESS_KEY").or_else(|| lookup("AWS_ACCESS_KEY_ID")),
            secret_key: lookup("S3_SECRET_KEY").or_else(|| lookup("AWS_SECRET_ACCESS_KEY")),
            path_style: lookup("S3_PATH_STYLE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.path_style),
        }
    }

    /// Local S3-compatible server such as MinIO
    pub fn for_local(endpoint: impl Into<String>, access_key: &str, secret_key: &str) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            access_key: Some(access_key.to_string()),
            secret_key: Some(secret_key.to_string()),
            path_style: true,
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }
}
