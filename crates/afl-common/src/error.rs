//! Error types for the AFL pipeline
//!
//! Every collaborator boundary reports failures through [`AflError`]. The
//! coordinator never inspects the message text; it branches on [`ErrorKind`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, AflError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum AflError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Storage write error: {0}")]
    Storage(String),

    #[error("Dataset provisioning failed for '{dataset}': {message}")]
    DatasetProvision { dataset: String, message: String },

    #[error("Load job failed for '{table}': {message}")]
    LoadJob { table: String, message: String },

    #[error("Query job failed: {0}")]
    QueryJob(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Schema mismatch in '{table}': {message}")]
    SchemaMismatch { table: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error taxonomy without payloads, suitable for reports and branching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AdapterFetch,
    TransformWarning,
    StorageWrite,
    DatasetProvision,
    LoadJob,
    QueryJob,
    Precondition,
    SchemaMismatch,
    Config,
    Parse,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AdapterFetch => "adapter_fetch",
            ErrorKind::TransformWarning => "transform_warning",
            ErrorKind::StorageWrite => "storage_write",
            ErrorKind::DatasetProvision => "dataset_provision",
            ErrorKind::LoadJob => "load_job",
            ErrorKind::QueryJob => "query_job",
            ErrorKind::Precondition => "precondition",
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::Config => "config",
            ErrorKind::Parse => "parse",
            ErrorKind::Io => "io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AflError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AflError::Fetch(_) => ErrorKind::AdapterFetch,
            AflError::Storage(_) => ErrorKind::StorageWrite,
            AflError::DatasetProvision { .. } => ErrorKind::DatasetProvision,
            AflError::LoadJob { .. } => ErrorKind::LoadJob,
            AflError::QueryJob(_) => ErrorKind::QueryJob,
            AflError::Precondition(_) => ErrorKind::Precondition,
            AflError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            AflError::Config(_) => ErrorKind::Config,
            AflError::Parse(_) => ErrorKind::Parse,
            AflError::Io(_) => ErrorKind::Io,
        }
    }

    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
