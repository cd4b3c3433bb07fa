//! Warehouse access
//!
//! [`WarehouseClient`] is the raw dataset/table/job API. [`WarehouseManager`]
//! layers idempotent provisioning, bulk loads and the combined-table query on
//! top of it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod bigquery;
pub mod manager;
pub mod memory;
pub mod schema;

pub use bigquery::{BigQueryClient, BigQueryConfig};
pub use manager::{build_combined_query, CombinedTableRequest, WarehouseManager};
pub use memory::{InMemoryWarehouse, WarehouseCall};
pub use schema::{Field, FieldType, TableSchema};

/// Default location for newly created datasets
pub const DEFAULT_DATASET_LOCATION: &str = "US";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WarehouseError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Warehouse request failed: {0}")]
    Request(String),

    #[error("Invalid warehouse response: {0}")]
    InvalidResponse(String),
}

pub type WarehouseResult<T> = std::result::Result<T, WarehouseError>;

/// Fully qualified table reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Parse `project.dataset.table`
    pub fn parse(qualified: &str) -> Option<Self> {
        let mut parts = qualified.split('.');
        let (project, dataset, table) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || [project, dataset, table].iter().any(|p| p.is_empty()) {
            return None;
        }
        Some(Self::new(project, dataset, table))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Load,
    Query,
}

/// Handle to a submitted job, resolved with [`WarehouseClient::wait_for_job`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub location: Option<String>,
    pub kind: JobKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub output_rows: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    Csv,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Csv => "CSV",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteDisposition {
    WriteTruncate,
    WriteAppend,
    WriteEmpty,
}

impl WriteDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::WriteTruncate => "WRITE_TRUNCATE",
            WriteDisposition::WriteAppend => "WRITE_APPEND",
            WriteDisposition::WriteEmpty => "WRITE_EMPTY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadSchema {
    #[default]
    Autodetect,
    Explicit(TableSchema),
}

/// Bulk load configuration
///
/// The default is what every per-year load uses: one header row, comma
/// separated CSV, schema autodetection, full overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJobConfig {
    pub schema: LoadSchema,
    pub skip_leading_rows: u32,
    pub source_format: SourceFormat,
    pub field_delimiter: char,
    pub write_disposition: WriteDisposition,
}

impl Default for LoadJobConfig {
    fn default() -> Self {
        Self {
            schema: LoadSchema::Autodetect,
            skip_leading_rows: 1,
            source_format: SourceFormat::Csv,
            field_delimiter: ',',
            write_disposition: WriteDisposition::WriteTruncate,
        }
    }
}

impl LoadJobConfig {
    pub fn with_schema(schema: TableSchema) -> Self {
        Self {
            schema: LoadSchema::Explicit(schema),
            ..Self::default()
        }
    }
}

/// Dataset, table and job primitives of an analytical warehouse
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Project every dataset lives in
    fn project(&self) -> &str;

    async fn get_dataset(&self, dataset_id: &str) -> WarehouseResult<Dataset>;

    async fn create_dataset(&self, dataset_id: &str, location: &str) -> WarehouseResult<Dataset>;

    async fn get_table_schema(&self, table: &TableRef) -> WarehouseResult<TableSchema>;

    async fn load_table_from_uri(
        &self,
        uri: &str,
        table: &TableRef,
        config: &LoadJobConfig,
    ) -> WarehouseResult<JobHandle>;

    async fn query(&self, sql: &str) -> WarehouseResult<JobHandle>;

    /// Block until the job finishes. A job that finished with an error
    /// resolves to [`WarehouseError::JobFailed`].
    async fn wait_for_job(&self, job: &JobHandle) -> WarehouseResult<JobResult>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ref_roundtrip() {
        let table = TableRef::new("proj", "afl_player_data", "player_stats_2020_bq");
        assert_eq!(table.to_string(), "proj.afl_player_data.player_stats_2020_bq");
        assert_eq!(TableRef::parse(&table.to_string()), Some(table));
        assert_eq!(TableRef::parse("proj.dataset"), None);
        assert_eq!(TableRef::parse("a..c"), None);
    }

    #[test]
    fn test_default_load_config() {
        let config = LoadJobConfig::default();
        assert_eq!(config.schema, LoadSchema::Autodetect);
        assert_eq!(config.skip_leading_rows, 1);
        assert_eq!(config.field_delimiter, ',');
        assert_eq!(config.source_format.as_str(), "CSV");
        assert_eq!(config.write_disposition.as_str(), "WRITE_TRUNCATE");
    }
}
