use afl_common::{AflError, Result};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::{
    LoadJobConfig, TableRef, TableSchema, WarehouseClient, WarehouseError,
    DEFAULT_DATASET_LOCATION,
};
use crate::naming::{
    table_name, COMBINED_STATS_DATASET_ID, COMBINED_STATS_TABLE_ID, PLAYER_STATS_DATASET_ID,
    PLAYER_STATS_TABLE_PREFIX, PLAYER_STATS_TABLE_SUFFIX,
};

/// Where the combined table reads from and writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedTableRequest {
    pub source_dataset: String,
    pub dest_dataset: String,
    pub table_prefix: String,
    pub table_suffix: String,
    pub dest_table: String,
}

impl Default for CombinedTableRequest {
    fn default() -> Self {
        Self {
            source_dataset: PLAYER_STATS_DATASET_ID.to_string(),
            dest_dataset: COMBINED_STATS_DATASET_ID.to_string(),
            table_prefix: PLAYER_STATS_TABLE_PREFIX.to_string(),
            table_suffix: PLAYER_STATS_TABLE_SUFFIX.to_string(),
            dest_table: COMBINED_STATS_TABLE_ID.to_string(),
        }
    }
}

impl CombinedTableRequest {
    pub fn source_tables(&self, project: &str, years: &[i32]) -> Vec<TableRef> {
        years
            .iter()
            .map(|&year| {
                TableRef::new(
                    project,
                    &self.source_dataset,
                    table_name(&self.table_prefix, year, &self.table_suffix),
                )
            })
            .collect()
    }

    pub fn destination(&self, project: &str) -> TableRef {
        TableRef::new(project, &self.dest_dataset, &self.dest_table)
    }
}

/// Build the statement that replaces `destination` with the union of `sources`.
///
/// Sources are referenced in the order given; `UNION ALL` only appears when
/// there is more than one.
pub fn build_combined_query(destination: &TableRef, sources: &[TableRef]) -> String {
    let selects = sources
        .iter()
        .map(|table| format!("SELECT * FROM `{}`", table))
        .collect::<Vec<_>>()
        .join("\nUNION ALL\n");

    format!("CREATE OR REPLACE TABLE `{}` AS\n{}", destination, selects)
}

/// Idempotent provisioning, bulk loads and combined-table materialization
#[derive(Clone)]
pub struct WarehouseManager {
    client: Arc<dyn WarehouseClient>,
    location: String,
}

impl WarehouseManager {
    pub fn new(client: Arc<dyn WarehouseClient>) -> Self {
        Self::with_location(client, DEFAULT_DATASET_LOCATION)
    }

    pub fn with_location(client: Arc<dyn WarehouseClient>, location: impl Into<String>) -> Self {
        Self {
            client,
            location: location.into(),
        }
    }

    pub fn project(&self) -> &str {
        self.client.project()
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Make sure `dataset_id` exists, creating it if it does not.
    ///
    /// Losing a creation race to another run counts as success.
    #[instrument(skip(self))]
    pub async fn ensure_dataset_exists(&self, dataset_id: &str) -> Result<()> {
        let provision_error = |message: String| AflError::DatasetProvision {
            dataset: dataset_id.to_string(),
            message,
        };

        match self.client.get_dataset(dataset_id).await {
            Ok(_) => {
                info!("Dataset {} already exists", dataset_id);
                return Ok(());
            },
            Err(WarehouseError::NotFound(_)) => {},
            Err(e) => {
                error!(error = %e, "Error checking dataset {}", dataset_id);
                return Err(provision_error(e.to_string()));
            },
        }

        match self.client.create_dataset(dataset_id, &self.location).await {
            Ok(_) => {
                info!(location = %self.location, "Created dataset {}", dataset_id);
                Ok(())
            },
            Err(WarehouseError::AlreadyExists(_)) => {
                info!("Dataset {} was created concurrently", dataset_id);
                Ok(())
            },
            Err(e) => {
                error!(error = %e, "Error creating dataset {}", dataset_id);
                Err(provision_error(e.to_string()))
            },
        }
    }

    /// Load a staged CSV object into `dataset_id.table_id`, replacing the table
    pub async fn upload_from_storage(&self, uri: &str, table_id: &str, dataset_id: &str) -> Result<()> {
        self.load(uri, table_id, dataset_id, LoadJobConfig::default())
            .await
    }

    /// Same as [`upload_from_storage`](Self::upload_from_storage) with a pinned schema
    pub async fn upload_from_storage_with_schema(
        &self,
        uri: &str,
        table_id: &str,
        dataset_id: &str,
        schema: &TableSchema,
    ) -> Result<()> {
        self.load(uri, table_id, dataset_id, LoadJobConfig::with_schema(schema.clone()))
            .await
    }

    #[instrument(skip(self, config))]
    async fn load(
        &self,
        uri: &str,
        table_id: &str,
        dataset_id: &str,
        config: LoadJobConfig,
    ) -> Result<()> {
        self.ensure_dataset_exists(dataset_id).await?;

        let table = TableRef::new(self.project(), dataset_id, table_id);
        let load_error = |e: WarehouseError| {
            error!(error = %e, "Error uploading data to {}", table);
            AflError::LoadJob {
                table: table.to_string(),
                message: e.to_string(),
            }
        };

        let job = self
            .client
            .load_table_from_uri(uri, &table, &config)
            .await
            .map_err(load_error)?;
        let result = self.client.wait_for_job(&job).await.map_err(load_error)?;

        info!(
            job_id = %result.job_id,
            rows = ?result.output_rows,
            "Loaded {} into {}",
            uri,
            table
        );
        Ok(())
    }

    /// Check every table has the same schema as the first one
    pub async fn verify_schema_compatibility(&self, tables: &[TableRef]) -> Result<()> {
        let Some((first, rest)) = tables.split_first() else {
            return Ok(());
        };

        let reference = self.table_schema(first).await?;
        for table in rest {
            let schema = self.table_schema(table).await?;
            if let Some(message) = reference.difference(&schema) {
                warn!(%table, reference = %first, "Schema drift detected: {}", message);
                return Err(AflError::SchemaMismatch {
                    table: table.to_string(),
                    message: format!("{} (compared with {})", message, first),
                });
            }
        }
        Ok(())
    }

    async fn table_schema(&self, table: &TableRef) -> Result<TableSchema> {
        self.client
            .get_table_schema(table)
            .await
            .map_err(|e| AflError::QueryJob(format!("Cannot read schema of {}: {}", table, e)))
    }

    /// Replace the combined table with the union of the given years' tables.
    ///
    /// Returns the fully qualified destination. An empty year list is
    /// rejected before anything is sent to the warehouse.
    #[instrument(skip(self, request))]
    pub async fn create_combined_table(
        &self,
        years: &[i32],
        request: &CombinedTableRequest,
    ) -> Result<String> {
        if years.is_empty() {
            error!("No years provided for combined table");
            return Err(AflError::Precondition(
                "No years provided for combined table".to_string(),
            ));
        }

        self.ensure_dataset_exists(&request.dest_dataset).await?;

        let sources = request.source_tables(self.project(), years);
        let destination = request.destination(self.project());

        self.verify_schema_compatibility(&sources).await?;

        let sql = build_combined_query(&destination, &sources);
        info!(tables = sources.len(), "Creating combined table {}", destination);

        let query_error = |e: WarehouseError| {
            error!(error = %e, "Error creating combined table {}", destination);
            AflError::QueryJob(e.to_string())
        };
        let job = self.client.query(&sql).await.map_err(query_error)?;
        self.client.wait_for_job(&job).await.map_err(query_error)?;

        info!("Created combined table {}", destination);
        Ok(destination.to_string())
    }
}
