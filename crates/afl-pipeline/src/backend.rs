//! Wiring of concrete clients into a pipeline

use afl_common::Result;
use std::sync::Arc;
use tracing::info;

use crate::cli::Backend;
use crate::config::PipelineConfig;
use crate::coordinator::AflPipeline;
use crate::fetch::{HttpStatsFetcher, SampleStatsFetcher};
use crate::storage::{InMemoryObjectStore, ObjectStore, S3ObjectStore, StorageManager};
use crate::warehouse::{BigQueryClient, InMemoryWarehouse, WarehouseClient, WarehouseManager};

/// Project name used by the memory backend when none is configured
pub const LOCAL_PROJECT_ID: &str = "local";

pub async fn build_pipeline(config: &PipelineConfig, backend: Backend) -> Result<AflPipeline> {
    let (store, warehouse): (Arc<dyn ObjectStore>, Arc<dyn WarehouseClient>) = match backend {
        Backend::Cloud => {
            let warehouse = BigQueryClient::new(config.warehouse_config()?)
                .map_err(|e| afl_common::AflError::config(e.to_string()))?;
            let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&config.storage).await?);
            let warehouse: Arc<dyn WarehouseClient> = Arc::new(warehouse);
            (store, warehouse)
        },
        Backend::Memory => {
            let store = Arc::new(InMemoryObjectStore::new());
            let project = config.project_id.as_deref().unwrap_or(LOCAL_PROJECT_ID);
            let warehouse: Arc<dyn WarehouseClient> =
                Arc::new(InMemoryWarehouse::new(project, store.clone()));
            let store: Arc<dyn ObjectStore> = store;
            (store, warehouse)
        },
    };

    info!(
        ?backend,
        bucket = %config.bucket,
        project = warehouse.project(),
        "Pipeline backend ready"
    );

    let fetcher = HttpStatsFetcher::new(config.stats_source_url.clone(), config.http_timeout())?;

    Ok(AflPipeline::new(
        config.pipeline_settings()?,
        StorageManager::new(store, config.bucket.clone()),
        WarehouseManager::with_location(warehouse, config.dataset_location.clone()),
        Arc::new(fetcher),
        Arc::new(SampleStatsFetcher),
    ))
}
