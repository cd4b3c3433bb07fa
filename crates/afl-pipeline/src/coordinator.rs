//! Pipeline coordinator
//!
//! Drives each requested year through:
//! 1. Fetch: real feed or synthetic sample
//! 2. Preprocess: coercions, `year` injection, column pruning
//! 3. Store: CSV object at `player_stats/player_stats_{year}`
//! 4. Load: replace the year's warehouse table from the stored object
//!
//! Years are processed one after another and in isolation: a failed year is
//! recorded and the batch moves on. The combined table is then rebuilt from
//! the years that made it all the way through.

use afl_common::{AflError, ErrorKind, YearRecord};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

use crate::fetch::{StatsFetcher, DEFAULT_SOURCE};
use crate::naming::{object_path, table_name, PLAYER_STATS_DATASET_ID};
use crate::processor::preprocess_player_stats;
use crate::storage::StorageManager;
use crate::warehouse::{CombinedTableRequest, TableSchema, WarehouseManager};

/// Per-run settings for the coordinator
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Dataset holding the per-year tables
    pub player_stats_dataset: String,
    pub combined: CombinedTableRequest,
    /// Source name handed to the fetch adapter
    pub source: String,
    /// Pinned schema for per-year loads; autodetect when absent
    pub schema: Option<TableSchema>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            player_stats_dataset: PLAYER_STATS_DATASET_ID.to_string(),
            combined: CombinedTableRequest::default(),
            source: DEFAULT_SOURCE.to_string(),
            schema: None,
        }
    }
}

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AflError> for FailureDetail {
    fn from(error: &AflError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Result of processing one year
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Succeeded { table: String },
    FailedAtFetch(FailureDetail),
    FailedAtStore(FailureDetail),
    FailedAtLoad(FailureDetail),
}

impl ProcessingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingOutcome::Succeeded { .. })
    }

    pub fn failure(&self) -> Option<&FailureDetail> {
        match self {
            ProcessingOutcome::Succeeded { .. } => None,
            ProcessingOutcome::FailedAtFetch(detail)
            | ProcessingOutcome::FailedAtStore(detail)
            | ProcessingOutcome::FailedAtLoad(detail) => Some(detail),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingOutcome::Succeeded { .. } => "succeeded",
            ProcessingOutcome::FailedAtFetch(_) => "failed_at_fetch",
            ProcessingOutcome::FailedAtStore(_) => "failed_at_store",
            ProcessingOutcome::FailedAtLoad(_) => "failed_at_load",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct YearReport {
    pub year: i32,
    pub outcome: ProcessingOutcome,
    pub duration: Duration,
}

/// What happened to the combined table at the end of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CombinedOutcome {
    /// Combined table creation was not requested
    NotRequested,
    /// Requested, but no year succeeded
    Skipped,
    Created { table: String },
    Failed(FailureDetail),
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<YearReport>,
    pub successful_years: Vec<i32>,
    pub combined: CombinedOutcome,
    pub duration: Duration,
}

impl BatchReport {
    /// Years that succeeded, in the order they were requested
    pub fn successful_years(&self) -> &[i32] {
        &self.successful_years
    }

    pub fn failed_years(&self) -> Vec<i32> {
        self.outcomes
            .iter()
            .filter(|report| !report.outcome.is_success())
            .map(|report| report.year)
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|report| report.outcome.is_success())
            && !matches!(self.combined, CombinedOutcome::Failed(_))
    }
}

pub struct AflPipeline {
    settings: PipelineSettings,
    storage: StorageManager,
    warehouse: WarehouseManager,
    fetcher: Arc<dyn StatsFetcher>,
    sample_fetcher: Arc<dyn StatsFetcher>,
}

impl AflPipeline {
    pub fn new(
        settings: PipelineSettings,
        storage: StorageManager,
        warehouse: WarehouseManager,
        fetcher: Arc<dyn StatsFetcher>,
        sample_fetcher: Arc<dyn StatsFetcher>,
    ) -> Self {
        Self {
            settings,
            storage,
            warehouse,
            fetcher,
            sample_fetcher,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one year end to end. Never panics or returns early with an error;
    /// every failure ends up in the outcome.
    #[instrument(skip(self))]
    pub async fn process_year(
        &self,
        year: i32,
        use_sample_data: bool,
        skip_storage_upload: bool,
    ) -> ProcessingOutcome {
        let path = object_path(year);

        if skip_storage_upload {
            info!("Skipping storage upload for {}, loading existing object", year);
        } else {
            let record = match self.fetch_and_preprocess(year, use_sample_data).await {
                Ok(record) => record,
                Err(e) => {
                    error!(error = %e, "Error fetching data for {}", year);
                    return ProcessingOutcome::FailedAtFetch(FailureDetail::from(&e));
                },
            };

            if let Err(e) = self.storage.upload_record(&record, &path).await {
                error!(error = %e, "Failed to upload data for {} to storage", year);
                return ProcessingOutcome::FailedAtStore(FailureDetail::from(&e));
            }
        }

        let uri = self.storage.uri_for(&path);
        let combined = &self.settings.combined;
        let table_id = table_name(&combined.table_prefix, year, &combined.table_suffix);
        let dataset = &self.settings.player_stats_dataset;

        let loaded = match &self.settings.schema {
            Some(schema) => {
                self.warehouse
                    .upload_from_storage_with_schema(&uri, &table_id, dataset, schema)
                    .await
            },
            None => {
                self.warehouse
                    .upload_from_storage(&uri, &table_id, dataset)
                    .await
            },
        };

        match loaded {
            Ok(()) => {
                info!("Successfully processed data for {}", year);
                ProcessingOutcome::Succeeded {
                    table: format!("{}.{}.{}", self.warehouse.project(), dataset, table_id),
                }
            },
            Err(e) => {
                error!(error = %e, "Failed to load data for {} into the warehouse", year);
                ProcessingOutcome::FailedAtLoad(FailureDetail::from(&e))
            },
        }
    }

    /// Fetch and preprocess, turning a panicking adapter into an error
    async fn fetch_and_preprocess(&self, year: i32, use_sample_data: bool) -> afl_common::Result<YearRecord> {
        let fetcher = if use_sample_data {
            &self.sample_fetcher
        } else {
            &self.fetcher
        };
        info!(adapter = fetcher.name(), "Fetching data for {}", year);

        let source = self.settings.source.as_str();
        let work = async {
            let raw = fetcher.fetch_stats(year, source).await?;
            Ok::<_, AflError>(preprocess_player_stats(raw, year))
        };

        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(AflError::fetch(format!(
                "Fetch adapter '{}' panicked: {}",
                fetcher.name(),
                panic_message(panic.as_ref())
            ))),
        }
    }

    /// Materialize the combined table over `years`
    pub async fn combine(&self, years: &[i32]) -> CombinedOutcome {
        match self
            .warehouse
            .create_combined_table(years, &self.settings.combined)
            .await
        {
            Ok(table) => CombinedOutcome::Created { table },
            Err(e) => {
                error!(error = %e, "Failed to create combined table");
                CombinedOutcome::Failed(FailureDetail::from(&e))
            },
        }
    }

    /// Process every year in order, then rebuild the combined table from the
    /// years that succeeded
    #[instrument(skip(self))]
    pub async fn run_pipeline(
        &self,
        years: &[i32],
        use_sample_data: bool,
        skip_storage_upload: bool,
        create_combined: bool,
    ) -> BatchReport {
        let started_at = Utc::now();
        let batch_start = Instant::now();
        info!(count = years.len(), "Starting pipeline for years {:?}", years);

        let mut outcomes = Vec::with_capacity(years.len());
        let mut successful_years = Vec::new();

        for &year in years {
            let year_start = Instant::now();
            let outcome = self
                .process_year(year, use_sample_data, skip_storage_upload)
                .await;

            if outcome.is_success() {
                successful_years.push(year);
            } else {
                warn!(year, outcome = outcome.as_str(), "Year did not complete");
            }

            outcomes.push(YearReport {
                year,
                outcome,
                duration: year_start.elapsed(),
            });
        }

        let combined = if !create_combined {
            CombinedOutcome::NotRequested
        } else if successful_years.is_empty() {
            warn!("No year succeeded, skipping combined table");
            CombinedOutcome::Skipped
        } else {
            self.combine(&successful_years).await
        };

        let report = BatchReport {
            started_at,
            outcomes,
            successful_years,
            combined,
            duration: batch_start.elapsed(),
        };

        info!(
            succeeded = report.successful_years.len(),
            failed = report.outcomes.len() - report.successful_years.len(),
            duration_ms = report.duration.as_millis() as u64,
            "Pipeline completed. Successfully processed years: {:?}",
            report.successful_years
        );

        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let failed = ProcessingOutcome::FailedAtStore(FailureDetail {
            kind: ErrorKind::StorageWrite,
            message: "bucket missing".to_string(),
        });
        assert!(!failed.is_success());
        assert_eq!(failed.as_str(), "failed_at_store");
        assert_eq!(failed.failure().map(|d| d.kind), Some(ErrorKind::StorageWrite));

        let ok = ProcessingOutcome::Succeeded {
            table: "p.d.t".to_string(),
        };
        assert!(ok.is_success());
        assert!(ok.failure().is_none());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[test]
    fn test_failed_years() {
        let report = BatchReport {
            started_at: Utc::now(),
            outcomes: vec![
                YearReport {
                    year: 2019,
                    outcome: ProcessingOutcome::Succeeded { table: "t".into() },
                    duration: Duration::ZERO,
                },
                YearReport {
                    year: 2020,
                    outcome: ProcessingOutcome::FailedAtFetch(FailureDetail {
                        kind: ErrorKind::AdapterFetch,
                        message: "down".into(),
                    }),
                    duration: Duration::ZERO,
                },
            ],
            successful_years: vec![2019],
            combined: CombinedOutcome::NotRequested,
            duration: Duration::ZERO,
        };

        assert_eq!(report.failed_years(), vec![2020]);
        assert_eq!(report.successful_years(), &[2019]);
        assert!(!report.all_succeeded());
    }
}
