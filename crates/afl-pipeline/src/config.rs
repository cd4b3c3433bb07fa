//! Configuration management
//!
//! Settings come from `.env`, then the process environment, then the
//! constants below. Credentials are carried as plain values and handed to the
//! clients that need them; nothing here writes back to the environment.

use afl_common::{AflError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordinator::PipelineSettings;
use crate::fetch::DEFAULT_SOURCE;
use crate::naming::{
    COMBINED_STATS_DATASET_ID, COMBINED_STATS_TABLE_ID, PLAYER_STATS_DATASET_ID,
};
use crate::storage::StorageConfig;
use crate::warehouse::bigquery::{
    BigQueryConfig, DEFAULT_API_URL, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_JOB_POLL_INTERVAL_MS,
};
use crate::warehouse::{CombinedTableRequest, TableSchema, DEFAULT_DATASET_LOCATION};

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default bucket for staged season files.
pub const DEFAULT_BUCKET: &str = "afl-data";

/// Default source feed; `{year}` is replaced with the season.
pub const DEFAULT_STATS_SOURCE_URL: &str = "https://afltables.com/afl/stats/player_stats_{year}.csv";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub bucket: String,
    pub project_id: Option<String>,
    pub dataset_location: String,
    pub player_stats_dataset: String,
    pub combined_dataset: String,
    pub combined_table: String,
    pub warehouse_api_url: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub job_poll_interval_ms: u64,
    pub http_timeout_secs: u64,
    pub stats_source_url: String,
    pub stats_source: String,
    pub schema_file: Option<PathBuf>,
    pub storage: StorageConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            project_id: None,
            dataset_location: DEFAULT_DATASET_LOCATION.to_string(),
            player_stats_dataset: PLAYER_STATS_DATASET_ID.to_string(),
            combined_dataset: COMBINED_STATS_DATASET_ID.to_string(),
            combined_table: COMBINED_STATS_TABLE_ID.to_string(),
            warehouse_api_url: DEFAULT_API_URL.to_string(),
            access_token: None,
            job_poll_interval_ms: DEFAULT_JOB_POLL_INTERVAL_MS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            stats_source_url: DEFAULT_STATS_SOURCE_URL.to_string(),
            stats_source: DEFAULT_SOURCE.to_string(),
            schema_file: None,
            storage: StorageConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, then validate
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let access_token = match (lookup("AFL_ACCESS_TOKEN"), lookup("AFL_ACCESS_TOKEN_FILE")) {
            (Some(token), _) => Some(token),
            (None, Some(path)) => Some(read_token_file(Path::new(&path))?),
            (None, None) => None,
        };

        let config = Self {
            bucket: lookup("AFL_BUCKET").unwrap_or(defaults.bucket),
            project_id: lookup("AFL_PROJECT_ID").filter(|p| !p.is_empty()),
            dataset_location: lookup("AFL_DATASET_LOCATION").unwrap_or(defaults.dataset_location),
            player_stats_dataset: lookup("AFL_PLAYER_STATS_DATASET")
                .unwrap_or(defaults.player_stats_dataset),
            combined_dataset: lookup("AFL_COMBINED_DATASET").unwrap_or(defaults.combined_dataset),
            combined_table: lookup("AFL_COMBINED_TABLE").unwrap_or(defaults.combined_table),
            warehouse_api_url: lookup("AFL_WAREHOUSE_API_URL").unwrap_or(defaults.warehouse_api_url),
            access_token,
            job_poll_interval_ms: parse_or(
                lookup("AFL_JOB_POLL_INTERVAL_MS"),
                "AFL_JOB_POLL_INTERVAL_MS",
                defaults.job_poll_interval_ms,
            )?,
            http_timeout_secs: parse_or(
                lookup("AFL_HTTP_TIMEOUT_SECS"),
                "AFL_HTTP_TIMEOUT_SECS",
                defaults.http_timeout_secs,
            )?,
            stats_source_url: lookup("AFL_STATS_SOURCE_URL").unwrap_or(defaults.stats_source_url),
            stats_source: lookup("AFL_STATS_SOURCE").unwrap_or(defaults.stats_source),
            schema_file: lookup("AFL_SCHEMA_FILE").map(PathBuf::from),
            storage: StorageConfig::from_lookup(&lookup),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("AFL_BUCKET", &self.bucket),
            ("AFL_DATASET_LOCATION", &self.dataset_location),
            ("AFL_PLAYER_STATS_DATASET", &self.player_stats_dataset),
            ("AFL_COMBINED_DATASET", &self.combined_dataset),
            ("AFL_COMBINED_TABLE", &self.combined_table),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(AflError::config(format!("{} cannot be empty", name)));
        }

        if self.job_poll_interval_ms == 0 {
            return Err(AflError::config("AFL_JOB_POLL_INTERVAL_MS must be greater than 0"));
        }

        if self.http_timeout_secs == 0 {
            return Err(AflError::config("AFL_HTTP_TIMEOUT_SECS must be greater than 0"));
        }

        if !self.stats_source_url.contains("{year}") {
            return Err(AflError::config(
                "AFL_STATS_SOURCE_URL must contain a {year} placeholder",
            ));
        }

        if let Some(path) = &self.schema_file {
            if !path.is_file() {
                return Err(AflError::config(format!(
                    "Schema file not found: {}",
                    path.display()
                )));
            }
        }

        if self.access_token.is_none() {
            tracing::warn!("No warehouse access token configured - requests will be unauthenticated");
        }

        Ok(())
    }

    /// Project id, which the cloud backend cannot run without
    pub fn require_project(&self) -> Result<&str> {
        self.project_id
            .as_deref()
            .ok_or_else(|| AflError::config("AFL_PROJECT_ID must be set for the cloud backend"))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn warehouse_config(&self) -> Result<BigQueryConfig> {
        Ok(BigQueryConfig {
            base_url: self.warehouse_api_url.clone(),
            project: self.require_project()?.to_string(),
            access_token: self.access_token.clone(),
            poll_interval: Duration::from_millis(self.job_poll_interval_ms),
            timeout: self.http_timeout(),
        })
    }

    /// Pinned per-year schema, if one is configured
    pub fn pinned_schema(&self) -> Result<Option<TableSchema>> {
        self.schema_file
            .as_deref()
            .map(TableSchema::from_json_file)
            .transpose()
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        Ok(PipelineSettings {
            player_stats_dataset: self.player_stats_dataset.clone(),
            combined: CombinedTableRequest {
                source_dataset: self.player_stats_dataset.clone(),
                dest_dataset: self.combined_dataset.clone(),
                dest_table: self.combined_table.clone(),
                ..CombinedTableRequest::default()
            },
            source: self.stats_source.clone(),
            schema: self.pinned_schema()?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, name: &str, default: T) -> Result<T> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| AflError::config(format!("{} has an invalid value '{}'", name, value))),
        None => Ok(default),
    }
}

fn read_token_file(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(AflError::config(format!(
            "Access token file not found: {}",
            path.display()
        )));
    }
    let token = std::fs::read_to_string(path)?;
    Ok(token.trim().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bucket, "afl-data");
        assert_eq!(config.dataset_location, "US");
        assert_eq!(config.player_stats_dataset, "afl_player_data");
        assert_eq!(config.combined_dataset, "afl_data");
        assert_eq!(config.combined_table, "combined_player_stats_bq");
        assert_eq!(config.job_poll_interval_ms, 1000);
        assert!(config.project_id.is_none());
        assert!(config.require_project().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("AFL_BUCKET", "my-bucket"),
            ("AFL_PROJECT_ID", "my-project"),
            ("AFL_ACCESS_TOKEN", "token"),
            ("AFL_JOB_POLL_INTERVAL_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.bucket, "my-bucket");
        let warehouse = config.warehouse_config().unwrap();
        assert_eq!(warehouse.project, "my-project");
        assert_eq!(warehouse.access_token.as_deref(), Some("token"));
        assert_eq!(warehouse.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_token_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  secret-token  ").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config =
            PipelineConfig::from_lookup(lookup(&[("AFL_ACCESS_TOKEN_FILE", path.as_str())])).unwrap();
        assert_eq!(config.access_token.as_deref(), Some("secret-token"));
    }

    #[test]
    fn test_missing_token_file_is_config_error() {
        let result =
            PipelineConfig::from_lookup(lookup(&[("AFL_ACCESS_TOKEN_FILE", "/nonexistent/token")]));
        assert!(matches!(result, Err(AflError::Config(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(PipelineConfig::from_lookup(lookup(&[("AFL_JOB_POLL_INTERVAL_MS", "0")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("AFL_HTTP_TIMEOUT_SECS", "soon")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("AFL_BUCKET", " ")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[(
            "AFL_STATS_SOURCE_URL",
            "https://example.com/all.csv"
        )]))
        .is_err());
    }

    #[test]
    fn test_pipeline_settings_use_configured_names() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("AFL_PLAYER_STATS_DATASET", "staging"),
            ("AFL_COMBINED_TABLE", "all_years"),
        ]))
        .unwrap();
        let settings = config.pipeline_settings().unwrap();

        assert_eq!(settings.player_stats_dataset, "staging");
        assert_eq!(settings.combined.source_dataset, "staging");
        assert_eq!(settings.combined.dest_table, "all_years");
        assert_eq!(settings.combined.table_prefix, "player_stats_");
        assert!(settings.schema.is_none());
    }
}
