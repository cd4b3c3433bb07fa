//! REST client for the warehouse API
//!
//! Only the handful of endpoints the pipeline needs: dataset get/insert,
//! table get, job insert and job polling.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{
    Dataset, JobHandle, JobKind, JobResult, LoadJobConfig, LoadSchema, TableRef, TableSchema,
    WarehouseClient, WarehouseError, WarehouseResult,
};

// ============================================================================
// Client Constants
// ============================================================================

/// Public REST endpoint
pub const DEFAULT_API_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Delay between job status polls in milliseconds.
pub const DEFAULT_JOB_POLL_INTERVAL_MS: u64 = 1000;

/// Per-request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

const JOB_STATE_DONE: &str = "DONE";

#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub base_url: String,
    pub project: String,
    pub access_token: Option<String>,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl BigQueryConfig {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            project: project.into(),
            access_token: None,
            poll_interval: Duration::from_millis(DEFAULT_JOB_POLL_INTERVAL_MS),
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

pub struct BigQueryClient {
    client: Client,
    base_url: String,
    project: String,
    access_token: Option<String>,
    poll_interval: Duration,
}

// ============================================================================
// Response payloads
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetResource {
    dataset_reference: DatasetReference,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    dataset_id: String,
}

#[derive(Debug, Deserialize)]
struct TableResource {
    #[serde(default)]
    schema: TableSchema,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    #[serde(default)]
    status: JobStatus,
    #[serde(default)]
    statistics: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    message: String,
}

impl JobResource {
    /// Rows written, from `statistics.load.outputRows` or
    /// `statistics.query.numDmlAffectedRows` (both int64-as-string)
    fn output_rows(&self) -> Option<u64> {
        let stats = self.statistics.as_ref()?;
        stats
            .pointer("/load/outputRows")
            .or_else(|| stats.pointer("/query/numDmlAffectedRows"))
            .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_u64()))
    }
}

impl BigQueryClient {
    pub fn new(config: BigQueryConfig) -> WarehouseResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WarehouseError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project: config.project,
            access_token: config.access_token,
            poll_interval: config.poll_interval,
        })
    }

    fn datasets_url(&self) -> String {
        format!("{}/projects/{}/datasets", self.base_url, self.project)
    }

    fn dataset_url(&self, dataset_id: &str) -> String {
        format!("{}/{}", self.datasets_url(), dataset_id)
    }

    fn table_url(&self, table: &TableRef) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            self.base_url, table.project, table.dataset, table.table
        )
    }

    fn jobs_url(&self) -> String {
        format!("{}/projects/{}/jobs", self.base_url, self.project)
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/{}", self.jobs_url(), job_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> WarehouseResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| WarehouseError::Request(format!("{}: {}", what, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = error_message(response).await;
        Err(match status {
            StatusCode::NOT_FOUND => WarehouseError::NotFound(format!("{}: {}", what, detail)),
            StatusCode::CONFLICT => WarehouseError::AlreadyExists(format!("{}: {}", what, detail)),
            _ => WarehouseError::Request(format!("{} returned {}: {}", what, status, detail)),
        })
    }

    async fn insert_job(&self, kind: JobKind, configuration: Value) -> WarehouseResult<JobHandle> {
        let prefix = match kind {
            JobKind::Load => "afl_load",
            JobKind::Query => "afl_query",
        };
        let job_id = format!("{}_{}", prefix, Uuid::new_v4().simple());

        let body = json!({
            "jobReference": { "projectId": self.project, "jobId": job_id },
            "configuration": configuration,
        });

        let response = self
            .send(self.client.post(self.jobs_url()).json(&body), "Job insert")
            .await?;
        let job: JobResource = parse(response).await?;

        debug!(job_id = %job.job_reference.job_id, state = %job.status.state, "Submitted job");

        Ok(JobHandle {
            job_id: job.job_reference.job_id,
            location: job.job_reference.location,
            kind,
        })
    }

    async fn get_job(&self, job: &JobHandle) -> WarehouseResult<JobResource> {
        let mut request = self.client.get(self.job_url(&job.job_id));
        if let Some(location) = &job.location {
            request = request.query(&[("location", location)]);
        }
        parse(self.send(request, "Job status").await?).await
    }
}

async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> WarehouseResult<T> {
    response
        .json()
        .await
        .map_err(|e| WarehouseError::InvalidResponse(e.to_string()))
}

/// Pull `error.message` out of an error body, falling back to the raw text
async fn error_message(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(text)
}

fn load_configuration(uri: &str, table: &TableRef, config: &LoadJobConfig) -> Value {
    let mut load = json!({
        "sourceUris": [uri],
        "destinationTable": {
            "projectId": table.project,
            "datasetId": table.dataset,
            "tableId": table.table,
        },
        "sourceFormat": config.source_format.as_str(),
        "fieldDelimiter": config.field_delimiter.to_string(),
        "skipLeadingRows": config.skip_leading_rows,
        "writeDisposition": config.write_disposition.as_str(),
    });

    match &config.schema {
        LoadSchema::Autodetect => load["autodetect"] = Value::Bool(true),
        LoadSchema::Explicit(schema) => load["schema"] = json!(schema),
    }

    json!({ "load": load })
}

#[async_trait]
impl WarehouseClient for BigQueryClient {
    fn project(&self) -> &str {
        &self.project
    }

    async fn get_dataset(&self, dataset_id: &str) -> WarehouseResult<Dataset> {
        let response = self
            .send(self.client.get(self.dataset_url(dataset_id)), "Dataset get")
            .await?;
        let dataset: DatasetResource = parse(response).await?;
        Ok(Dataset {
            id: dataset.dataset_reference.dataset_id,
            location: dataset.location,
        })
    }

    #[instrument(skip(self))]
    async fn create_dataset(&self, dataset_id: &str, location: &str) -> WarehouseResult<Dataset> {
        let body = json!({
            "datasetReference": { "projectId": self.project, "datasetId": dataset_id },
            "location": location,
        });
        let response = self
            .send(self.client.post(self.datasets_url()).json(&body), "Dataset insert")
            .await?;
        let dataset: DatasetResource = parse(response).await?;
        Ok(Dataset {
            id: dataset.dataset_reference.dataset_id,
            location: dataset.location,
        })
    }

    async fn get_table_schema(&self, table: &TableRef) -> WarehouseResult<TableSchema> {
        let response = self
            .send(self.client.get(self.table_url(table)), "Table get")
            .await?;
        let resource: TableResource = parse(response).await?;
        Ok(resource.schema)
    }

    #[instrument(skip(self, config))]
    async fn load_table_from_uri(
        &self,
        uri: &str,
        table: &TableRef,
        config: &LoadJobConfig,
    ) -> WarehouseResult<JobHandle> {
        self.insert_job(JobKind::Load, load_configuration(uri, table, config))
            .await
    }

    async fn query(&self, sql: &str) -> WarehouseResult<JobHandle> {
        let configuration = json!({
            "query": { "query": sql, "useLegacySql": false }
        });
        self.insert_job(JobKind::Query, configuration).await
    }

    /// Polls until the job is `DONE`; there is no overall deadline
    async fn wait_for_job(&self, job: &JobHandle) -> WarehouseResult<JobResult> {
        loop {
            let resource = self.get_job(job).await?;

            if resource.status.state == JOB_STATE_DONE {
                let output_rows = resource.output_rows();
                if let Some(error) = resource.status.error_result {
                    let message = match error.reason {
                        Some(reason) => format!("{} ({})", error.message, reason),
                        None => error.message,
                    };
                    return Err(WarehouseError::JobFailed {
                        job_id: job.job_id.clone(),
                        message,
                    });
                }

                info!(job_id = %job.job_id, rows = ?output_rows, "Job finished");
                return Ok(JobResult {
                    job_id: resource.job_reference.job_id,
                    output_rows,
                });
            }

            debug!(job_id = %job.job_id, state = %resource.status.state, "Waiting for job");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::warehouse::{Field, FieldType};

    #[test]
    fn test_load_configuration_autodetect() {
        let table = TableRef::new("p", "afl_player_data", "player_stats_2020_bq");
        let config = load_configuration(
            "gs://afl-data/player_stats/player_stats_2020",
            &table,
            &LoadJobConfig::default(),
        );

        assert_eq!(config["load"]["autodetect"], json!(true));
        assert_eq!(config["load"]["skipLeadingRows"], json!(1));
        assert_eq!(config["load"]["fieldDelimiter"], json!(","));
        assert_eq!(config["load"]["writeDisposition"], json!("WRITE_TRUNCATE"));
        assert_eq!(config["load"]["destinationTable"]["tableId"], json!("player_stats_2020_bq"));
        assert!(config["load"].get("schema").is_none());
    }

    #[test]
    fn test_load_configuration_pinned_schema() {
        let table = TableRef::new("p", "d", "t");
        let schema = TableSchema::new(vec![Field::new("ID", FieldType::Integer)]);
        let config = load_configuration("gs://b/o", &table, &LoadJobConfig::with_schema(schema));

        assert!(config["load"].get("autodetect").is_none());
        assert_eq!(
            config["load"]["schema"],
            json!({ "fields": [{ "name": "ID", "type": "INTEGER" }] })
        );
    }

    #[test]
    fn test_output_rows_from_string_stat() {
        let job: JobResource = serde_json::from_value(json!({
            "jobReference": { "jobId": "j1" },
            "status": { "state": "DONE" },
            "statistics": { "load": { "outputRows": "10" } }
        }))
        .unwrap();
        assert_eq!(job.output_rows(), Some(10));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let mut config = BigQueryConfig::new("p");
        config.base_url = "http://localhost:9050/".to_string();
        let client = BigQueryClient::new(config).unwrap();
        assert_eq!(client.datasets_url(), "http://localhost:9050/projects/p/datasets");
    }
}
