//! In-process warehouse
//!
//! Backs the `memory` backend and the test suite. Loads read staged objects
//! straight out of an [`InMemoryObjectStore`]; the combined-table statement
//! is parsed and executed rather than pattern matched, so a malformed query
//! fails here the same way it would remotely.

use afl_common::YearRecord;
use async_trait::async_trait;
use sqlparser::ast::{
    CreateTable, ObjectName, Query, SelectItem, SetExpr, SetOperator, SetQuantifier, Statement,
    TableFactor,
};
use sqlparser::dialect::BigQueryDialect;
use sqlparser::parser::Parser;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{
    Dataset, JobHandle, JobKind, JobResult, LoadJobConfig, LoadSchema, TableRef, TableSchema,
    WarehouseClient, WarehouseError, WarehouseResult, WriteDisposition,
};
use crate::codec::decode_csv;
use crate::naming::parse_storage_uri;
use crate::storage::InMemoryObjectStore;

/// One call made against the warehouse, in order of arrival
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarehouseCall {
    GetDataset(String),
    CreateDataset { dataset: String, location: String },
    GetTableSchema(TableRef),
    LoadTable { uri: String, table: TableRef },
    Query(String),
    WaitForJob(String),
}

#[derive(Debug, Clone)]
struct StoredTable {
    schema: TableSchema,
    data: YearRecord,
}

#[derive(Debug, Default)]
struct State {
    datasets: HashMap<String, String>,
    tables: HashMap<(String, String), StoredTable>,
    jobs: HashMap<String, Result<Option<u64>, String>>,
    calls: Vec<WarehouseCall>,
    next_job: u64,
    fail_dataset_lookup: bool,
    report_create_conflict: bool,
    fail_queries: bool,
    failing_loads: HashSet<String>,
}

pub struct InMemoryWarehouse {
    project: String,
    store: Arc<InMemoryObjectStore>,
    state: Mutex<State>,
}

impl InMemoryWarehouse {
    pub fn new(project: impl Into<String>, store: Arc<InMemoryObjectStore>) -> Self {
        Self {
            project: project.into(),
            store,
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------------
    // Failure injection
    // ------------------------------------------------------------------------

    /// Dataset lookups fail with an error other than "not found"
    pub fn fail_dataset_lookup(&self, fail: bool) {
        self.lock().fail_dataset_lookup = fail;
    }

    /// Dataset creation reports a conflict, as when another run won the race
    pub fn report_create_conflict(&self, conflict: bool) {
        self.lock().report_create_conflict = conflict;
    }

    pub fn fail_queries(&self, fail: bool) {
        self.lock().fail_queries = fail;
    }

    /// Load jobs into `table_id` (any dataset) finish with an error
    pub fn fail_loads_into(&self, table_id: &str) {
        self.lock().failing_loads.insert(table_id.to_string());
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn calls(&self) -> Vec<WarehouseCall> {
        self.lock().calls.clone()
    }

    pub fn create_dataset_calls(&self) -> usize {
        self.count(|call| matches!(call, WarehouseCall::CreateDataset { .. }))
    }

    pub fn load_calls(&self) -> usize {
        self.count(|call| matches!(call, WarehouseCall::LoadTable { .. }))
    }

    pub fn queries(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                WarehouseCall::Query(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn has_dataset(&self, dataset_id: &str) -> bool {
        self.lock().datasets.contains_key(dataset_id)
    }

    pub fn table(&self, dataset_id: &str, table_id: &str) -> Option<YearRecord> {
        self.lock()
            .tables
            .get(&(dataset_id.to_string(), table_id.to_string()))
            .map(|table| table.data.clone())
    }

    pub fn table_row_count(&self, dataset_id: &str, table_id: &str) -> Option<usize> {
        self.table(dataset_id, table_id).map(|t| t.row_count())
    }

    /// Seed a table directly, creating its dataset if needed
    pub fn insert_table(&self, dataset_id: &str, table_id: &str, data: YearRecord) {
        let schema = TableSchema::infer(&data);
        let mut state = self.lock();
        state
            .datasets
            .entry(dataset_id.to_string())
            .or_insert_with(|| super::DEFAULT_DATASET_LOCATION.to_string());
        state.tables.insert(
            (dataset_id.to_string(), table_id.to_string()),
            StoredTable { schema, data },
        );
    }

    fn count(&self, predicate: impl Fn(&WarehouseCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(*call)).count()
    }

    fn record(&self, call: WarehouseCall) {
        self.lock().calls.push(call);
    }

    fn finish_job(&self, kind: JobKind, outcome: Result<Option<u64>, String>) -> JobHandle {
        let mut state = self.lock();
        state.next_job += 1;
        let job_id = format!("job_{}", state.next_job);
        state.jobs.insert(job_id.clone(), outcome);
        JobHandle {
            job_id,
            location: None,
            kind,
        }
    }

    // ------------------------------------------------------------------------
    // Job execution
    // ------------------------------------------------------------------------

    fn run_load(&self, uri: &str, table: &TableRef, config: &LoadJobConfig) -> Result<u64, String> {
        if table.project != self.project {
            return Err(format!("Unknown project '{}'", table.project));
        }
        if self.lock().failing_loads.contains(&table.table) {
            return Err(format!("Load into {} rejected", table));
        }
        if !self.lock().datasets.contains_key(&table.dataset) {
            return Err(format!("Not found: Dataset {}:{}", table.project, table.dataset));
        }

        let (bucket, path) =
            parse_storage_uri(uri).ok_or_else(|| format!("Unsupported source URI '{}'", uri))?;
        let bytes = self
            .store
            .get(bucket, path)
            .ok_or_else(|| format!("Not found: URI {}", uri))?;
        let mut data = decode_csv(&bytes).map_err(|e| e.to_string())?;

        let schema = match &config.schema {
            LoadSchema::Autodetect => TableSchema::infer(&data),
            LoadSchema::Explicit(schema) => {
                apply_schema(&mut data, schema)?;
                schema.clone()
            },
        };

        let rows = data.row_count() as u64;
        let key = (table.dataset.clone(), table.table.clone());
        let mut state = self.lock();
        if let Some(existing) = state.tables.get_mut(&key) {
            match config.write_disposition {
                WriteDisposition::WriteAppend => {
                    if let Some(diff) = existing.schema.difference(&schema) {
                        return Err(format!("Provided schema does not match {}: {}", table, diff));
                    }
                    for row in data.rows() {
                        existing.data.push_row(row.clone()).map_err(|e| e.to_string())?;
                    }
                    return Ok(rows);
                },
                WriteDisposition::WriteEmpty if !existing.data.is_empty() => {
                    return Err(format!("Table {} is not empty", table));
                },
                _ => {},
            }
        }
        state.tables.insert(key, StoredTable { schema, data });

        Ok(rows)
    }

    fn run_query(&self, sql: &str) -> Result<u64, String> {
        if self.lock().fail_queries {
            return Err("Query rejected".to_string());
        }

        let statements =
            Parser::parse_sql(&BigQueryDialect {}, sql).map_err(|e| format!("Syntax error: {}", e))?;
        let [Statement::CreateTable(create)] = statements.as_slice() else {
            return Err("Only a single CREATE TABLE ... AS SELECT statement is supported".to_string());
        };

        let CreateTable {
            or_replace,
            name,
            query,
            ..
        } = create;
        let query = query
            .as_ref()
            .ok_or_else(|| "CREATE TABLE without AS SELECT is not supported".to_string())?;

        let destination = self.resolve(name)?;
        let sources = union_sources(query)?
            .iter()
            .map(|source| self.resolve(source))
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.lock();
        if !state.datasets.contains_key(&destination.dataset) {
            return Err(format!("Not found: Dataset {}:{}", destination.project, destination.dataset));
        }

        let dest_key = (destination.dataset.clone(), destination.table.clone());
        if !*or_replace && state.tables.contains_key(&dest_key) {
            return Err(format!("Already Exists: Table {}", destination));
        }

        let mut combined: Option<StoredTable> = None;
        for source in &sources {
            let table = state
                .tables
                .get(&(source.dataset.clone(), source.table.clone()))
                .ok_or_else(|| format!("Not found: Table {}", source))?;

            match combined.as_mut() {
                None => combined = Some(table.clone()),
                Some(acc) => {
                    if acc.data.column_count() != table.data.column_count() {
                        return Err(format!(
                            "Queries in UNION ALL have mismatched column count; {} has {} columns, expected {}",
                            source,
                            table.data.column_count(),
                            acc.data.column_count()
                        ));
                    }
                    if let Some(diff) = acc.schema.difference(&table.schema) {
                        return Err(format!("Column types in UNION ALL do not match for {}: {}", source, diff));
                    }
                    for row in table.data.rows() {
                        acc.data.push_row(row.clone()).map_err(|e| e.to_string())?;
                    }
                },
            }
        }

        let result = combined.ok_or_else(|| "Query has no source tables".to_string())?;
        let rows = result.data.row_count() as u64;
        state.tables.insert(dest_key, result);
        Ok(rows)
    }

    /// Accept `project.dataset.table` either as one backtick-quoted identifier
    /// or as three separate parts
    fn resolve(&self, name: &ObjectName) -> Result<TableRef, String> {
        let qualified = name
            .0
            .iter()
            .map(|ident| ident.value.as_str())
            .collect::<Vec<_>>()
            .join(".");
        let table = TableRef::parse(&qualified)
            .ok_or_else(|| format!("Table name '{}' is not fully qualified", qualified))?;
        if table.project != self.project {
            return Err(format!("Unknown project '{}'", table.project));
        }
        Ok(table)
    }
}

/// Coerce each column to its pinned type; the file must have exactly the
/// pinned columns in order
fn apply_schema(data: &mut YearRecord, schema: &TableSchema) -> Result<(), String> {
    let columns: Vec<&str> = data.columns().iter().map(String::as_str).collect();
    if columns != schema.field_names() {
        return Err(format!(
            "CSV header {:?} does not match schema {:?}",
            columns,
            schema.field_names()
        ));
    }

    for field in &schema.fields {
        let values = data
            .column_values(&field.name)
            .ok_or_else(|| format!("Missing column {}", field.name))?
            .into_iter()
            .enumerate()
            .map(|(row, value)| match field.field_type.column_type() {
                Some(target) => value.coerce(target).ok_or_else(|| {
                    format!(
                        "Could not convert value '{}' in row {} to {} for field {}",
                        value,
                        row + 1,
                        field.field_type,
                        field.name
                    )
                }),
                None => Ok(value.clone()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        data.replace_column(&field.name, values)
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Tables referenced by a `SELECT * FROM t [UNION ALL SELECT * FROM t ...]` body
fn union_sources(query: &Query) -> Result<Vec<ObjectName>, String> {
    let mut sources = Vec::new();
    collect_sources(&query.body, &mut sources)?;
    Ok(sources)
}

fn collect_sources(expr: &SetExpr, sources: &mut Vec<ObjectName>) -> Result<(), String> {
    match expr {
        SetExpr::Select(select) => {
            if !matches!(select.projection.as_slice(), [SelectItem::Wildcard(_)]) {
                return Err("Only SELECT * is supported".to_string());
            }
            match select.from.as_slice() {
                [from] if from.joins.is_empty() => match &from.relation {
                    TableFactor::Table { name, .. } => {
                        sources.push(name.clone());
                        Ok(())
                    },
                    other => Err(format!("Unsupported FROM clause: {}", other)),
                },
                _ => Err("Exactly one source table per SELECT is supported".to_string()),
            }
        },
        SetExpr::SetOperation {
            op: SetOperator::Union,
            set_quantifier: SetQuantifier::All,
            left,
            right,
        } => {
            collect_sources(left, sources)?;
            collect_sources(right, sources)
        },
        SetExpr::Query(inner) => collect_sources(&inner.body, sources),
        other => Err(format!("Unsupported query expression: {}", other)),
    }
}

#[async_trait]
impl WarehouseClient for InMemoryWarehouse {
    fn project(&self) -> &str {
        &self.project
    }

    async fn get_dataset(&self, dataset_id: &str) -> WarehouseResult<Dataset> {
        self.record(WarehouseCall::GetDataset(dataset_id.to_string()));
        let state = self.lock();
        if state.fail_dataset_lookup {
            return Err(WarehouseError::Request(format!(
                "Permission denied on dataset {}",
                dataset_id
            )));
        }
        state
            .datasets
            .get(dataset_id)
            .map(|location| Dataset {
                id: dataset_id.to_string(),
                location: Some(location.clone()),
            })
            .ok_or_else(|| WarehouseError::NotFound(format!("Dataset {}:{}", self.project, dataset_id)))
    }

    async fn create_dataset(&self, dataset_id: &str, location: &str) -> WarehouseResult<Dataset> {
        self.record(WarehouseCall::CreateDataset {
            dataset: dataset_id.to_string(),
            location: location.to_string(),
        });
        let mut state = self.lock();
        if state.report_create_conflict || state.datasets.contains_key(dataset_id) {
            state
                .datasets
                .entry(dataset_id.to_string())
                .or_insert_with(|| location.to_string());
            return Err(WarehouseError::AlreadyExists(format!(
                "Dataset {}:{}",
                self.project, dataset_id
            )));
        }
        state
            .datasets
            .insert(dataset_id.to_string(), location.to_string());
        debug!(dataset_id, location, "Created in-memory dataset");
        Ok(Dataset {
            id: dataset_id.to_string(),
            location: Some(location.to_string()),
        })
    }

    async fn get_table_schema(&self, table: &TableRef) -> WarehouseResult<TableSchema> {
        self.record(WarehouseCall::GetTableSchema(table.clone()));
        self.lock()
            .tables
            .get(&(table.dataset.clone(), table.table.clone()))
            .map(|stored| stored.schema.clone())
            .ok_or_else(|| WarehouseError::NotFound(format!("Table {}", table)))
    }

    async fn load_table_from_uri(
        &self,
        uri: &str,
        table: &TableRef,
        config: &LoadJobConfig,
    ) -> WarehouseResult<JobHandle> {
        self.record(WarehouseCall::LoadTable {
            uri: uri.to_string(),
            table: table.clone(),
        });
        let outcome = self.run_load(uri, table, config).map(Some);
        Ok(self.finish_job(JobKind::Load, outcome))
    }

    async fn query(&self, sql: &str) -> WarehouseResult<JobHandle> {
        self.record(WarehouseCall::Query(sql.to_string()));
        let outcome = self.run_query(sql).map(Some);
        Ok(self.finish_job(JobKind::Query, outcome))
    }

    async fn wait_for_job(&self, job: &JobHandle) -> WarehouseResult<JobResult> {
        self.record(WarehouseCall::WaitForJob(job.job_id.clone()));
        let outcome = self
            .lock()
            .jobs
            .get(&job.job_id)
            .cloned()
            .ok_or_else(|| WarehouseError::NotFound(format!("Job {}", job.job_id)))?;

        outcome
            .map(|output_rows| JobResult {
                job_id: job.job_id.clone(),
                output_rows,
            })
            .map_err(|message| WarehouseError::JobFailed {
                job_id: job.job_id.clone(),
                message,
            })
    }
}
