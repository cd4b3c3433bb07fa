//! Warehouse manager tests against the in-memory warehouse

use afl_common::{AflError, Scalar, YearRecord};
use afl_pipeline::storage::{InMemoryObjectStore, ObjectStore};
use afl_pipeline::warehouse::{
    CombinedTableRequest, InMemoryWarehouse, TableRef, TableSchema, WarehouseCall,
    WarehouseManager,
};
use std::sync::Arc;

const PROJECT: &str = "proj";

fn setup() -> (Arc<InMemoryObjectStore>, Arc<InMemoryWarehouse>, WarehouseManager) {
    let store = Arc::new(InMemoryObjectStore::new());
    let warehouse = Arc::new(InMemoryWarehouse::new(PROJECT, store.clone()));
    let manager = WarehouseManager::new(warehouse.clone());
    (store, warehouse, manager)
}

fn season(year: i64, rows: usize) -> YearRecord {
    YearRecord::from_rows(
        vec!["ID".to_string(), "Venue".to_string(), "year".to_string()],
        (0..rows)
            .map(|i| vec![Scalar::Int(i as i64), Scalar::from("M.C.G."), Scalar::Int(year)])
            .collect(),
    )
    .unwrap()
}

fn seed_years(warehouse: &InMemoryWarehouse, years: &[i32]) {
    for &year in years {
        warehouse.insert_table(
            "afl_player_data",
            &format!("player_stats_{}_bq", year),
            season(year as i64, 3),
        );
    }
}

#[tokio::test]
async fn test_ensure_dataset_twice_creates_once() {
    let (_, warehouse, manager) = setup();

    manager.ensure_dataset_exists("afl_player_data").await.unwrap();
    manager.ensure_dataset_exists("afl_player_data").await.unwrap();

    assert_eq!(warehouse.create_dataset_calls(), 1);
    assert!(warehouse.calls().contains(&WarehouseCall::CreateDataset {
        dataset: "afl_player_data".to_string(),
        location: "US".to_string(),
    }));
}

#[tokio::test]
async fn test_ensure_dataset_uses_configured_location() {
    let store = Arc::new(InMemoryObjectStore::new());
    let warehouse = Arc::new(InMemoryWarehouse::new(PROJECT, store));
    let manager = WarehouseManager::with_location(warehouse.clone(), "australia-southeast1");

    manager.ensure_dataset_exists("afl_data").await.unwrap();

    assert!(warehouse.calls().contains(&WarehouseCall::CreateDataset {
        dataset: "afl_data".to_string(),
        location: "australia-southeast1".to_string(),
    }));
}

#[tokio::test]
async fn test_lost_creation_race_is_success() {
    let (_, warehouse, manager) = setup();
    warehouse.report_create_conflict(true);

    manager.ensure_dataset_exists("afl_data").await.unwrap();

    assert_eq!(warehouse.create_dataset_calls(), 1);
    assert!(warehouse.has_dataset("afl_data"));
}

#[tokio::test]
async fn test_dataset_lookup_error_is_not_retried() {
    let (_, warehouse, manager) = setup();
    warehouse.fail_dataset_lookup(true);

    let result = manager.ensure_dataset_exists("afl_data").await;

    assert!(matches!(result, Err(AflError::DatasetProvision { .. })));
    assert_eq!(warehouse.calls().len(), 1);
}

#[tokio::test]
async fn test_upload_from_storage_replaces_table() {
    let (store, warehouse, manager) = setup();
    let uri = "gs://afl-data/player_stats/player_stats_2019";

    store
        .put("afl-data", "player_stats/player_stats_2019", b"ID,year\n1,2019\n2,2019\n".to_vec(), "text/csv")
        .await
        .unwrap();
    manager
        .upload_from_storage(uri, "player_stats_2019_bq", "afl_player_data")
        .await
        .unwrap();

    store
        .put("afl-data", "player_stats/player_stats_2019", b"ID,year\n1,2019\n".to_vec(), "text/csv")
        .await
        .unwrap();
    manager
        .upload_from_storage(uri, "player_stats_2019_bq", "afl_player_data")
        .await
        .unwrap();

    assert_eq!(
        warehouse.table_row_count("afl_player_data", "player_stats_2019_bq"),
        Some(1)
    );
}

#[tokio::test]
async fn test_upload_with_schema_rejects_mismatched_file() {
    let (store, _, manager) = setup();
    store
        .put("b", "o", b"ID,year\nabc,2019\n".to_vec(), "text/csv")
        .await
        .unwrap();
    let schema = TableSchema::from_json(
        r#"[{"name": "ID", "type": "INTEGER"}, {"name": "year", "type": "INTEGER"}]"#,
    )
    .unwrap();

    let result = manager
        .upload_from_storage_with_schema("gs://b/o", "t", "ds", &schema)
        .await;

    match result {
        Err(AflError::LoadJob { table, message }) => {
            assert_eq!(table, "proj.ds.t");
            assert!(message.contains("abc"));
        },
        other => panic!("expected load job error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_combined_table_rejects_empty_years() {
    let (_, warehouse, manager) = setup();

    let result = manager
        .create_combined_table(&[], &CombinedTableRequest::default())
        .await;

    assert!(matches!(result, Err(AflError::Precondition(_))));
    assert!(warehouse.calls().is_empty());
}

#[tokio::test]
async fn test_combined_table_single_year_has_no_union() {
    let (_, warehouse, manager) = setup();
    seed_years(&warehouse, &[2019]);

    let table = manager
        .create_combined_table(&[2019], &CombinedTableRequest::default())
        .await
        .unwrap();

    assert_eq!(table, "proj.afl_data.combined_player_stats_bq");
    let queries = warehouse.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].starts_with("CREATE OR REPLACE TABLE `proj.afl_data.combined_player_stats_bq`"));
    assert!(!queries[0].contains("UNION ALL"));
    assert_eq!(
        warehouse.table_row_count("afl_data", "combined_player_stats_bq"),
        Some(3)
    );
}

#[tokio::test]
async fn test_combined_table_references_each_year_once_in_order() {
    let (_, warehouse, manager) = setup();
    let years = [2021, 2019, 2020];
    seed_years(&warehouse, &years);

    manager
        .create_combined_table(&years, &CombinedTableRequest::default())
        .await
        .unwrap();

    let queries = warehouse.queries();
    assert_eq!(queries.len(), 1);
    let sql = &queries[0];
    assert_eq!(sql.matches("CREATE OR REPLACE").count(), 1);
    assert_eq!(sql.matches("UNION ALL").count(), years.len() - 1);

    let mut last = 0;
    for year in years {
        let name = format!("`proj.afl_player_data.player_stats_{}_bq`", year);
        assert_eq!(sql.matches(&name).count(), 1, "{} referenced once", name);
        let position = sql.find(&name).unwrap();
        assert!(position > last);
        last = position;
    }

    assert_eq!(
        warehouse.table_row_count("afl_data", "combined_player_stats_bq"),
        Some(9)
    );
}

#[tokio::test]
async fn test_combined_table_rerun_replaces_destination() {
    let (_, warehouse, manager) = setup();
    seed_years(&warehouse, &[2019, 2020]);
    let request = CombinedTableRequest::default();

    manager.create_combined_table(&[2019, 2020], &request).await.unwrap();
    manager.create_combined_table(&[2019], &request).await.unwrap();

    assert_eq!(
        warehouse.table_row_count("afl_data", "combined_player_stats_bq"),
        Some(3)
    );
}

#[tokio::test]
async fn test_combined_table_custom_names() {
    let (_, warehouse, manager) = setup();
    warehouse.insert_table("staging", "season_2019", season(2019, 2));
    let request = CombinedTableRequest {
        source_dataset: "staging".to_string(),
        dest_dataset: "reporting".to_string(),
        table_prefix: "season_".to_string(),
        table_suffix: String::new(),
        dest_table: "all_seasons".to_string(),
    };

    let table = manager.create_combined_table(&[2019], &request).await.unwrap();

    assert_eq!(table, "proj.reporting.all_seasons");
    assert_eq!(warehouse.table_row_count("reporting", "all_seasons"), Some(2));
}

#[tokio::test]
async fn test_missing_source_table_fails_before_query() {
    let (_, warehouse, manager) = setup();
    seed_years(&warehouse, &[2019]);

    let result = manager
        .create_combined_table(&[2019, 2020], &CombinedTableRequest::default())
        .await;

    assert!(matches!(result, Err(AflError::QueryJob(_))));
    assert!(warehouse.queries().is_empty());
}

#[tokio::test]
async fn test_verify_schema_compatibility() {
    let (_, warehouse, manager) = setup();
    seed_years(&warehouse, &[2019, 2020]);
    let narrower = YearRecord::from_rows(
        vec!["ID".to_string(), "Venue".to_string(), "year".to_string()],
        vec![vec![Scalar::from("x1"), Scalar::from("M.C.G."), Scalar::Int(2021)]],
    )
    .unwrap();
    warehouse.insert_table("afl_player_data", "player_stats_2021_bq", narrower);

    let table = |year: i32| TableRef::new(PROJECT, "afl_player_data", format!("player_stats_{}_bq", year));

    manager
        .verify_schema_compatibility(&[table(2019), table(2020)])
        .await
        .unwrap();

    let result = manager
        .verify_schema_compatibility(&[table(2019), table(2020), table(2021)])
        .await;
    match result {
        Err(AflError::SchemaMismatch { table, message }) => {
            assert_eq!(table, "proj.afl_player_data.player_stats_2021_bq");
            assert!(message.contains("column 'ID' is STRING, expected INTEGER"));
        },
        other => panic!("expected schema mismatch, got {:?}", other),
    }
}
