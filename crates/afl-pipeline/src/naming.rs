//! Deterministic object and table names.
//!
//! These formats are shared with existing buckets and warehouse datasets and
//! must not change.

/// Ingestion dataset holding one table per season
pub const PLAYER_STATS_DATASET_ID: &str = "afl_player_data";

/// Reporting dataset holding the combined table
pub const COMBINED_STATS_DATASET_ID: &str = "afl_data";

/// Combined multi-season table
pub const COMBINED_STATS_TABLE_ID: &str = "combined_player_stats_bq";

/// Per-season table name prefix
pub const PLAYER_STATS_TABLE_PREFIX: &str = "player_stats_";

/// Per-season table name suffix
pub const PLAYER_STATS_TABLE_SUFFIX: &str = "_bq";

/// URI scheme used when handing staged objects to the warehouse
pub const STORAGE_URI_SCHEME: &str = "gs";

/// Object path of a staged season: `player_stats/player_stats_{year}`
pub fn object_path(year: i32) -> String {
    format!("player_stats/player_stats_{}", year)
}

/// Per-season table id: `player_stats_{year}_bq`
pub fn table_id(year: i32) -> String {
    table_name(PLAYER_STATS_TABLE_PREFIX, year, PLAYER_STATS_TABLE_SUFFIX)
}

/// Table id built from an arbitrary prefix and suffix
pub fn table_name(prefix: &str, year: i32, suffix: &str) -> String {
    format!("{}{}{}", prefix, year, suffix)
}

/// Canonical object-store URI: `gs://{bucket}/{path}`
pub fn storage_uri(bucket: &str, path: &str) -> String {
    format!("{}://{}/{}", STORAGE_URI_SCHEME, bucket, path)
}

/// Split a `scheme://bucket/path` URI into `(bucket, path)`
pub fn parse_storage_uri(uri: &str) -> Option<(&str, &str)> {
    let (_, rest) = uri.split_once("://")?;
    let (bucket, path) = rest.split_once('/')?;
    if bucket.is_empty() || path.is_empty() {
        return None;
    }
    Some((bucket, path))
}
