//! Player stats preprocessing
//!
//! Turns a fetched season into a load-ready one:
//! 1. Inject a constant `year` column
//! 2. Coerce a fixed set of columns to their warehouse types
//! 3. Drop the raw `Date` column
//!
//! Coercion is best effort. A column that cannot be converted is left as it
//! was and a warning is logged; the transform itself never fails.

use afl_common::{ColumnType, Result, Scalar, YearRecord};
use tracing::{error, info, warn};

/// Column injected on every row with the requested season
pub const YEAR_COLUMN: &str = "year";

/// Raw timestamp column removed before staging
pub const DROPPED_COLUMN: &str = "Date";

/// Column coercions applied to every season
pub const TYPE_CONVERSIONS: &[(&str, ColumnType)] = &[
    ("Season", ColumnType::Float),
    ("Round", ColumnType::Str),
    ("Local.start.time", ColumnType::Int),
    ("Attendance", ColumnType::Float),
    ("ID", ColumnType::Int),
    ("Jumper.No.", ColumnType::Str),
];

/// Result of coercing a single column
#[derive(Debug, Clone, PartialEq)]
pub enum CoercionOutcome {
    /// Column not present in the record
    Absent,
    /// Every cell converted
    Converted,
    /// At least one cell could not be converted; the column is unchanged
    Failed { row: usize, value: Scalar },
}

/// Preprocess a season for storage.
///
/// Falls back to the untouched input if the record is structurally invalid,
/// so the caller always gets usable rows back.
pub fn preprocess_player_stats(record: YearRecord, year: i32) -> YearRecord {
    info!(year, "Preprocessing player stats");

    match try_preprocess(&record, year) {
        Ok(processed) => {
            info!(
                year,
                rows = processed.row_count(),
                columns = processed.column_count(),
                "Preprocessed player stats"
            );
            processed
        },
        Err(e) => {
            error!(year, error = %e, "Error preprocessing data, returning it unprocessed");
            record
        },
    }
}

/// Fallible core of [`preprocess_player_stats`]
pub fn try_preprocess(record: &YearRecord, year: i32) -> Result<YearRecord> {
    record.validate()?;

    let mut processed = record.clone();
    processed.set_column(YEAR_COLUMN, Scalar::Int(i64::from(year)));

    for (column, target) in TYPE_CONVERSIONS {
        if let CoercionOutcome::Failed { row, value } =
            coerce_column(&mut processed, column, *target)?
        {
            warn!(
                column = *column,
                target = %target,
                row,
                value = %value,
                "Could not convert column"
            );
        }
    }

    if processed.drop_column(DROPPED_COLUMN) {
        info!("Dropped '{}' column", DROPPED_COLUMN);
    }

    Ok(processed)
}

/// Convert every cell of `column` to `target`, or leave the column untouched
pub fn coerce_column(
    record: &mut YearRecord,
    column: &str,
    target: ColumnType,
) -> Result<CoercionOutcome> {
    let Some(cells) = record.column_values(column) else {
        return Ok(CoercionOutcome::Absent);
    };

    let mut converted = Vec::with_capacity(cells.len());
    for (row, cell) in cells.into_iter().enumerate() {
        match cell.coerce(target) {
            Some(value) => converted.push(value),
            None => {
                return Ok(CoercionOutcome::Failed {
                    row,
                    value: cell.clone(),
                })
            },
        }
    }

    record.replace_column(column, converted)?;
    Ok(CoercionOutcome::Converted)
}
