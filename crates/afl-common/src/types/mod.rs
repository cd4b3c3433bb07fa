//! Common types used across the pipeline

use crate::error::{AflError, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Scalars
// ============================================================================

/// A single cell of a [`YearRecord`].
///
/// Cells are loosely typed: values arrive from the source feed as text and the
/// data processor narrows a known subset of columns to a target type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

impl Scalar {
    /// Infer the narrowest scalar for a raw text cell.
    ///
    /// Empty text is `Null`. Integers win over floats, floats over strings.
    /// Words such as `nan` or `inf` stay strings.
    pub fn infer(raw: &str) -> Scalar {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Scalar::Null;
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return Scalar::Int(value);
        }
        if looks_numeric(trimmed) {
            if let Ok(value) = trimmed.parse::<f64>() {
                return Scalar::Float(value);
            }
        }
        Scalar::Str(raw.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Convert this cell to `target`, or `None` when the conversion is not possible.
    ///
    /// Floats truncate toward zero when narrowed to integers. A null cell cannot
    /// become an integer; it stays null for float and string targets.
    pub fn coerce(&self, target: ColumnType) -> Option<Scalar> {
        match (target, self) {
            (ColumnType::Int, Scalar::Int(v)) => Some(Scalar::Int(*v)),
            (ColumnType::Int, Scalar::Float(v)) => {
                if v.is_finite() && v.abs() < i64::MAX as f64 {
                    Some(Scalar::Int(v.trunc() as i64))
                } else {
                    None
                }
            },
            (ColumnType::Int, Scalar::Str(s)) => s.trim().parse::<i64>().ok().map(Scalar::Int),
            (ColumnType::Int, Scalar::Null) => None,

            (ColumnType::Float, Scalar::Int(v)) => Some(Scalar::Float(*v as f64)),
            (ColumnType::Float, Scalar::Float(v)) => Some(Scalar::Float(*v)),
            (ColumnType::Float, Scalar::Str(s)) => {
                let trimmed = s.trim();
                if looks_numeric(trimmed) {
                    trimmed.parse::<f64>().ok().map(Scalar::Float)
                } else {
                    None
                }
            },
            (ColumnType::Float, Scalar::Null) => Some(Scalar::Null),

            (ColumnType::Str, Scalar::Null) => Some(Scalar::Null),
            (ColumnType::Str, other) => Some(Scalar::Str(other.to_string())),
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            // Integral floats keep a trailing ".0" so they read back as floats
            Scalar::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Str(s) => f.write_str(s),
            Scalar::Null => Ok(()),
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Str(value)
    }
}

fn looks_numeric(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
        && s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

/// Target type of a column coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Float,
    Str,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Str => "str",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Year records
// ============================================================================

/// One season of player statistics.
///
/// Rows are stored positionally against `columns`; every row carries exactly
/// one cell per column. Mutating helpers keep that invariant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct YearRecord {
    columns: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

impl YearRecord {
    /// Create an empty record with the given header
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a record from a header and rows, rejecting ragged rows
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Result<Self> {
        let record = Self { columns, rows };
        record.validate()?;
        Ok(record)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Scalar>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Append a row
    pub fn push_row(&mut self, row: Vec<Scalar>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(AflError::parse(format!(
                "row has {} cells but the record has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Cells of one column, top to bottom
    pub fn column_values(&self, name: &str) -> Option<Vec<&Scalar>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Set `name` to the same value on every row, appending the column if absent
    pub fn set_column(&mut self, name: &str, value: Scalar) {
        match self.column_index(name) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = value.clone();
                }
            },
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(value.clone());
                }
            },
        }
    }

    /// Replace every cell of an existing column
    pub fn replace_column(&mut self, name: &str, values: Vec<Scalar>) -> Result<()> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| AflError::parse(format!("unknown column '{}'", name)))?;

        if values.len() != self.rows.len() {
            return Err(AflError::parse(format!(
                "column '{}' replacement has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }

        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
        Ok(())
    }

    /// Remove a column. Returns whether it was present.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        true
    }

    /// Check the rectangular shape and header uniqueness
    pub fn validate(&self) -> Result<()> {
        for (i, name) in self.columns.iter().enumerate() {
            if self.columns[..i].contains(name) {
                return Err(AflError::parse(format!("duplicate column '{}'", name)));
            }
        }

        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(AflError::parse(format!(
                    "row {} has {} cells but the record has {} columns",
                    i,
                    row.len(),
                    self.columns.len()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record() -> YearRecord {
        YearRecord::from_rows(
            vec!["Season".into(), "Venue".into()],
            vec![
                vec![Scalar::Int(2023), Scalar::from("M.C.G.")],
                vec![Scalar::Int(2023), Scalar::from("Gabba")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_infer() {
        assert_eq!(Scalar::infer("42"), Scalar::Int(42));
        assert_eq!(Scalar::infer("88084.5"), Scalar::Float(88084.5));
        assert_eq!(Scalar::infer(""), Scalar::Null);
        assert_eq!(Scalar::infer("Round 1"), Scalar::from("Round 1"));
        assert_eq!(Scalar::infer("nan"), Scalar::from("nan"));
        assert_eq!(Scalar::infer("Infinity"), Scalar::from("Infinity"));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            Scalar::Int(2023).coerce(ColumnType::Float),
            Some(Scalar::Float(2023.0))
        );
        assert_eq!(
            Scalar::Float(1920.7).coerce(ColumnType::Int),
            Some(Scalar::Int(1920))
        );
        assert_eq!(
            Scalar::Int(7).coerce(ColumnType::Str),
            Some(Scalar::from("7"))
        );
        assert_eq!(Scalar::from("abc").coerce(ColumnType::Int), None);
        assert_eq!(Scalar::Null.coerce(ColumnType::Int), None);
        assert_eq!(Scalar::Null.coerce(ColumnType::Float), Some(Scalar::Null));
    }

    #[test]
    fn test_display_floats_keep_decimal() {
        assert_eq!(Scalar::Float(2023.0).to_string(), "2023.0");
        assert_eq!(Scalar::Float(0.25).to_string(), "0.25");
        assert_eq!(Scalar::Null.to_string(), "");
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = YearRecord::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![Scalar::Int(1)]],
        );
        assert!(result.is_err());

        let mut rec = record();
        assert!(rec.push_row(vec![Scalar::Null]).is_err());
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let result = YearRecord::from_rows(vec!["a".into(), "a".into()], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_set_column_appends_and_overwrites() {
        let mut rec = record();
        rec.set_column("year", Scalar::Int(2023));
        assert_eq!(rec.columns().last().unwrap(), "year");
        assert!(rec.rows().iter().all(|r| r[2] == Scalar::Int(2023)));

        rec.set_column("year", Scalar::Int(2024));
        assert_eq!(rec.column_count(), 3);
        assert!(rec.rows().iter().all(|r| r[2] == Scalar::Int(2024)));
    }

    #[test]
    fn test_drop_column() {
        let mut rec = record();
        assert!(rec.drop_column("Season"));
        assert!(!rec.drop_column("Season"));
        assert_eq!(rec.columns(), &["Venue".to_string()]);
        assert!(rec.rows().iter().all(|r| r.len() == 1));
    }

    #[test]
    fn test_replace_column_length_checked() {
        let mut rec = record();
        assert!(rec.replace_column("Venue", vec![Scalar::Null]).is_err());
        assert!(rec.replace_column("Missing", vec![]).is_err());
        rec.replace_column("Venue", vec![Scalar::Null, Scalar::Null])
            .unwrap();
        assert!(rec.column_values("Venue").unwrap().iter().all(|v| v.is_null()));
    }

    proptest! {
        #[test]
        fn prop_integers_infer_as_int(value in any::<i64>()) {
            prop_assert_eq!(Scalar::infer(&value.to_string()), Scalar::Int(value));
        }

        #[test]
        fn prop_set_column_keeps_rows_rectangular(rows in 0usize..20, value in any::<i64>()) {
            let mut rec = YearRecord::new(vec!["a".into()]);
            for i in 0..rows {
                rec.push_row(vec![Scalar::Int(i as i64)]).unwrap();
            }
            rec.set_column("year", Scalar::Int(value));
            prop_assert!(rec.validate().is_ok());
            prop_assert_eq!(rec.row_count(), rows);
        }
    }
}
