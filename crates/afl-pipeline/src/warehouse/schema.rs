//! Table schemas
//!
//! Field types use the warehouse's REST spelling (`INTEGER`, `FLOAT`,
//! `BOOLEAN`, ...); the standard SQL names are accepted when reading. Types
//! this crate has no name for are kept verbatim in `FieldType::Other` and
//! still compare by name.

use afl_common::{AflError, ColumnType, Result, Scalar, YearRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Integer,
    Float,
    Numeric,
    BigNumeric,
    Boolean,
    String,
    Bytes,
    Date,
    Datetime,
    Time,
    Timestamp,
    Geography,
    Json,
    Record,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::Numeric => "NUMERIC",
            FieldType::BigNumeric => "BIGNUMERIC",
            FieldType::Boolean => "BOOLEAN",
            FieldType::String => "STRING",
            FieldType::Bytes => "BYTES",
            FieldType::Date => "DATE",
            FieldType::Datetime => "DATETIME",
            FieldType::Time => "TIME",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Geography => "GEOGRAPHY",
            FieldType::Json => "JSON",
            FieldType::Record => "RECORD",
            FieldType::Other(name) => name,
        }
    }

    /// Cell type used when coercing staged values into this field, if the
    /// record model has one
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            FieldType::Integer => Some(ColumnType::Int),
            FieldType::Float => Some(ColumnType::Float),
            FieldType::String => Some(ColumnType::Str),
            _ => None,
        }
    }
}

impl From<String> for FieldType {
    fn from(raw: String) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "INTEGER" | "INT64" => FieldType::Integer,
            "FLOAT" | "FLOAT64" => FieldType::Float,
            "NUMERIC" => FieldType::Numeric,
            "BIGNUMERIC" => FieldType::BigNumeric,
            "BOOLEAN" | "BOOL" => FieldType::Boolean,
            "STRING" => FieldType::String,
            "BYTES" => FieldType::Bytes,
            "DATE" => FieldType::Date,
            "DATETIME" => FieldType::Datetime,
            "TIME" => FieldType::Time,
            "TIMESTAMP" => FieldType::Timestamp,
            "GEOGRAPHY" => FieldType::Geography,
            "JSON" => FieldType::Json,
            "RECORD" | "STRUCT" => FieldType::Record,
            other => FieldType::Other(other.to_string()),
        }
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        field_type.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<Field>,
}

impl TableSchema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Infer a schema the way CSV autodetection does: integers stay integers,
    /// any float widens the column, anything else (or an all-empty column) is
    /// a string.
    pub fn infer(record: &YearRecord) -> Self {
        let fields = record
            .columns()
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let field_type = infer_column(record.rows().iter().map(|row| &row[index]));
                Field::new(name.clone(), field_type)
            })
            .collect();
        Self { fields }
    }

    /// Read a pinned schema from a JSON file.
    ///
    /// Accepts either `{"fields": [...]}` or a bare array of fields.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AflError::config(format!("Failed to read schema file {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
            .map_err(|e| AflError::config(format!("Invalid schema file {}: {}", path.display(), e)))
    }

    pub fn from_json(raw: &str) -> std::result::Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum SchemaDocument {
            Wrapped(TableSchema),
            Bare(Vec<Field>),
        }

        Ok(match serde_json::from_str::<SchemaDocument>(raw)? {
            SchemaDocument::Wrapped(schema) => schema,
            SchemaDocument::Bare(fields) => TableSchema { fields },
        })
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Describe the first difference from `other`, comparing by position
    pub fn difference(&self, other: &TableSchema) -> Option<String> {
        if self.fields.len() != other.fields.len() {
            return Some(format!(
                "expected {} columns, found {}",
                self.fields.len(),
                other.fields.len()
            ));
        }

        self.fields
            .iter()
            .zip(&other.fields)
            .enumerate()
            .find_map(|(position, (expected, found))| {
                if expected.name != found.name {
                    Some(format!(
                        "column {} is '{}', expected '{}'",
                        position + 1,
                        found.name,
                        expected.name
                    ))
                } else if expected.field_type != found.field_type {
                    Some(format!(
                        "column '{}' is {}, expected {}",
                        found.name, found.field_type, expected.field_type
                    ))
                } else {
                    None
                }
            })
    }
}

fn infer_column<'a>(values: impl Iterator<Item = &'a Scalar>) -> FieldType {
    let mut saw_int = false;
    let mut saw_float = false;
    for value in values {
        match value {
            Scalar::Null => {},
            Scalar::Int(_) => saw_int = true,
            Scalar::Float(_) => saw_float = true,
            Scalar::Str(_) => return FieldType::String,
        }
    }
    if saw_float {
        FieldType::Float
    } else if saw_int {
        FieldType::Integer
    } else {
        FieldType::String
    }
}
