//! AFL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the AFL statistics pipeline.
//!
//! # Overview
//!
//! This crate provides common functionality used across all workspace members:
//!
//! - **Error Handling**: The tagged [`AflError`] type with its [`ErrorKind`]
//! - **Records**: [`YearRecord`], the per-season table that moves through the pipeline
//! - **Checksums**: Payload fingerprints for staged objects
//! - **Logging**: Centralised `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use afl_common::{Result, Scalar, YearRecord};
//!
//! fn build() -> Result<YearRecord> {
//!     let mut record = YearRecord::new(vec!["Season".to_string(), "Kicks".to_string()]);
//!     record.push_row(vec![Scalar::Int(2024), Scalar::Int(15)])?;
//!     Ok(record)
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{AflError, ErrorKind, Result};
pub use types::{ColumnType, Scalar, YearRecord};
