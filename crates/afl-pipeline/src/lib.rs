//! AFL player statistics pipeline
//!
//! Moves per-season player statistics from a source feed into object storage,
//! loads each season into its own warehouse table and rebuilds a combined
//! multi-season table from the seasons that loaded.
//!
//! - [`coordinator`]: per-year state machine and batch driver
//! - [`warehouse`]: dataset provisioning, bulk loads, combined-table query
//! - [`processor`]: column coercions and pruning
//! - [`storage`], [`fetch`]: object store and source feed collaborators

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod backend;
pub mod cli;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod fetch;
pub mod naming;
pub mod processor;
pub mod storage;
pub mod warehouse;

pub use cli::{Backend, Cli, Commands};
pub use config::PipelineConfig;
pub use coordinator::{
    AflPipeline, BatchReport, CombinedOutcome, FailureDetail, PipelineSettings, ProcessingOutcome,
    YearReport,
};
