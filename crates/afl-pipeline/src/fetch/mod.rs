//! Source feed adapters
//!
//! The coordinator only needs "give me a season as a table". Two adapters are
//! provided: an HTTP CSV feed for real runs and a synthetic generator for
//! sample runs and local testing.

use afl_common::{Result, YearRecord};
use async_trait::async_trait;

pub mod http;
pub mod sample;

pub use http::HttpStatsFetcher;
pub use sample::{create_sample_data, SampleStatsFetcher};

/// Source identifier passed to adapters for real runs
pub const DEFAULT_SOURCE: &str = "afltables";

/// Fetches one season of player statistics
#[async_trait]
pub trait StatsFetcher: Send + Sync {
    /// Short adapter name for logs
    fn name(&self) -> &str;

    /// Fetch the season `year` from `source`. May fail when the source is unavailable.
    async fn fetch_stats(&self, year: i32, source: &str) -> Result<YearRecord>;
}
