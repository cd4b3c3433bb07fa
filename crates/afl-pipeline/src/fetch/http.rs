//! HTTP CSV source feed

use afl_common::{AflError, Result, YearRecord};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::StatsFetcher;
use crate::codec::decode_csv;

/// Fetches `{year}`-templated CSV documents over HTTP.
///
/// The template may also contain `{source}`, e.g.
/// `https://stats.example.com/{source}/player_stats_{year}.csv`.
pub struct HttpStatsFetcher {
    client: Client,
    url_template: String,
}

impl HttpStatsFetcher {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url_template = url_template.into();
        if !url_template.contains("{year}") {
            return Err(AflError::config(format!(
                "Stats source URL '{}' must contain a {{year}} placeholder",
                url_template
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AflError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url_template,
        })
    }

    pub fn url_for(&self, year: i32, source: &str) -> String {
        self.url_template
            .replace("{year}", &year.to_string())
            .replace("{source}", source)
    }
}

#[async_trait]
impl StatsFetcher for HttpStatsFetcher {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self))]
    async fn fetch_stats(&self, year: i32, source: &str) -> Result<YearRecord> {
        let url = self.url_for(year, source);
        info!(%url, "Fetching real data for year {}", year);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AflError::fetch(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AflError::fetch(format!(
                "Source returned {} for {}",
                status, url
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AflError::fetch(format!("Failed to read body from {}: {}", url, e)))?;

        debug!(bytes = body.len(), "Downloaded season payload");

        let record = decode_csv(&body)
            .map_err(|e| AflError::fetch(format!("Malformed payload from {}: {}", url, e)))?;

        info!(year, rows = record.row_count(), "Fetched player stats");
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_url_template() {
        let fetcher = HttpStatsFetcher::new(
            "https://stats.example.com/{source}/player_stats_{year}.csv",
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(
            fetcher.url_for(2021, "afltables"),
            "https://stats.example.com/afltables/player_stats_2021.csv"
        );
    }

    #[test]
    fn test_template_without_year_rejected() {
        let result = HttpStatsFetcher::new("https://stats.example.com/all.csv", Duration::from_secs(5));
        assert!(matches!(result, Err(AflError::Config(_))));
    }
}
