use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::normalize::normalize_batch;
use super::provider::MatchFeed;
use crate::db::models::MatchSnapshot;

/// JSON-over-HTTP live feed. The response is handed to the normalization
/// adapter as-is, so any of the supported payload shapes work.
pub struct RestFeed {
    http: Client,
    name: String,
    url: String,
}

impl RestFeed {
    pub fn new(name: &str, url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(RestFeed {
            http,
            name: name.to_string(),
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl MatchFeed for RestFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_matches(&self) -> Result<Vec<MatchSnapshot>> {
        debug!("Fetching live matches from {}", self.url);

        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("{} request failed", self.name))?;

        if !resp.status().is_success() {
            anyhow::bail!("{} error: {}", self.name, resp.status());
        }

        let raw: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.name))?;

        let matches = normalize_batch(&raw);
        debug!("{}: {} matches normalized", self.name, matches.len());
        Ok(matches)
    }
}
