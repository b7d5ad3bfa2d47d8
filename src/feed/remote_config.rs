use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::engine::state::{ConfigPatch, WeightKey};

/// Client for the optional remote cutoffs / weights endpoint.
#[derive(Clone)]
pub struct RemoteConfigClient {
    http: Client,
    url: String,
}

impl RemoteConfigClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(RemoteConfigClient {
            http,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> Result<ConfigPatch> {
        debug!("Fetching remote config from {}", self.url);
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("remote config request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("remote config error: {}", resp.status());
        }
        let raw: Value = resp.json().await.context("Failed to parse remote config")?;
        Ok(parse_patch(&raw))
    }
}

fn finite(v: Option<&Value>) -> Option<f64> {
    v.and_then(Value::as_f64).filter(|x| x.is_finite())
}

/// Read cutoffs and weights from a payload, either flat or wrapped in
/// `cutoffs` / `weights` objects. Unknown keys and non-numeric values are
/// ignored; range checks happen when the patch is merged.
pub fn parse_patch(raw: &Value) -> ConfigPatch {
    let cutoffs = raw.get("cutoffs").filter(|v| v.is_object()).unwrap_or(raw);
    let weights = raw.get("weights").filter(|v| v.is_object()).unwrap_or(raw);

    let pick = |keys: &[&str]| keys.iter().find_map(|k| finite(cutoffs.get(*k)));

    ConfigPatch {
        min_ev: pick(&["minEV", "min_ev"]),
        thr_safe: pick(&["thrSafe", "thr_safe"]),
        thr_risky: pick(&["thrRisky", "thr_risky"]),
        weights: WeightKey::ALL
            .iter()
            .filter_map(|k| finite(weights.get(k.as_str())).map(|v| (*k, v)))
            .collect(),
    }
}
