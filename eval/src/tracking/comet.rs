// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Comet REST API backend
//!
//! Writes go to `/write/experiment/*`, lookups to `/experiment/metadata`.
//! The API key travels in the `Authorization` header.

use super::{ExperimentInfo, ExperimentKey, Result, TrackingClient, TrackingError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.comet.com/api/rest/v2";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CometConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for CometConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExperimentMetadata {
    experiment_key: Option<String>,
    experiment_name: Option<String>,
    project_name: Option<String>,
    #[serde(default = "default_running")]
    running: bool,
}

fn default_running() -> bool {
    true
}

pub struct CometTracker {
    config: CometConfig,
    client: reqwest::blocking::Client,
}

impl CometTracker {
    pub fn new(config: CometConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn check(&self, endpoint: &str, response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(TrackingError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    fn post(&self, path: &str, body: &Value) -> Result<()> {
        let url = self.url(path);
        tracing::debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.config.api_key)
            .json(body)
            .send()?;
        self.check(&url, response)?;
        Ok(())
    }
}

/// Parameter values go over the wire as strings
fn parameter_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl TrackingClient for CometTracker {
    fn experiment(&self, key: &ExperimentKey) -> Result<ExperimentInfo> {
        let url = self.url("experiment/metadata");
        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.config.api_key)
            .query(&[("experimentKey", key.as_str())])
            .send()?;

        match response.status().as_u16() {
            400 | 404 => return Err(TrackingError::ExperimentNotFound(key.clone())),
            _ => {}
        }

        let metadata: ExperimentMetadata = self.check(&url, response)?.json()?;
        if metadata.experiment_key.as_deref().is_some_and(|k| k != key.as_str()) {
            return Err(TrackingError::ExperimentNotFound(key.clone()));
        }
        // Finished experiments still accept writes
        tracing::debug!("Comet experiment {} running={}", key, metadata.running);

        Ok(ExperimentInfo {
            key: key.clone(),
            name: metadata.experiment_name,
            project: metadata.project_name,
        })
    }

    fn set_name(&mut self, key: &ExperimentKey, name: &str) -> Result<()> {
        self.post(
            "write/experiment/log-other",
            &json!({ "experimentKey": key.as_str(), "key": "Name", "value": name }),
        )
    }

    fn log_parameters(&mut self, key: &ExperimentKey, params: &BTreeMap<String, Value>) -> Result<()> {
        for (name, value) in params {
            self.post(
                "write/experiment/parameter",
                &json!({
                    "experimentKey": key.as_str(),
                    "parameterName": name,
                    "parameterValue": parameter_value(value),
                    "timestamp": now_millis(),
                }),
            )?;
        }
        Ok(())
    }

    fn log_metric(&mut self, key: &ExperimentKey, name: &str, value: f64) -> Result<()> {
        self.post(
            "write/experiment/metric",
            &json!({
                "experimentKey": key.as_str(),
                "metricName": name,
                "metricValue": value,
                "timestamp": now_millis(),
            }),
        )
    }

    fn end(&mut self, key: &ExperimentKey) -> Result<()> {
        self.post(
            "write/experiment/set-start-end-time",
            &json!({ "experimentKey": key.as_str(), "endTimeMillis": now_millis() }),
        )
    }
}
