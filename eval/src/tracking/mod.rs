// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Experiment tracking
//!
//! Every operation names the run it writes to through an explicit
//! [`ExperimentKey`]; there is no ambient "current experiment".
//!
//! Backends:
//! - [`InMemoryTracker`]: runs held in process memory
//! - [`local::LocalTracker`]: one JSON record per run on disk
//! - [`comet::CometTracker`]: Comet REST API

pub mod comet;
pub mod local;

pub use comet::{CometConfig, CometTracker};
pub use local::LocalTracker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identifier of a run record on the tracking service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentKey(String);

impl ExperimentKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExperimentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExperimentKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Errors from experiment tracking operations
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(ExperimentKey),

    #[error("Experiment is not active: {0}")]
    ExperimentNotActive(ExperimentKey),

    #[error("Invalid experiment key: {0:?}")]
    InvalidKey(ExperimentKey),

    #[error("Tracking request to {endpoint} failed with status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrackingError>;

/// Status of a run record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Active,
    Ended,
}

/// What a lookup returns about an active run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentInfo {
    pub key: ExperimentKey,
    pub name: Option<String>,
    pub project: Option<String>,
}

/// Client for a run-tracking service
pub trait TrackingClient {
    /// Look up a run; fails if it does not exist or the backend no longer accepts writes to it
    fn experiment(&self, key: &ExperimentKey) -> Result<ExperimentInfo>;

    /// Set the human-readable display name
    fn set_name(&mut self, key: &ExperimentKey, name: &str) -> Result<()>;

    /// Attach hyperparameters
    fn log_parameters(&mut self, key: &ExperimentKey, params: &BTreeMap<String, Value>) -> Result<()>;

    /// Attach a named scalar
    fn log_metric(&mut self, key: &ExperimentKey, name: &str, value: f64) -> Result<()>;

    /// Mark the run as finished
    fn end(&mut self, key: &ExperimentKey) -> Result<()>;
}

/// A run and everything logged to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub key: ExperimentKey,
    pub name: Option<String>,
    pub project: Option<String>,
    pub status: RunStatus,
    pub params: BTreeMap<String, Value>,
    /// Metric name -> values in logging order
    pub metrics: BTreeMap<String, Vec<f64>>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ExperimentRecord {
    pub fn new(key: ExperimentKey, project: Option<String>) -> Self {
        Self {
            key,
            name: None,
            project,
            status: RunStatus::Active,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.status != RunStatus::Active {
            return Err(TrackingError::ExperimentNotActive(self.key.clone()));
        }
        Ok(())
    }

    fn info(&self) -> Result<ExperimentInfo> {
        self.ensure_active()?;
        Ok(ExperimentInfo {
            key: self.key.clone(),
            name: self.name.clone(),
            project: self.project.clone(),
        })
    }

    fn set_name(&mut self, name: &str) -> Result<()> {
        self.ensure_active()?;
        self.name = Some(name.to_string());
        Ok(())
    }

    fn log_parameters(&mut self, params: &BTreeMap<String, Value>) -> Result<()> {
        self.ensure_active()?;
        for (k, v) in params {
            self.params.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    fn log_metric(&mut self, name: &str, value: f64) -> Result<()> {
        self.ensure_active()?;
        self.metrics.entry(name.to_string()).or_default().push(value);
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.status = RunStatus::Ended;
        self.ended_at = Some(Utc::now());
        Ok(())
    }
}

/// Runs held in process memory
#[derive(Debug, Default)]
pub struct InMemoryTracker {
    project: Option<String>,
    runs: HashMap<ExperimentKey, ExperimentRecord>,
    next_run_id: u64,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            ..Self::default()
        }
    }

    /// Open a new active run and return its key
    pub fn create_run(&mut self) -> ExperimentKey {
        self.next_run_id += 1;
        let key = ExperimentKey::new(format!("run-{}", self.next_run_id));
        self.runs
            .insert(key.clone(), ExperimentRecord::new(key.clone(), self.project.clone()));
        key
    }

    pub fn get(&self, key: &ExperimentKey) -> Option<&ExperimentRecord> {
        self.runs.get(key)
    }

    fn record_mut(&mut self, key: &ExperimentKey) -> Result<&mut ExperimentRecord> {
        self.runs
            .get_mut(key)
            .ok_or_else(|| TrackingError::ExperimentNotFound(key.clone()))
    }
}

impl TrackingClient for InMemoryTracker {
    fn experiment(&self, key: &ExperimentKey) -> Result<ExperimentInfo> {
        self.runs
            .get(key)
            .ok_or_else(|| TrackingError::ExperimentNotFound(key.clone()))?
            .info()
    }

    fn set_name(&mut self, key: &ExperimentKey, name: &str) -> Result<()> {
        self.record_mut(key)?.set_name(name)
    }

    fn log_parameters(&mut self, key: &ExperimentKey, params: &BTreeMap<String, Value>) -> Result<()> {
        self.record_mut(key)?.log_parameters(params)
    }

    fn log_metric(&mut self, key: &ExperimentKey, name: &str, value: f64) -> Result<()> {
        self.record_mut(key)?.log_metric(name, value)
    }

    fn end(&mut self, key: &ExperimentKey) -> Result<()> {
        self.record_mut(key)?.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_and_lookup() {
        let mut tracker = InMemoryTracker::with_project("dnabert");
        let key = tracker.create_run();

        let info = tracker.experiment(&key).unwrap();
        assert_eq!(info.key, key);
        assert_eq!(info.project.as_deref(), Some("dnabert"));
        assert!(info.name.is_none());
    }

    #[test]
    fn test_unknown_key() {
        let tracker = InMemoryTracker::new();
        let err = tracker.experiment(&ExperimentKey::from("missing")).unwrap_err();
        assert!(matches!(err, TrackingError::ExperimentNotFound(_)));
    }

    #[test]
    fn test_log_and_end() {
        let mut tracker = InMemoryTracker::new();
        let key = tracker.create_run();

        let mut params = BTreeMap::new();
        params.insert("lr".to_string(), json!(0.001));
        tracker.set_name(&key, "demo").unwrap();
        tracker.log_parameters(&key, &params).unwrap();
        tracker.log_metric(&key, "loss", 0.5).unwrap();
        tracker.log_metric(&key, "loss", 0.3).unwrap();
        tracker.end(&key).unwrap();

        let record = tracker.get(&key).unwrap();
        assert_eq!(record.name.as_deref(), Some("demo"));
        assert_eq!(record.params["lr"], json!(0.001));
        assert_eq!(record.metrics["loss"], vec![0.5, 0.3]);
        assert_eq!(record.status, RunStatus::Ended);
        assert!(record.ended_at.is_some());
    }

    #[test]
    fn test_ended_run_rejects_writes() {
        let mut tracker = InMemoryTracker::new();
        let key = tracker.create_run();
        tracker.end(&key).unwrap();

        assert!(matches!(tracker.experiment(&key), Err(TrackingError::ExperimentNotActive(_))));
        assert!(matches!(tracker.log_metric(&key, "x", 1.0), Err(TrackingError::ExperimentNotActive(_))));
        assert!(matches!(tracker.end(&key), Err(TrackingError::ExperimentNotActive(_))));
    }

    #[test]
    fn test_run_keys_unique() {
        let mut tracker = InMemoryTracker::new();
        let a = tracker.create_run();
        let b = tracker.create_run();
        assert_ne!(a, b);
    }
}
