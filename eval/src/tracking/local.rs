// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Offline tracking: one pretty-printed JSON record per run
//! (`<dir>/<key>.json`)

use super::{ExperimentInfo, ExperimentKey, ExperimentRecord, Result, TrackingClient, TrackingError};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LocalTracker {
    dir: PathBuf,
    project: Option<String>,
}

impl LocalTracker {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, project: None })
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys must name a file directly inside the runs directory
    fn record_path(&self, key: &ExperimentKey) -> Result<PathBuf> {
        let k = key.as_str();
        if k.is_empty() || k.starts_with('.') || k.contains(['/', '\\']) {
            return Err(TrackingError::InvalidKey(key.clone()));
        }
        Ok(self.dir.join(format!("{}.json", k)))
    }

    /// Open a new active run and return its key
    pub fn create_run(&self) -> Result<ExperimentKey> {
        let stamp = Utc::now().format("%Y%m%d%H%M%S%f").to_string();
        let mut key = ExperimentKey::new(format!("local-{}", stamp));
        let mut n = 1;
        while self.record_path(&key)?.exists() {
            n += 1;
            key = ExperimentKey::new(format!("local-{}-{}", stamp, n));
        }

        self.save(&ExperimentRecord::new(key.clone(), self.project.clone()))?;
        tracing::debug!("Created local run {}", key);
        Ok(key)
    }

    pub fn load(&self, key: &ExperimentKey) -> Result<ExperimentRecord> {
        let path = self.record_path(key)?;
        if !path.exists() {
            return Err(TrackingError::ExperimentNotFound(key.clone()));
        }
        let json = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn save(&self, record: &ExperimentRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(self.record_path(&record.key)?, json)?;
        Ok(())
    }

    fn update<F>(&self, key: &ExperimentKey, f: F) -> Result<()>
    where
        F: FnOnce(&mut ExperimentRecord) -> Result<()>,
    {
        let mut record = self.load(key)?;
        f(&mut record)?;
        self.save(&record)
    }

    /// All stored runs, sorted by key
    pub fn list_runs(&self) -> Result<Vec<ExperimentRecord>> {
        let mut runs = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                let json = std::fs::read_to_string(&path)?;
                runs.push(serde_json::from_str::<ExperimentRecord>(&json)?);
            }
        }
        runs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(runs)
    }
}

impl TrackingClient for LocalTracker {
    fn experiment(&self, key: &ExperimentKey) -> Result<ExperimentInfo> {
        self.load(key)?.info()
    }

    fn set_name(&mut self, key: &ExperimentKey, name: &str) -> Result<()> {
        self.update(key, |r| r.set_name(name))
    }

    fn log_parameters(&mut self, key: &ExperimentKey, params: &BTreeMap<String, Value>) -> Result<()> {
        self.update(key, |r| r.log_parameters(params))
    }

    fn log_metric(&mut self, key: &ExperimentKey, name: &str, value: f64) -> Result<()> {
        self.update(key, |r| r.log_metric(name, value))
    }

    fn end(&mut self, key: &ExperimentKey) -> Result<()> {
        self.update(key, |r| r.end())
    }
}
