// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Fine-tuning run configuration as logged to the tracking service

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Keys every run configuration must carry, in display-name order
pub const REQUIRED_KEYS: [&str; 8] = [
    "dataset_name",
    "kmer_len",
    "stride",
    "freeze",
    "learning_rate",
    "weight_decay",
    "batch_size",
    "random_weights",
];

#[derive(Debug, thiserror::Error)]
pub enum RunConfigError {
    #[error("Run configuration is missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("Run configuration must be a JSON object")]
    NotAnObject,

    #[error("Failed to read run configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse run configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Hyperparameters of a fine-tuning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub dataset_name: String,
    pub kmer_len: u32,
    pub stride: u32,
    pub freeze: bool,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub batch_size: u32,
    pub random_weights: bool,
    /// Any other keys the training script recorded
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RunConfig {
    /// Build from a JSON object, checking required keys first
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, RunConfigError> {
        for key in REQUIRED_KEYS {
            if !map.contains_key(key) {
                return Err(RunConfigError::MissingKey(key));
            }
        }

        let config: Self = serde_json::from_value(Value::Object(map.clone()))?;
        Ok(config)
    }

    pub fn from_value(value: &Value) -> Result<Self, RunConfigError> {
        match value {
            Value::Object(map) => Self::from_map(map),
            _ => Err(RunConfigError::NotAnObject),
        }
    }

    pub fn load(path: &Path) -> Result<Self, RunConfigError> {
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        Self::from_value(&value)
    }

    /// Display name for the tracking run:
    /// `dataset:kmer:stride:freeze=..:LR=..:WD=..:BS=..:rand_weights=..:`
    pub fn run_name(&self) -> String {
        format!(
            "{}:{}:{}:freeze={}:LR={}:WD={}:BS={}:rand_weights={}:",
            self.dataset_name,
            self.kmer_len,
            self.stride,
            self.freeze,
            self.learning_rate,
            self.weight_decay,
            self.batch_size,
            self.random_weights
        )
    }

    /// Every key, required and extra, as logged parameters
    pub fn parameters(&self) -> BTreeMap<String, Value> {
        let mut params = self.extra.clone();
        params.insert("dataset_name".to_string(), Value::from(self.dataset_name.clone()));
        params.insert("kmer_len".to_string(), Value::from(self.kmer_len));
        params.insert("stride".to_string(), Value::from(self.stride));
        params.insert("freeze".to_string(), Value::from(self.freeze));
        params.insert("learning_rate".to_string(), Value::from(self.learning_rate));
        params.insert("weight_decay".to_string(), Value::from(self.weight_decay));
        params.insert("batch_size".to_string(), Value::from(self.batch_size));
        params.insert("random_weights".to_string(), Value::from(self.random_weights));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_config() -> Value {
        json!({
            "dataset_name": "human_nontata_promoters",
            "kmer_len": 6,
            "stride": 1,
            "freeze": false,
            "learning_rate": 0.0001,
            "weight_decay": 0.01,
            "batch_size": 32,
            "random_weights": false,
            "epochs": 3
        })
    }

    #[test]
    fn test_run_name_format() {
        let config = RunConfig::from_value(&sample_config()).unwrap();
        assert_eq!(
            config.run_name(),
            "human_nontata_promoters:6:1:freeze=false:LR=0.0001:WD=0.01:BS=32:rand_weights=false:"
        );
    }

    #[test]
    fn test_extra_keys_kept() {
        let config = RunConfig::from_value(&sample_config()).unwrap();
        assert_eq!(config.extra.get("epochs"), Some(&json!(3)));

        let params = config.parameters();
        assert_eq!(params.len(), 9);
        assert_eq!(params["kmer_len"], json!(6));
        assert_eq!(params["epochs"], json!(3));
    }

    #[test]
    fn test_missing_key() {
        let mut value = sample_config();
        value.as_object_mut().unwrap().remove("weight_decay");

        let err = RunConfig::from_value(&value).unwrap_err();
        assert!(matches!(err, RunConfigError::MissingKey("weight_decay")));
    }

    #[test]
    fn test_mistyped_key() {
        let mut value = sample_config();
        value["kmer_len"] = json!("six");
        assert!(matches!(RunConfig::from_value(&value), Err(RunConfigError::Json(_))));
    }

    #[test]
    fn test_not_an_object() {
        assert!(matches!(RunConfig::from_value(&json!([1, 2])), Err(RunConfigError::NotAnObject)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, sample_config().to_string()).unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.batch_size, 32);
        assert!(!config.random_weights);
    }
}
