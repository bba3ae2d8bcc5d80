// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Sequence classifier interface
//!
//! The fine-tuned transformer itself lives outside this crate. Anything that
//! maps a collated batch to per-class scores can be evaluated through
//! [`SequenceClassifier`]; [`RemoteClassifier`] talks to a model served over
//! HTTP.

use crate::datasets::Batch;
use crate::device::Device;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Model output for one batch: a row of class scores per sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierOutput {
    pub logits: Vec<Vec<f32>>,
}

impl ClassifierOutput {
    pub fn new(logits: Vec<Vec<f32>>) -> Self {
        Self { logits }
    }

    pub fn len(&self) -> usize {
        self.logits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logits.is_empty()
    }

    /// Number of class scores per row; every row must have the same width
    pub fn num_classes(&self) -> Result<usize> {
        let Some(first) = self.logits.first() else {
            return Ok(0);
        };
        let width = first.len();
        if let Some((idx, row)) = self.logits.iter().enumerate().find(|(_, row)| row.len() != width) {
            bail!("Row {} has {} class scores, expected {}", idx, row.len(), width);
        }
        Ok(width)
    }

    /// Index of the highest score in each row.
    ///
    /// Ties go to the lowest index; NaN never wins.
    pub fn argmax(&self) -> Result<Vec<usize>> {
        self.logits
            .iter()
            .enumerate()
            .map(|(row_idx, row)| {
                if row.is_empty() {
                    bail!("Empty class-score row at position {}", row_idx);
                }
                let mut best = 0;
                for (idx, score) in row.iter().enumerate().skip(1) {
                    if *score > row[best] || (row[best].is_nan() && !score.is_nan()) {
                        best = idx;
                    }
                }
                Ok(best)
            })
            .collect()
    }
}

/// A trained classifier that can be placed on a device and run on batches
pub trait SequenceClassifier {
    /// Devices this model can be placed on
    fn available_devices(&self) -> Vec<Device> {
        vec![Device::Cpu]
    }

    /// Current placement
    fn device(&self) -> Device;

    /// Move the model to `device`
    fn to_device(&mut self, device: Device) -> Result<()>;

    /// Run the model on one batch
    fn forward(&mut self, batch: &Batch) -> Result<ClassifierOutput>;

    /// Get model name
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteClassifierConfig {
    /// Inference endpoint receiving one POST per batch
    pub endpoint: String,
    /// Devices the serving process can place the model on
    pub devices: Vec<Device>,
    pub timeout_secs: u64,
}

impl Default for RemoteClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/predict".to_string(),
            devices: vec![Device::Cpu],
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    device: String,
    inputs: &'a Batch,
}

/// Classifier served by an HTTP inference process.
///
/// Each forward call POSTs `{"device": ..., "inputs": {field: rows}}` and
/// expects `{"logits": [[...], ...]}` back.
pub struct RemoteClassifier {
    config: RemoteClassifierConfig,
    client: reqwest::blocking::Client,
    device: Device,
}

impl RemoteClassifier {
    pub fn new(config: RemoteClassifierConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build inference HTTP client")?;

        Ok(Self {
            config,
            client,
            device: Device::Cpu,
        })
    }
}

impl SequenceClassifier for RemoteClassifier {
    fn available_devices(&self) -> Vec<Device> {
        self.config.devices.clone()
    }

    fn device(&self) -> Device {
        self.device
    }

    fn to_device(&mut self, device: Device) -> Result<()> {
        if device != Device::Cpu && !self.config.devices.contains(&device) {
            bail!("Inference endpoint {} does not offer device {}", self.config.endpoint, device);
        }
        self.device = device;
        Ok(())
    }

    fn forward(&mut self, batch: &Batch) -> Result<ClassifierOutput> {
        let request = PredictRequest {
            device: self.device.to_string(),
            inputs: batch,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .with_context(|| format!("Failed to send batch to {}", self.config.endpoint))?;

        if !response.status().is_success() {
            bail!("Inference request failed with status: {}", response.status());
        }

        response
            .json::<ClassifierOutput>()
            .context("Failed to decode inference response")
    }

    fn name(&self) -> &str {
        &self.config.endpoint
    }
}
