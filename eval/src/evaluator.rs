// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Test-split evaluation for fine-tuned sequence classifiers
//!
//! Orchestrates:
//! - Device selection
//! - Sequential batched inference (no shuffling, input order preserved)
//! - Ground-truth label lookup
//! - F1 computation
//! - Results serialization

use crate::datasets::{Batch, EncodedDataset, LabelProvider};
use crate::device::{Device, DevicePreference};
use crate::metrics::{Average, ClassificationReport, ConfusionMatrix};
use crate::model::SequenceClassifier;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Samples per forward call
    pub batch_size: usize,
    /// Where to run the model
    pub device: DevicePreference,
    /// F1 averaging
    pub average: Average,
    /// Draw a progress bar over batches
    pub show_progress: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            device: DevicePreference::Cpu,
            average: Average::default(),
            show_progress: true,
        }
    }
}

/// Complete result of one test-split evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub dataset_name: String,
    pub model_name: String,
    pub device: Device,
    pub batch_size: usize,
    pub average: Average,
    pub predictions: Vec<usize>,
    pub labels: Vec<usize>,
    pub f1_score: f64,
    pub report: ClassificationReport,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Result<Self> {
        if config.batch_size == 0 {
            bail!("Batch size must be at least 1");
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} batches ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }

    /// Place the model on the configured device, once
    fn place_model(&self, model: &mut dyn SequenceClassifier) -> Result<Device> {
        let device = self.config.device.resolve(&model.available_devices())?;
        if model.device() != device {
            model
                .to_device(device)
                .with_context(|| format!("Failed to move {} to {}", model.name(), device))?;
        }
        Ok(device)
    }

    /// Predicted class index per sample, in input order
    pub fn predict(&self, samples: &EncodedDataset, model: &mut dyn SequenceClassifier) -> Result<Vec<usize>> {
        let device = self.place_model(model)?;
        tracing::debug!("Running {} on {} with batch size {}", model.name(), device, self.config.batch_size);

        let pb = self.progress_bar(samples.num_batches(self.config.batch_size));
        let mut predictions = Vec::with_capacity(samples.len());
        let mut n_classes: Option<usize> = None;

        for (batch_idx, chunk) in samples.batches(self.config.batch_size).enumerate() {
            let batch = Batch::collate(chunk).with_context(|| format!("Malformed batch {}", batch_idx))?;
            let output = model
                .forward(&batch)
                .with_context(|| format!("Model failed on batch {}", batch_idx))?;

            if output.len() != chunk.len() {
                bail!(
                    "Model returned {} score rows for batch {} of {} samples",
                    output.len(),
                    batch_idx,
                    chunk.len()
                );
            }

            let width = output
                .num_classes()
                .with_context(|| format!("Invalid scores for batch {}", batch_idx))?;
            match n_classes {
                Some(expected) if expected != width => bail!(
                    "Model returned {} class scores per sample for batch {}, earlier batches had {}",
                    width,
                    batch_idx,
                    expected
                ),
                _ => n_classes = Some(width),
            }

            predictions.extend(output.argmax().with_context(|| format!("Invalid scores for batch {}", batch_idx))?);
            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(predictions)
    }

    /// Run the model over the test set and score it against the dataset's labels
    pub fn evaluate(
        &self,
        samples: &EncodedDataset,
        model: &mut dyn SequenceClassifier,
        labels: &dyn LabelProvider,
        dataset_name: &str,
    ) -> Result<EvaluationOutcome> {
        tracing::info!("Computing test score");

        let predictions = self.predict(samples, model)?;
        let labels = labels
            .labels_in_order(dataset_name)
            .with_context(|| format!("Failed to fetch labels for dataset '{}'", dataset_name))?;

        // TODO: align on sample ids once the encoded set carries them; order is trusted for now
        let cm = ConfusionMatrix::from_predictions(&labels, &predictions)?;
        let f1_score = cm.averaged_f1(self.config.average)?;
        let report = ClassificationReport::from_confusion_matrix(cm);

        tracing::info!("test f1 score is {:.4}", f1_score);

        Ok(EvaluationOutcome {
            dataset_name: dataset_name.to_string(),
            model_name: model.name().to_string(),
            device: model.device(),
            batch_size: self.config.batch_size,
            average: self.config.average,
            predictions,
            labels,
            f1_score,
            report,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Score only
    pub fn get_test_score(
        &self,
        samples: &EncodedDataset,
        model: &mut dyn SequenceClassifier,
        labels: &dyn LabelProvider,
        dataset_name: &str,
    ) -> Result<f64> {
        Ok(self.evaluate(samples, model, labels, dataset_name)?.f1_score)
    }

    /// Save outcome to JSON file
    pub fn save_outcome(outcome: &EvaluationOutcome, output_path: &Path) -> Result<()> {
        std::fs::create_dir_all(output_path.parent().unwrap_or(Path::new(".")))?;
        let json = serde_json::to_string_pretty(outcome)?;
        std::fs::write(output_path, json)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        tracing::info!("Results saved to {}", output_path.display());
        Ok(())
    }
}
