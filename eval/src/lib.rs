// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Test-split evaluation for fine-tuned DNABERT sequence classifiers
//!
//! This crate provides:
//! - Encoded test sets and ground-truth label providers
//! - Sequential batched inference through a pluggable classifier
//! - F1 and related classification metrics
//! - Logging of run configuration and score to an experiment tracker

pub mod datasets;
pub mod device;
pub mod evaluator;
pub mod logger;
pub mod metrics;
pub mod model;
pub mod run_config;
pub mod tracking;

#[cfg(test)]
mod http_stub;

pub use datasets::{Batch, BenchmarkDirLabels, EncodedDataset, EncodedSample, LabelProvider, StaticLabels};
pub use device::{Device, DevicePreference};
pub use evaluator::{EvaluationOutcome, Evaluator, EvaluatorConfig};
pub use logger::{log_extra, TEST_F1_METRIC};
pub use metrics::{f1_score, Average, ClassificationReport, ConfusionMatrix, MetricError};
pub use model::{ClassifierOutput, RemoteClassifier, RemoteClassifierConfig, SequenceClassifier};
pub use run_config::{RunConfig, RunConfigError};
pub use tracking::{ExperimentKey, TrackingClient, TrackingError};
