// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Test-split evaluation CLI for fine-tuned DNABERT classifiers
//!
//! Usage:
//!   dnabert-eval --encoded test.jsonl --dataset human_nontata_promoters \
//!       --benchmark-root ~/.genomic_benchmarks --endpoint http://127.0.0.1:8080/predict
//!   dnabert-eval ... --run-config run.json --experiment-key <KEY>

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dnabert_eval::datasets::{BenchmarkDirLabels, EncodedDataset};
use dnabert_eval::device::{Device, DevicePreference};
use dnabert_eval::evaluator::{Evaluator, EvaluatorConfig};
use dnabert_eval::logger::{log_extra, resolve_experiment_key};
use dnabert_eval::metrics::Average;
use dnabert_eval::model::{RemoteClassifier, RemoteClassifierConfig};
use dnabert_eval::run_config::RunConfig;
use dnabert_eval::tracking::{comet, CometConfig, CometTracker, LocalTracker, TrackingClient};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TrackerKind {
    Comet,
    Local,
}

#[derive(Parser, Debug)]
#[command(name = "dnabert-eval")]
#[command(about = "Evaluate a fine-tuned sequence classifier on a test split and log the F1 score")]
#[command(version)]
struct Args {
    /// Pre-tokenized test set (JSON lines, one sample per line)
    #[arg(short, long)]
    encoded: PathBuf,

    /// Dataset name used to look up ground-truth labels
    #[arg(short, long)]
    dataset: String,

    /// Root of the benchmark directory tree holding the labels
    #[arg(long, default_value = "datasets")]
    benchmark_root: PathBuf,

    /// Split directory under each dataset
    #[arg(long, default_value = "test")]
    split: String,

    /// Inference endpoint serving the model
    #[arg(long, default_value = "http://127.0.0.1:8080/predict")]
    endpoint: String,

    /// Devices the inference endpoint can use (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "cpu")]
    model_devices: Vec<Device>,

    /// Device to run on (auto, cpu, cuda, cuda:N)
    #[arg(long, default_value = "cpu")]
    device: DevicePreference,

    /// Samples per forward call
    #[arg(short, long, default_value_t = 4)]
    batch_size: usize,

    /// F1 averaging (binary, micro, macro, weighted)
    #[arg(long, default_value = "binary")]
    average: Average,

    /// Write the full outcome as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Run configuration (JSON object); when given, the score is logged
    #[arg(long)]
    run_config: Option<PathBuf>,

    /// Tracking backend
    #[arg(long, value_enum, default_value_t = TrackerKind::Comet)]
    tracker: TrackerKind,

    /// Tracking run to attach results to
    #[arg(long, env = "COMET_EXPERIMENT_KEY")]
    experiment_key: Option<String>,

    #[arg(long, env = "COMET_API_KEY", hide_env_values = true)]
    comet_api_key: Option<String>,

    #[arg(long, env = "COMET_URL", default_value = comet::DEFAULT_BASE_URL)]
    comet_url: String,

    /// Directory for the local tracker
    #[arg(long, default_value = "eval/runs")]
    local_dir: PathBuf,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Bad run configurations fail here, before any inference or tracking call
    let run_config = args
        .run_config
        .as_deref()
        .map(|path| {
            RunConfig::load(path).with_context(|| format!("Invalid run configuration {}", path.display()))
        })
        .transpose()?;

    // Tracker and run key are resolved before any inference
    let tracking = match run_config {
        Some(config) => {
            let (tracker, key) = match args.tracker {
                TrackerKind::Comet => {
                    let key = resolve_experiment_key(args.experiment_key.as_deref(), None)?;
                    let tracker = CometTracker::new(CometConfig {
                        api_key: args.comet_api_key.clone().context("COMET_API_KEY is not set")?,
                        base_url: args.comet_url.clone(),
                        ..Default::default()
                    })?;
                    (Box::new(tracker) as Box<dyn TrackingClient>, key)
                }
                TrackerKind::Local => {
                    let tracker = LocalTracker::new(&args.local_dir)?;
                    let key = match args.experiment_key.as_deref() {
                        Some(key) => resolve_experiment_key(Some(key), None)?,
                        None => tracker.create_run()?,
                    };
                    (Box::new(tracker) as Box<dyn TrackingClient>, key)
                }
            };
            Some((config, tracker, key))
        }
        None => None,
    };

    tracing::info!("Dataset: {}", args.dataset);
    tracing::info!("Encoded test set: {}", args.encoded.display());
    tracing::info!("Device: {}, batch size: {}", args.device, args.batch_size);

    let samples = EncodedDataset::load_jsonl(&args.encoded)?;
    let labels = BenchmarkDirLabels::new(&args.benchmark_root).with_split(&args.split);
    let mut model = RemoteClassifier::new(RemoteClassifierConfig {
        endpoint: args.endpoint.clone(),
        devices: args.model_devices.clone(),
        ..Default::default()
    })?;

    let evaluator = Evaluator::new(EvaluatorConfig {
        batch_size: args.batch_size,
        device: args.device,
        average: args.average,
        show_progress: !args.no_progress,
    })?;

    let outcome = evaluator.evaluate(&samples, &mut model, &labels, &args.dataset)?;

    println!("\n{}", "=".repeat(70));
    println!("TEST EVALUATION");
    println!("{}", "=".repeat(70));
    println!("Dataset:  {}", outcome.dataset_name);
    println!("Samples:  {}", outcome.predictions.len());
    println!("Device:   {}", outcome.device);
    println!("Average:  {}", outcome.average);
    println!("\n{}", outcome.report.format());
    println!("test f1 score is {:.4}", outcome.f1_score);

    if let Some(ref path) = args.output {
        Evaluator::save_outcome(&outcome, path)?;
        println!("\nJSON results saved to: {}", path.display());
    }

    if let Some((config, mut tracker, key)) = tracking {
        log_extra(tracker.as_mut(), &key, &config, outcome.f1_score)?;
        println!("\nLogged to run {}", key);
    }

    Ok(())
}
