// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Standalone run logger
//!
//! Attaches an already computed test score and its run configuration to an
//! existing tracking run, then ends the run.

use anyhow::{Context, Result};
use clap::Parser;
use dnabert_eval::evaluator::EvaluationOutcome;
use dnabert_eval::logger::{log_extra, resolve_experiment_key, TEST_F1_METRIC};
use dnabert_eval::run_config::RunConfig;
use dnabert_eval::tracking::{comet, CometConfig, CometTracker, LocalTracker, TrackingClient};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "log-run")]
#[command(about = "Log a test score and run configuration to an existing tracking run")]
#[command(version)]
struct Args {
    /// Run configuration (JSON object)
    #[arg(short, long)]
    config: PathBuf,

    /// Score to log
    #[arg(short, long, conflicts_with = "outcome", required_unless_present = "outcome")]
    score: Option<f64>,

    /// Read the score from a saved evaluation outcome instead
    #[arg(long)]
    outcome: Option<PathBuf>,

    /// Tracking run to attach results to
    #[arg(short = 'k', long, env = "COMET_EXPERIMENT_KEY")]
    experiment_key: Option<String>,

    #[arg(long, env = "COMET_API_KEY", hide_env_values = true)]
    comet_api_key: Option<String>,

    #[arg(long, env = "COMET_URL", default_value = comet::DEFAULT_BASE_URL)]
    comet_url: String,

    /// Log to local JSON records in this directory instead of Comet
    #[arg(long)]
    local_dir: Option<PathBuf>,

    /// Print the run name and parameters without contacting the tracker
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = RunConfig::load(&args.config)
        .with_context(|| format!("Invalid run configuration {}", args.config.display()))?;

    let score = match (args.score, &args.outcome) {
        (Some(score), _) => score,
        (None, Some(path)) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read outcome {}", path.display()))?;
            let outcome: EvaluationOutcome = serde_json::from_str(&json)
                .with_context(|| format!("Malformed outcome {}", path.display()))?;
            outcome.f1_score
        }
        (None, None) => anyhow::bail!("Either --score or --outcome is required"),
    };

    if args.dry_run {
        println!("Run name: {}", config.run_name());
        println!("Parameters:");
        for (key, value) in config.parameters() {
            println!("  {}: {}", key, value);
        }
        println!("{}: {:.4}", TEST_F1_METRIC, score);
        return Ok(());
    }

    let key = resolve_experiment_key(args.experiment_key.as_deref(), None)?;

    let mut tracker: Box<dyn TrackingClient> = match args.local_dir {
        Some(ref dir) => Box::new(LocalTracker::new(dir)?),
        None => Box::new(CometTracker::new(CometConfig {
            api_key: args.comet_api_key.clone().context("COMET_API_KEY is not set")?,
            base_url: args.comet_url.clone(),
            ..Default::default()
        })?),
    };

    log_extra(tracker.as_mut(), &key, &config, score)?;
    println!("Logged {} = {:.4} to run {}", TEST_F1_METRIC, score, key);

    Ok(())
}
