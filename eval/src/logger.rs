// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Attach a finished evaluation to its tracking run
//!
//! Sequence: derive the display name, look up the run by key, set the name,
//! log the configuration, log the score, end the run. A bad configuration
//! fails before the tracker is contacted; an unknown or ended run fails at the
//! lookup, before anything is written.

use crate::run_config::RunConfig;
use crate::tracking::{ExperimentKey, TrackingClient};
use anyhow::{Context, Result};
use serde_json::{Map, Value};

/// Metric name used for the test-split score
pub const TEST_F1_METRIC: &str = "test F1 score";

/// Log `config` and `f1_score` to the run identified by `key`, then end it
pub fn log_extra(
    tracker: &mut dyn TrackingClient,
    key: &ExperimentKey,
    config: &RunConfig,
    f1_score: f64,
) -> Result<()> {
    let run_name = config.run_name();

    let info = tracker
        .experiment(key)
        .with_context(|| format!("No active tracking run for key {}", key))?;
    tracing::debug!("Logging to run {} (project {:?})", info.key, info.project);

    tracker
        .set_name(key, &run_name)
        .with_context(|| format!("Failed to name run {}", key))?;
    tracker
        .log_parameters(key, &config.parameters())
        .with_context(|| format!("Failed to log parameters to run {}", key))?;
    tracker
        .log_metric(key, TEST_F1_METRIC, f1_score)
        .with_context(|| format!("Failed to log metric to run {}", key))?;
    tracker
        .end(key)
        .with_context(|| format!("Failed to end run {}", key))?;

    tracing::info!("Logged run {} as '{}' ({} = {:.4})", key, run_name, TEST_F1_METRIC, f1_score);
    Ok(())
}

/// Same as [`log_extra`], validating a raw configuration object first
pub fn log_extra_raw(
    tracker: &mut dyn TrackingClient,
    key: &ExperimentKey,
    config: &Map<String, Value>,
    f1_score: f64,
) -> Result<()> {
    let config = RunConfig::from_map(config)?;
    log_extra(tracker, key, &config, f1_score)
}

/// Explicit key wins; otherwise `fallback` (typically an environment variable)
pub fn resolve_experiment_key(explicit: Option<&str>, fallback: Option<&str>) -> Result<ExperimentKey> {
    fn usable(key: Option<&str>) -> Option<&str> {
        key.map(str::trim).filter(|k| !k.is_empty())
    }
    usable(explicit)
        .or_else(|| usable(fallback))
        .map(ExperimentKey::from)
        .context("No experiment key given (use --experiment-key or COMET_EXPERIMENT_KEY)")
}
