// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Classification metrics over integer class indices
//!
//! Implements:
//! - Confusion Matrix (n x n)
//! - Accuracy, per-class Precision, Recall, F1-Score
//! - F1 averaging: binary, micro, macro, weighted

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    #[error("Found input variables with inconsistent numbers of samples: {labels} labels, {predictions} predictions")]
    LengthMismatch { labels: usize, predictions: usize },

    #[error("Target is multiclass ({classes:?}) but average is binary")]
    NotBinary { classes: Vec<usize> },

    #[error("pos_label={pos_label} is not a valid label; present classes are {classes:?}")]
    InvalidPosLabel { pos_label: usize, classes: Vec<usize> },
}

/// How per-class F1 scores are reduced to a single value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Average {
    /// F1 of `pos_label` only; requires at most two classes
    Binary { pos_label: usize },
    /// Global TP/FP/FN counts
    Micro,
    /// Unweighted mean of per-class F1
    Macro,
    /// Per-class F1 weighted by support
    Weighted,
}

impl Default for Average {
    fn default() -> Self {
        Average::Binary { pos_label: 1 }
    }
}

impl fmt::Display for Average {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Average::Binary { pos_label } => write!(f, "binary(pos_label={})", pos_label),
            Average::Micro => write!(f, "micro"),
            Average::Macro => write!(f, "macro"),
            Average::Weighted => write!(f, "weighted"),
        }
    }
}

impl std::str::FromStr for Average {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(Average::default()),
            "micro" => Ok(Average::Micro),
            "macro" => Ok(Average::Macro),
            "weighted" => Ok(Average::Weighted),
            other => Err(format!("unknown averaging '{}' (binary, micro, macro, weighted)", other)),
        }
    }
}

/// Confusion matrix: `counts[actual][predicted]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Create from ground truth and predictions, compared by position
    pub fn from_predictions(labels: &[usize], predictions: &[usize]) -> Result<Self, MetricError> {
        if labels.len() != predictions.len() {
            return Err(MetricError::LengthMismatch {
                labels: labels.len(),
                predictions: predictions.len(),
            });
        }

        let n_classes = labels
            .iter()
            .chain(predictions.iter())
            .max()
            .map_or(0, |max| max + 1);

        let mut counts = vec![vec![0; n_classes]; n_classes];
        for (actual, predicted) in labels.iter().zip(predictions.iter()) {
            counts[*actual][*predicted] += 1;
        }

        Ok(Self { counts })
    }

    pub fn n_classes(&self) -> usize {
        self.counts.len()
    }

    /// Total number of samples
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn true_positives(&self, class: usize) -> usize {
        self.counts.get(class).and_then(|row| row.get(class)).copied().unwrap_or(0)
    }

    /// Samples predicted as `class` that belong elsewhere
    pub fn false_positives(&self, class: usize) -> usize {
        self.predicted_count(class) - self.true_positives(class)
    }

    /// Samples of `class` predicted as something else
    pub fn false_negatives(&self, class: usize) -> usize {
        self.support(class) - self.true_positives(class)
    }

    pub fn support(&self, class: usize) -> usize {
        self.counts.get(class).map_or(0, |row| row.iter().sum())
    }

    fn predicted_count(&self, class: usize) -> usize {
        self.counts.iter().filter_map(|row| row.get(class)).sum()
    }

    /// Accuracy: correct / total
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.n_classes()).map(|c| self.true_positives(c)).sum();
        correct as f64 / total as f64
    }

    /// Precision: TP / (TP + FP)
    pub fn precision(&self, class: usize) -> f64 {
        ratio(self.true_positives(class), self.predicted_count(class))
    }

    /// Recall: TP / (TP + FN)
    pub fn recall(&self, class: usize) -> f64 {
        ratio(self.true_positives(class), self.support(class))
    }

    /// F1 Score: 2 * TP / (2 * TP + FP + FN)
    pub fn f1_score(&self, class: usize) -> f64 {
        let tp = self.true_positives(class);
        ratio(2 * tp, 2 * tp + self.false_positives(class) + self.false_negatives(class))
    }

    /// Classes that occur in either the labels or the predictions
    fn present_classes(&self) -> Vec<usize> {
        (0..self.n_classes())
            .filter(|&c| self.support(c) > 0 || self.predicted_count(c) > 0)
            .collect()
    }

    /// Reduce per-class F1 according to `average`
    pub fn averaged_f1(&self, average: Average) -> Result<f64, MetricError> {
        let classes = self.present_classes();

        let score = match average {
            Average::Binary { pos_label } => {
                if classes.len() > 2 {
                    return Err(MetricError::NotBinary { classes });
                }
                if classes.len() == 2 && !classes.contains(&pos_label) {
                    return Err(MetricError::InvalidPosLabel { pos_label, classes });
                }
                self.f1_score(pos_label)
            }
            Average::Micro => {
                // Single-label case: micro precision == micro recall == accuracy
                self.accuracy()
            }
            Average::Macro => {
                if classes.is_empty() {
                    return Ok(0.0);
                }
                classes.iter().map(|&c| self.f1_score(c)).sum::<f64>() / classes.len() as f64
            }
            Average::Weighted => {
                let total = self.total();
                if total == 0 {
                    return Ok(0.0);
                }
                classes
                    .iter()
                    .map(|&c| self.f1_score(c) * self.support(c) as f64)
                    .sum::<f64>()
                    / total as f64
            }
        };

        Ok(score)
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        return 0.0;
    }
    num as f64 / denom as f64
}

/// F1 score comparing `labels` to `predictions` elementwise by position
pub fn f1_score(labels: &[usize], predictions: &[usize], average: Average) -> Result<f64, MetricError> {
    ConfusionMatrix::from_predictions(labels, predictions)?.averaged_f1(average)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Full classification report with all metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub confusion_matrix: ConfusionMatrix,
    pub accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
    pub macro_f1: f64,
    pub weighted_f1: f64,
    pub support: usize,
}

impl ClassificationReport {
    /// Generate full report from confusion matrix
    pub fn from_confusion_matrix(cm: ConfusionMatrix) -> Self {
        let present: BTreeSet<usize> = cm.present_classes().into_iter().collect();
        let per_class = present
            .iter()
            .map(|&class| ClassMetrics {
                class,
                precision: cm.precision(class),
                recall: cm.recall(class),
                f1_score: cm.f1_score(class),
                support: cm.support(class),
            })
            .collect();

        Self {
            accuracy: cm.accuracy(),
            per_class,
            macro_f1: cm.averaged_f1(Average::Macro).unwrap_or(0.0),
            weighted_f1: cm.averaged_f1(Average::Weighted).unwrap_or(0.0),
            support: cm.total(),
            confusion_matrix: cm,
        }
    }

    /// Generate report from ground truth and predictions
    pub fn from_predictions(labels: &[usize], predictions: &[usize]) -> Result<Self, MetricError> {
        let cm = ConfusionMatrix::from_predictions(labels, predictions)?;
        Ok(Self::from_confusion_matrix(cm))
    }

    /// Format as a human-readable string
    pub fn format(&self) -> String {
        let mut output = String::from("Classification Report\n=====================\n");
        output.push_str(&format!("{:<10} {:>10} {:>10} {:>10} {:>10}\n", "class", "precision", "recall", "f1-score", "support"));

        for m in &self.per_class {
            output.push_str(&format!(
                "{:<10} {:>10.4} {:>10.4} {:>10.4} {:>10}\n",
                m.class, m.precision, m.recall, m.f1_score, m.support
            ));
        }

        output.push_str(&format!("\nAccuracy:    {:.4} ({:.2}%)\n", self.accuracy, self.accuracy * 100.0));
        output.push_str(&format!("Macro F1:    {:.4}\n", self.macro_f1));
        output.push_str(&format!("Weighted F1: {:.4}\n", self.weighted_f1));
        output.push_str(&format!("Support:     {}\n", self.support));

        output.push_str("\nConfusion Matrix (rows: actual, columns: predicted):\n");
        for row in &self.confusion_matrix.counts {
            let cells: Vec<String> = row.iter().map(|c| format!("{:>6}", c)).collect();
            output.push_str(&format!("  {}\n", cells.join(" ")));
        }

        output
    }
}
