// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Encoded test sets and ground-truth labels
//!
//! Samples arrive already tokenized (one JSON object per line, each field an
//! integer sequence such as `input_ids` or `attention_mask`). Labels come from
//! a [`LabelProvider`], looked up by dataset name.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// A single pre-tokenized model input: field name -> token-level values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedSample {
    pub fields: BTreeMap<String, Vec<i64>>,
}

impl EncodedSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, values: Vec<i64>) -> Self {
        self.fields.insert(name.into(), values);
        self
    }

    pub fn field(&self, name: &str) -> Option<&[i64]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// Collated batch: field name -> one row per sample, in sample order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch {
    pub fields: BTreeMap<String, Vec<Vec<i64>>>,
}

impl Batch {
    /// Stack a chunk of samples field by field.
    ///
    /// Every sample must carry the same field names as the first one.
    pub fn collate(samples: &[EncodedSample]) -> Result<Self> {
        let Some(first) = samples.first() else {
            return Ok(Self::default());
        };

        let mut fields: BTreeMap<String, Vec<Vec<i64>>> = first
            .field_names()
            .map(|name| (name.to_string(), Vec::with_capacity(samples.len())))
            .collect();

        for (idx, sample) in samples.iter().enumerate() {
            if sample.fields.len() != fields.len()
                || sample.field_names().any(|name| !fields.contains_key(name))
            {
                bail!(
                    "Sample {} in batch has fields {:?}, expected {:?}",
                    idx,
                    sample.field_names().collect::<Vec<_>>(),
                    fields.keys().collect::<Vec<_>>()
                );
            }
            for (name, values) in &sample.fields {
                if let Some(rows) = fields.get_mut(name) {
                    rows.push(values.clone());
                }
            }
        }

        Ok(Self { fields })
    }

    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.fields.values().next().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An ordered, read-only collection of encoded samples
#[derive(Debug, Clone, Default)]
pub struct EncodedDataset {
    pub source: Option<PathBuf>,
    pub samples: Vec<EncodedSample>,
}

impl EncodedDataset {
    pub fn from_samples(samples: Vec<EncodedSample>) -> Self {
        Self { source: None, samples }
    }

    /// Load a JSON-lines file, one sample per line, preserving file order
    pub fn load_jsonl(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open encoded test set: {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut samples = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {} in {}", idx + 1, path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let sample: EncodedSample = serde_json::from_str(&line)
                .with_context(|| format!("Malformed sample on line {} in {}", idx + 1, path.display()))?;
            samples.push(sample);
        }

        tracing::debug!("Loaded {} encoded samples from {}", samples.len(), path.display());

        Ok(Self {
            source: Some(path.to_path_buf()),
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sequential, non-shuffled chunks; the last one may be short
    pub fn batches(&self, batch_size: usize) -> std::slice::Chunks<'_, EncodedSample> {
        self.samples.chunks(batch_size.max(1))
    }

    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.samples.len().div_ceil(batch_size.max(1))
    }
}

/// Source of ground-truth class indices, in the same order as the encoded set
pub trait LabelProvider {
    fn labels_in_order(&self, dataset_name: &str) -> Result<Vec<usize>>;
}

/// Labels read from a genomic-benchmark style directory tree:
/// `<root>/<dataset>/<split>/<class_name>/<one file per sample>`.
///
/// Classes are indexed by sorted directory name; labels are emitted class by
/// class.
#[derive(Debug, Clone)]
pub struct BenchmarkDirLabels {
    pub root: PathBuf,
    pub split: String,
}

impl BenchmarkDirLabels {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            split: "test".to_string(),
        }
    }

    pub fn with_split(mut self, split: impl Into<String>) -> Self {
        self.split = split.into();
        self
    }

    /// Sorted class directory names for a dataset split
    pub fn class_names(&self, dataset_name: &str) -> Result<Vec<String>> {
        let split_dir = self.root.join(dataset_name).join(&self.split);
        if !split_dir.is_dir() {
            bail!(
                "Dataset '{}' has no '{}' split under {}",
                dataset_name,
                self.split,
                self.root.display()
            );
        }

        let mut classes = Vec::new();
        for entry in std::fs::read_dir(&split_dir)
            .with_context(|| format!("Failed to list {}", split_dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            classes.push(name);
        }
        classes.sort();
        Ok(classes)
    }

    fn count_samples(dir: &Path) -> Result<usize> {
        let mut count = 0;
        for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if entry.file_type()?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }
}

impl LabelProvider for BenchmarkDirLabels {
    fn labels_in_order(&self, dataset_name: &str) -> Result<Vec<usize>> {
        let split_dir = self.root.join(dataset_name).join(&self.split);
        let mut labels = Vec::new();

        for (class_idx, class_name) in self.class_names(dataset_name)?.iter().enumerate() {
            let n = Self::count_samples(&split_dir.join(class_name))?;
            tracing::debug!("{}/{}: class {} ({}) has {} samples", dataset_name, self.split, class_idx, class_name, n);
            labels.extend(std::iter::repeat(class_idx).take(n));
        }

        Ok(labels)
    }
}

/// Labels already held in memory, keyed by dataset name
#[derive(Debug, Clone, Default)]
pub struct StaticLabels {
    labels: HashMap<String, Vec<usize>>,
}

impl StaticLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, dataset_name: impl Into<String>, labels: Vec<usize>) -> Self {
        self.labels.insert(dataset_name.into(), labels);
        self
    }
}

impl LabelProvider for StaticLabels {
    fn labels_in_order(&self, dataset_name: &str) -> Result<Vec<usize>> {
        match self.labels.get(dataset_name) {
            Some(labels) => Ok(labels.clone()),
            None => bail!("No labels registered for dataset '{}'", dataset_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample(ids: Vec<i64>) -> EncodedSample {
        let mask = vec![1; ids.len()];
        EncodedSample::new()
            .with_field("input_ids", ids)
            .with_field("attention_mask", mask)
    }

    #[test]
    fn test_collate_preserves_order() {
        let samples = vec![sample(vec![2, 5, 3]), sample(vec![2, 6, 3]), sample(vec![2, 7, 3])];
        let batch = Batch::collate(&samples).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.fields["input_ids"][0], vec![2, 5, 3]);
        assert_eq!(batch.fields["input_ids"][2], vec![2, 7, 3]);
        assert_eq!(batch.fields["attention_mask"][1], vec![1, 1, 1]);
    }

    #[test]
    fn test_collate_rejects_mismatched_fields() {
        let samples = vec![sample(vec![1, 2]), EncodedSample::new().with_field("input_ids", vec![1, 2])];
        assert!(Batch::collate(&samples).is_err());
    }

    #[test]
    fn test_batches_are_sequential() {
        let dataset = EncodedDataset::from_samples((0..10).map(|i| sample(vec![i])).collect());

        assert_eq!(dataset.num_batches(4), 3);
        let sizes: Vec<usize> = dataset.batches(4).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let flattened: Vec<i64> = dataset
            .batches(4)
            .flat_map(|b| b.iter().map(|s| s.field("input_ids").unwrap()[0]))
            .collect();
        assert_eq!(flattened, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_load_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, r#"{{"input_ids": [2, 10, 3], "attention_mask": [1, 1, 1]}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"input_ids": [2, 11, 3], "attention_mask": [1, 1, 0]}}"#).unwrap();

        let dataset = EncodedDataset::load_jsonl(&path).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.samples[1].field("attention_mask"), Some(&[1, 1, 0][..]));
        assert_eq!(dataset.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_jsonl_reports_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"input_ids\": [1]}\nnot json\n").unwrap();

        let err = EncodedDataset::load_jsonl(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn test_benchmark_dir_labels_sorted_by_class() {
        let dir = tempfile::tempdir().unwrap();
        let split = dir.path().join("human_nontata_promoters").join("test");
        for (class, n) in [("positive", 2), ("negative", 3)] {
            let class_dir = split.join(class);
            std::fs::create_dir_all(&class_dir).unwrap();
            for i in 0..n {
                std::fs::write(class_dir.join(format!("{}.txt", i)), "ACGT").unwrap();
            }
        }
        std::fs::write(split.join("negative").join(".DS_Store"), "").unwrap();

        let provider = BenchmarkDirLabels::new(dir.path());
        assert_eq!(
            provider.class_names("human_nontata_promoters").unwrap(),
            vec!["negative".to_string(), "positive".to_string()]
        );
        assert_eq!(
            provider.labels_in_order("human_nontata_promoters").unwrap(),
            vec![0, 0, 0, 1, 1]
        );
    }

    #[test]
    fn test_benchmark_dir_missing_split() {
        let dir = tempfile::tempdir().unwrap();
        let provider = BenchmarkDirLabels::new(dir.path()).with_split("validation");
        assert!(provider.labels_in_order("demo_coding_vs_intergenomic_seqs").is_err());
    }

    #[test]
    fn test_static_labels() {
        let provider = StaticLabels::new().with_dataset("demo", vec![1, 0, 1]);
        assert_eq!(provider.labels_in_order("demo").unwrap(), vec![1, 0, 1]);
        assert!(provider.labels_in_order("other").is_err());
    }
}
