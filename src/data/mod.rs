pub mod loader;
pub mod schema;
pub mod cohort;
pub mod split;
pub mod preprocessing;
pub mod dataset;

use crate::error::PrepError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Label column holding the circulatory state class
pub const LABEL_COLUMN: &str = "classes";

/// Circulatory status annotation column
pub const ANNOTATION_COLUMN: &str = "Annotation";

/// Annotation value for stays without circulatory failure
pub const NO_CIRC: &str = "no_circ";

/// Number of label classes
pub const NUM_CLASSES: usize = 4;

/// Class label values
pub const CLASSES: [u8; NUM_CLASSES] = [0, 1, 2, 3];

/// Source dataset, which fixes the identifier column names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DatasetMode {
    /// MIMIC-IV naming (`subject_id` / `stay_id`)
    Mimic,
    /// eICU naming (`uniquepid` / `patientunitstayid`)
    Eicu,
}

impl DatasetMode {
    /// Patient identifier column
    pub fn patient_id(&self) -> &'static str {
        match self {
            DatasetMode::Mimic => "subject_id",
            DatasetMode::Eicu => "uniquepid",
        }
    }

    /// ICU stay identifier column
    pub fn stay_id(&self) -> &'static str {
        match self {
            DatasetMode::Mimic => "stay_id",
            DatasetMode::Eicu => "patientunitstayid",
        }
    }

    /// Columns that must exist in every input frame
    pub fn required_columns(&self) -> [&'static str; 4] {
        [self.patient_id(), self.stay_id(), LABEL_COLUMN, ANNOTATION_COLUMN]
    }

    /// Columns never used as numeric features
    pub fn numeric_exclusions(&self) -> Vec<&'static str> {
        let mut cols = vec![LABEL_COLUMN, self.stay_id(), self.patient_id()];
        if *self == DatasetMode::Mimic {
            cols.push("hadm_id");
        }
        cols.push(ANNOTATION_COLUMN);
        cols.push("ethnicity");
        cols
    }

    /// Columns never used as categorical features
    ///
    /// Identifier, label and annotation columns are excluded from both roles
    /// so a binary label or annotation can never leak into the features.
    pub fn categorical_exclusions(&self) -> Vec<&'static str> {
        let mut cols = self.numeric_exclusions();
        cols.push("Shock_next_12h");
        cols
    }
}

impl std::fmt::Display for DatasetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetMode::Mimic => write!(f, "mimic"),
            DatasetMode::Eicu => write!(f, "eicu"),
        }
    }
}

/// Which partition a dataset instance serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    Train,
    Valid,
    Test,
}

impl SplitMode {
    /// Validation and test both read the held-out partition
    pub fn is_train(&self) -> bool {
        matches!(self, SplitMode::Train)
    }
}

/// Patient-level split search configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of patients assigned to the training partition
    pub train_ratio: f64,
    /// Maximum accepted |train - test| class ratio difference
    pub threshold: f64,
    /// Maximum number of shuffles to try
    pub n_trial: usize,
    /// Random seed for the patient shuffles
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.7,
            threshold: 0.05,
            n_trial: 1000,
            seed: 2026,
        }
    }
}

/// Dataset construction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Input file (gzip-compressed CSV)
    pub data_path: PathBuf,
    /// Identifier naming convention
    pub dataset_mode: DatasetMode,
    /// Partition to serve
    #[serde(default = "default_split_mode")]
    pub split_mode: SplitMode,
    /// Oversample minority classes in the training partition
    #[serde(default)]
    pub augmentation: bool,
    /// Restrict to recovery/deterioration trajectories before splitting
    #[serde(default)]
    pub visualization: bool,
    /// Split search parameters
    #[serde(default)]
    pub split: SplitConfig,
    /// Random state used by the class balancer
    #[serde(default = "default_balance_seed")]
    pub balance_seed: u64,
    /// Numeric column ordering rows within a stay (file order when unset)
    #[serde(default)]
    pub time_column: Option<String>,
    /// Reference file used to fit the scaler for eICU data
    #[serde(default)]
    pub reference_path: Option<PathBuf>,
    /// Columns that must end up as features after schema inference
    #[serde(default)]
    pub expected_features: Option<Vec<String>>,
}

fn default_split_mode() -> SplitMode {
    SplitMode::Train
}

fn default_balance_seed() -> u64 {
    123
}

impl DatasetConfig {
    /// Create configuration with defaults for everything but the input
    pub fn new<P: AsRef<Path>>(data_path: P, dataset_mode: DatasetMode) -> Self {
        Self {
            data_path: data_path.as_ref().to_path_buf(),
            dataset_mode,
            split_mode: default_split_mode(),
            augmentation: false,
            visualization: false,
            split: SplitConfig::default(),
            balance_seed: default_balance_seed(),
            time_column: None,
            reference_path: None,
            expected_features: None,
        }
    }

    /// Set the partition to serve
    pub fn with_split_mode(mut self, split_mode: SplitMode) -> Self {
        self.split_mode = split_mode;
        self
    }

    /// Set the split search seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.split.seed = seed;
        self
    }

    /// Enable minority class oversampling
    pub fn with_augmentation(mut self, augmentation: bool) -> Self {
        self.augmentation = augmentation;
        self
    }

    /// Enable the trajectory cohort filter
    pub fn with_visualization(mut self, visualization: bool) -> Self {
        self.visualization = visualization;
        self
    }

    /// Replace the split search parameters
    pub fn with_split(mut self, split: SplitConfig) -> Self {
        self.split = split;
        self
    }

    /// Set the reference file for eICU scaling
    pub fn with_reference_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.reference_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

/// Column values
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

/// Named frame column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values),
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.data, ColumnData::Numeric(_))
    }

    /// Number of distinct values
    pub fn n_unique(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v
                .iter()
                .map(|x| if *x == 0.0 { 0u64 } else { x.to_bits() })
                .collect::<HashSet<_>>()
                .len(),
            ColumnData::Text(v) => v.iter().collect::<HashSet<_>>().len(),
        }
    }

    /// Cell rendered as a grouping key
    pub fn key_at(&self, row: usize) -> String {
        match &self.data {
            ColumnData::Numeric(v) => v[row].to_string(),
            ColumnData::Text(v) => v[row].clone(),
        }
    }

    fn take(&self, rows: &[usize]) -> Column {
        let data = match &self.data {
            ColumnData::Numeric(v) => ColumnData::Numeric(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Text(v) => ColumnData::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        };
        Column {
            name: self.name.clone(),
            data,
        }
    }
}

/// In-memory column store with positional rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
}

impl Frame {
    /// Build a frame, checking that all columns have the same length
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let n = first.len();
            for col in &columns {
                if col.len() != n {
                    anyhow::bail!(
                        "Column {} has {} rows, expected {}",
                        col.name,
                        col.len(),
                        n
                    );
                }
            }
        }
        Ok(Self { columns })
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| PrepError::MissingColumn(name.to_string()).into())
    }

    /// Numeric values of a column
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match &self.column(name)?.data {
            ColumnData::Numeric(v) => Ok(v),
            ColumnData::Text(_) => Err(PrepError::NonNumericFeature(name.to_string()).into()),
        }
    }

    /// Column values rendered as grouping keys
    pub fn keys(&self, name: &str) -> Result<Vec<String>> {
        let col = self.column(name)?;
        Ok((0..col.len()).map(|i| col.key_at(i)).collect())
    }

    /// Class labels, validated to lie in 0..=3
    pub fn labels(&self) -> Result<Vec<u8>> {
        self.numeric(LABEL_COLUMN)?
            .iter()
            .enumerate()
            .map(|(row, &value)| {
                if value.fract() == 0.0 && (0.0..NUM_CLASSES as f64).contains(&value) {
                    Ok(value as u8)
                } else {
                    Err(PrepError::InvalidLabel { row, value }.into())
                }
            })
            .collect()
    }

    /// Select rows by position, in the given order
    pub fn take(&self, rows: &[usize]) -> Frame {
        Frame {
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
        }
    }
}

/// Row counts per class, indexed by label
pub fn class_counts(labels: &[u8]) -> [usize; NUM_CLASSES] {
    let mut counts = [0usize; NUM_CLASSES];
    for &label in labels {
        counts[label as usize] += 1;
    }
    counts
}
