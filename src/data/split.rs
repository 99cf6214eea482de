//! Patient-level train/test split search
//!
//! Patients are shuffled and cut at the train fraction until the mean class
//! label of both partitions agrees within a tolerance. The tolerance widens
//! every [`RELAX_EVERY`] failed trials so the search terminates within the
//! trial budget. All rows of a patient always land in the same partition.

use crate::data::{class_counts, DatasetMode, Frame, SplitConfig, CLASSES, NUM_CLASSES};
use crate::error::PrepError;
use crate::utils::{random::seeded_rng, validation};
use anyhow::Result;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Failed trials between threshold relaxations
pub const RELAX_EVERY: usize = 10_000;

/// Threshold increase applied at each relaxation
pub const RELAX_STEP: f64 = 0.05;

/// Per-partition statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSummary {
    /// Number of rows
    pub rows: usize,
    /// Distinct patient ids
    pub patients: usize,
    /// Distinct stay ids
    pub stays: usize,
    /// Rows per class, indexed by label
    pub class_counts: [usize; NUM_CLASSES],
    /// Share of rows per class
    pub class_proportions: [f64; NUM_CLASSES],
    /// Mean class label, rounded to 4 decimals
    pub class_ratio: f64,
}

/// Outcome of a split search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitReport {
    /// Seed of the shuffle RNG
    pub seed: u64,
    /// Fraction of patients assigned to train
    pub train_ratio: f64,
    /// Configured class ratio tolerance
    pub initial_threshold: f64,
    /// Threshold in force when the search stopped
    pub threshold: f64,
    /// Shuffles tried, including the accepted one
    pub trials: usize,
    /// Whether the accepted split met the threshold
    pub converged: bool,
    /// Wall-clock duration of the search
    pub elapsed_secs: f64,
    /// Training partition statistics
    pub train: PartitionSummary,
    /// Held-out partition statistics
    pub test: PartitionSummary,
}

impl SplitReport {
    /// Absolute difference between train and test class ratios
    pub fn ratio_gap(&self) -> f64 {
        (self.train.class_ratio - self.test.class_ratio).abs()
    }

    /// Log the report at info level
    pub fn log(&self) {
        info!("=== Split Summary ===");
        info!(
            "Ratio: train = {:.2}, test = {:.2}",
            self.train_ratio,
            1.0 - self.train_ratio
        );
        for (name, part) in [("Train", &self.train), ("Test", &self.test)] {
            info!(
                "{}: rows={}, patients={}, stays={}, class counts={:?}",
                name, part.rows, part.patients, part.stays, part.class_counts
            );
            let p = part.class_proportions;
            info!(
                "{} class proportions: {:.2}:{:.2}:{:.2}:{:.2} (mean label {:.4})",
                name, p[0], p[1], p[2], p[3], part.class_ratio
            );
        }
        info!(
            "Seed {}, threshold {:.2}, {} trial(s), converged={}, {}",
            self.seed,
            self.threshold,
            self.trials,
            self.converged,
            crate::utils::format_duration(self.elapsed_secs)
        );
    }
}

/// Train and test frames with the search report
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub train: Frame,
    pub test: Frame,
    pub report: SplitReport,
}

/// Rows and label sum for one patient
struct PatientRows {
    rows: Vec<usize>,
    label_sum: u64,
}

/// Class-ratio balanced patient-level splitter
#[derive(Debug, Clone)]
pub struct BalancedSplitter {
    config: SplitConfig,
    mode: DatasetMode,
}

impl BalancedSplitter {
    pub fn new(config: SplitConfig, mode: DatasetMode) -> Self {
        Self { config, mode }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |e: anyhow::Error| PrepError::InvalidConfig(e.to_string());
        validation::in_range(self.config.train_ratio, 0.0, 1.0, "train_ratio").map_err(invalid)?;
        validation::positive(self.config.n_trial, "n_trial").map_err(invalid)?;
        validation::in_range(self.config.threshold, 0.0, 1.0, "threshold").map_err(invalid)?;
        Ok(())
    }

    /// Search for a balanced split of `frame`
    pub fn split(&self, frame: &Frame) -> Result<SplitOutcome> {
        self.validate()?;
        let start = Instant::now();

        let labels = frame.labels()?;
        let patients = frame.keys(self.mode.patient_id())?;

        // Patients in order of first appearance
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<PatientRows> = Vec::new();
        for (row, patient) in patients.iter().enumerate() {
            let slot = *index.entry(patient.as_str()).or_insert_with(|| {
                groups.push(PatientRows {
                    rows: Vec::new(),
                    label_sum: 0,
                });
                groups.len() - 1
            });
            groups[slot].rows.push(row);
            groups[slot].label_sum += labels[row] as u64;
        }

        let n_patients = groups.len();
        let split_point = (self.config.train_ratio * n_patients as f64).floor() as usize;
        if split_point == 0 {
            return Err(PrepError::EmptyPartition("train".to_string()).into());
        }
        if split_point == n_patients {
            return Err(PrepError::EmptyPartition("test".to_string()).into());
        }
        info!(
            "Searching split of {} patients ({} train) with seed {}",
            n_patients, split_point, self.config.seed
        );

        let partition_ratio = |ids: &[usize]| {
            let (sum, count) = ids.iter().fold((0u64, 0usize), |(s, c), &p| {
                (s + groups[p].label_sum, c + groups[p].rows.len())
            });
            round4(sum as f64 / count as f64)
        };

        let mut rng = seeded_rng(self.config.seed);
        let mut threshold = self.config.threshold;
        let mut order: Vec<usize> = (0..n_patients).collect();
        let mut converged = false;
        let mut trials = 0;

        for trial in 0..self.config.n_trial {
            trials = trial + 1;
            order.shuffle(&mut rng);

            let (train_ids, test_ids) = order.split_at(split_point);
            let gap = (partition_ratio(train_ids) - partition_ratio(test_ids)).abs();
            if gap <= threshold {
                converged = true;
                break;
            }

            if trial % 100 == 0 {
                debug!("Trial {}: class ratio gap {:.4}", trial, gap);
            }
            if trials % RELAX_EVERY == 0 {
                threshold += RELAX_STEP;
                info!("Relaxing split threshold to {:.2}", threshold);
            }
        }

        if !converged {
            warn!(
                "No split within threshold {:.2} after {} trials, using the last attempt",
                threshold, trials
            );
        }

        let collect_rows = |ids: &[usize]| {
            let mut rows: Vec<usize> = ids
                .iter()
                .flat_map(|&p| groups[p].rows.iter().copied())
                .collect();
            rows.sort_unstable();
            rows
        };
        let (train_ids, test_ids) = order.split_at(split_point);
        let train = frame.take(&collect_rows(train_ids));
        let test = frame.take(&collect_rows(test_ids));

        let report = SplitReport {
            seed: self.config.seed,
            train_ratio: self.config.train_ratio,
            initial_threshold: self.config.threshold,
            threshold,
            trials,
            converged,
            elapsed_secs: start.elapsed().as_secs_f64(),
            train: self.summarize(&train, "train")?,
            test: self.summarize(&test, "test")?,
        };

        Ok(SplitOutcome {
            train,
            test,
            report,
        })
    }

    fn summarize(&self, frame: &Frame, partition: &str) -> Result<PartitionSummary> {
        let labels = frame.labels()?;
        if labels.is_empty() {
            return Err(PrepError::EmptyPartition(partition.to_string()).into());
        }

        let counts = class_counts(&labels);
        for class in CLASSES {
            if counts[class as usize] == 0 {
                return Err(PrepError::MissingClass {
                    partition: partition.to_string(),
                    class,
                }
                .into());
            }
        }

        let total = labels.len() as f64;
        let mut proportions = [0.0; NUM_CLASSES];
        for (p, &c) in proportions.iter_mut().zip(&counts) {
            *p = c as f64 / total;
        }
        let label_sum: u64 = labels.iter().map(|&l| l as u64).sum();

        let distinct = |column: &str| -> Result<usize> {
            Ok(frame.keys(column)?.into_iter().collect::<HashSet<_>>().len())
        };

        Ok(PartitionSummary {
            rows: labels.len(),
            patients: distinct(self.mode.patient_id())?,
            stays: distinct(self.mode.stay_id())?,
            class_counts: counts,
            class_proportions: proportions,
            class_ratio: round4(label_sum as f64 / total),
        })
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
