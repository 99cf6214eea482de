//! Trajectory-based cohort selection
//!
//! Keeps ICU stays that either recover (reach class 2 after a clean start) or
//! deteriorate (end in a sustained run of class 3 after a clean start).

use crate::data::{DatasetMode, Frame, ANNOTATION_COLUMN, NO_CIRC};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info};

/// Leading records that must be annotated `no_circ`
pub const HEAD_LEN: usize = 3;

/// Trailing records that must be class 3 for a deterioration stay
pub const TAIL_LEN: usize = 10;

const RECOVERY_MASK: u8 = 0b1111;
const DETERIORATION_MASK: u8 = 0b1011;

/// Counts of stays kept by each trajectory rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CohortSummary {
    pub input_rows: usize,
    pub recovery_stays: usize,
    pub deterioration_stays: usize,
    pub output_rows: usize,
}

/// One stay's rows, in time order
struct StayGroup {
    key: String,
    rows: Vec<usize>,
    label_mask: u8,
}

/// Cohort filter over stay-level frames
#[derive(Debug, Clone)]
pub struct CohortFilter {
    mode: DatasetMode,
    time_column: Option<String>,
}

impl CohortFilter {
    pub fn new(mode: DatasetMode) -> Self {
        Self {
            mode,
            time_column: None,
        }
    }

    /// Order rows within a stay by this numeric column instead of file order
    pub fn with_time_column(mut self, column: Option<String>) -> Self {
        self.time_column = column;
        self
    }

    /// Recovery rows followed by deterioration rows
    pub fn apply(&self, frame: &Frame) -> Result<(Frame, CohortSummary)> {
        let labels = frame.labels()?;
        let annotations = frame.keys(ANNOTATION_COLUMN)?;
        let groups = self.group_stays(frame, &labels)?;

        let is_clean_start = |rows: &[usize]| {
            rows.iter()
                .take(HEAD_LEN)
                .all(|&i| annotations[i] == NO_CIRC)
        };

        // Recovery: stays showing every class, truncated after the last class 2
        let mut recovery_groups: Vec<&StayGroup> = groups
            .iter()
            .filter(|g| g.label_mask == RECOVERY_MASK)
            .collect();
        recovery_groups.sort_by(|a, b| compare_keys(&a.key, &b.key));

        let mut recovery_rows = Vec::new();
        let mut recovery_stays = 0;
        for group in recovery_groups {
            if !is_clean_start(&group.rows) {
                continue;
            }
            if let Some(last) = group.rows.iter().rposition(|&i| labels[i] == 2) {
                recovery_rows.extend_from_slice(&group.rows[..=last]);
                recovery_stays += 1;
            }
        }

        // Deterioration: stays showing 0, 1 and 3, with class 2 rows removed
        let mut deterioration_rows = Vec::new();
        let mut deterioration_stays = 0;
        for group in groups
            .iter()
            .filter(|g| g.label_mask & DETERIORATION_MASK == DETERIORATION_MASK)
        {
            let kept: Vec<usize> = group
                .rows
                .iter()
                .copied()
                .filter(|&i| labels[i] != 2)
                .collect();
            let tail_start = kept.len().saturating_sub(TAIL_LEN);
            if is_clean_start(&kept) && kept[tail_start..].iter().all(|&i| labels[i] == 3) {
                deterioration_rows.extend(kept);
                deterioration_stays += 1;
            } else {
                debug!("Stay {} is not a deterioration trajectory", group.key);
            }
        }
        deterioration_rows.sort_unstable();

        let mut rows = recovery_rows;
        rows.extend(deterioration_rows);
        let filtered = frame.take(&rows);

        let summary = CohortSummary {
            input_rows: frame.n_rows(),
            recovery_stays,
            deterioration_stays,
            output_rows: filtered.n_rows(),
        };
        info!(
            "Cohort filter kept {} recovery and {} deterioration stays ({} of {} rows)",
            summary.recovery_stays, summary.deterioration_stays, summary.output_rows, summary.input_rows
        );

        Ok((filtered, summary))
    }

    fn group_stays(&self, frame: &Frame, labels: &[u8]) -> Result<Vec<StayGroup>> {
        let stays = frame.keys(self.mode.stay_id())?;

        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<StayGroup> = Vec::new();
        for (row, stay) in stays.iter().enumerate() {
            let slot = *index.entry(stay.as_str()).or_insert_with(|| {
                groups.push(StayGroup {
                    key: stay.clone(),
                    rows: Vec::new(),
                    label_mask: 0,
                });
                groups.len() - 1
            });
            groups[slot].rows.push(row);
            groups[slot].label_mask |= 1 << labels[row];
        }

        if let Some(column) = &self.time_column {
            let times = frame.numeric(column)?;
            for group in &mut groups {
                group.rows.sort_by(|&a, &b| times[a].total_cmp(&times[b]));
            }
        }

        Ok(groups)
    }
}

/// Identifier ordering: numeric when both keys parse, lexical otherwise
fn compare_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y),
        _ => a.cmp(b),
    }
}
