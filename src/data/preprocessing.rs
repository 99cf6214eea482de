use crate::data::{class_counts, Frame, CLASSES, NUM_CLASSES};
use crate::error::PrepError;
use crate::utils::random::seeded_rng;
use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Fitted per-column bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerBounds {
    pub columns: Vec<String>,
    pub mins: Vec<f64>,
    pub maxs: Vec<f64>,
}

impl ScalerBounds {
    /// Column minima and maxima over a frame
    pub fn compute(frame: &Frame, columns: &[String]) -> Result<Self> {
        if frame.is_empty() {
            return Err(PrepError::EmptyPartition("scaler fit".to_string()).into());
        }

        let mut mins = Vec::with_capacity(columns.len());
        let mut maxs = Vec::with_capacity(columns.len());
        for name in columns {
            let values = frame.numeric(name)?;
            let (lo, hi) = values
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            mins.push(lo);
            maxs.push(hi);
        }

        Ok(Self {
            columns: columns.to_vec(),
            mins,
            maxs,
        })
    }

    /// Scale one value of column `i`; a zero range counts as 1
    pub fn scale(&self, i: usize, value: f64) -> f64 {
        let range = self.maxs[i] - self.mins[i];
        let range = if range == 0.0 { 1.0 } else { range };
        (value - self.mins[i]) / range
    }
}

/// Min-max feature scaler
///
/// Fitted once, then reused unchanged for every frame it transforms.
#[derive(Debug, Clone, Default)]
pub struct MinMaxScaler {
    bounds: Option<ScalerBounds>,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit bounds on the given numeric columns
    pub fn fit(&mut self, frame: &Frame, columns: &[String]) -> Result<()> {
        info!(
            "Fitting min-max scaler on {} rows x {} columns",
            frame.n_rows(),
            columns.len()
        );
        self.bounds = Some(ScalerBounds::compute(frame, columns)?);
        Ok(())
    }

    /// Scale the fitted columns of `frame`, returning one row per frame row
    pub fn transform(&self, frame: &Frame, columns: &[String]) -> Result<Vec<Vec<f32>>> {
        let bounds = self.bounds.as_ref().ok_or(PrepError::ScalerNotFitted)?;
        if bounds.columns.as_slice() != columns {
            return Err(PrepError::ColumnMismatch {
                expected: bounds.columns.len(),
                actual: columns.len(),
            }
            .into());
        }

        let mut rows = vec![Vec::with_capacity(columns.len()); frame.n_rows()];
        for (i, name) in columns.iter().enumerate() {
            let values = frame.numeric(name)?;
            for (row, &value) in rows.iter_mut().zip(values) {
                row.push(bounds.scale(i, value) as f32);
            }
        }
        debug!("Scaled {} rows", rows.len());
        Ok(rows)
    }

    pub fn bounds(&self) -> Option<&ScalerBounds> {
        self.bounds.as_ref()
    }
}

/// Oversample every class up to the size of the largest one
///
/// The largest class (lowest label on ties) keeps its rows; each other class
/// is drawn with replacement from its own rows by an RNG seeded with `seed`.
/// Output is ordered by class. Returns the per-class counts after balancing.
pub fn balance_classes(frame: &Frame, seed: u64) -> Result<(Frame, [usize; NUM_CLASSES])> {
    let labels = frame.labels()?;
    let counts = class_counts(&labels);
    info!("Balancing training set: class counts {:?}", counts);

    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); NUM_CLASSES];
    for (row, &label) in labels.iter().enumerate() {
        by_class[label as usize].push(row);
    }

    for class in CLASSES {
        if by_class[class as usize].is_empty() {
            return Err(PrepError::MissingClass {
                partition: "train".to_string(),
                class,
            }
            .into());
        }
    }

    let mut dominant = 0;
    for class in 1..NUM_CLASSES {
        if counts[class] > counts[dominant] {
            dominant = class;
        }
    }
    let target = counts[dominant];

    let mut rows = Vec::with_capacity(target * NUM_CLASSES);
    for (class, members) in by_class.iter().enumerate() {
        if class == dominant {
            rows.extend_from_slice(members);
        } else {
            let mut rng = seeded_rng(seed);
            rows.extend((0..target).map(|_| members[rng.gen_range(0..members.len())]));
        }
    }

    let balanced = frame.take(&rows);
    let new_counts = [target; NUM_CLASSES];
    info!(
        "Balanced training set: {} rows ({} per class)",
        balanced.n_rows(),
        target
    );
    Ok((balanced, new_counts))
}
