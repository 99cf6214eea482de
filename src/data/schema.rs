//! Column role inference
//!
//! A column is categorical when it holds exactly two distinct values and
//! numeric otherwise. Identifier, label and annotation columns are then
//! removed from the feature sets for the active dataset mode.

use crate::data::{DatasetMode, Frame};
use crate::error::PrepError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Feature columns by role, in frame order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRoles {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
}

impl ColumnRoles {
    /// Infer roles from the raw frame and validate them for `mode`
    pub fn infer(frame: &Frame, mode: DatasetMode) -> Result<Self> {
        for required in mode.required_columns() {
            if !frame.has_column(required) {
                return Err(PrepError::MissingColumn(required.to_string()).into());
            }
        }

        let numeric_excluded = mode.numeric_exclusions();
        let categorical_excluded = mode.categorical_exclusions();

        let mut numeric = Vec::new();
        let mut categorical = Vec::new();

        for column in frame.columns() {
            let name = column.name.as_str();
            let n_unique = column.n_unique();
            if n_unique == 2 {
                if categorical_excluded.contains(&name) {
                    continue;
                }
                if !column.is_numeric() {
                    return Err(PrepError::NonNumericFeature(name.to_string()).into());
                }
                categorical.push(name.to_string());
            } else {
                if numeric_excluded.contains(&name) {
                    continue;
                }
                if !column.is_numeric() {
                    return Err(PrepError::NonNumericFeature(name.to_string()).into());
                }
                numeric.push(name.to_string());
            }
            debug!("Column {} has {} distinct values", name, n_unique);
        }

        info!(
            "Inferred {} numeric and {} categorical feature columns",
            numeric.len(),
            categorical.len()
        );

        Ok(Self { numeric, categorical })
    }

    /// Check that every expected column ended up as a feature
    pub fn validate_expected(&self, expected: &[String]) -> Result<()> {
        for name in expected {
            if !self.numeric.contains(name) && !self.categorical.contains(name) {
                return Err(PrepError::MissingColumn(name.clone()).into());
            }
        }
        Ok(())
    }
}
