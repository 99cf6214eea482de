use thiserror::Error;

/// Data preparation errors
///
/// These surface through `anyhow::Result` at the application layer and can be
/// recovered with `downcast_ref::<PrepError>()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrepError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("feature column `{0}` is not numeric")]
    NonNumericFeature(String),

    #[error("class {class} is absent from the {partition} partition")]
    MissingClass { partition: String, class: u8 },

    #[error("the {0} partition is empty")]
    EmptyPartition(String),

    #[error("invalid class label {value} at row {row} (expected 0..=3)")]
    InvalidLabel { row: usize, value: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("scaler must be fitted before transform")]
    ScalerNotFitted,

    #[error("column mismatch: scaler fitted on {expected} columns, got {actual}")]
    ColumnMismatch { expected: usize, actual: usize },
}
