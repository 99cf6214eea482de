//! # icu-tabular: ICU tabular data preparation
//!
//! Prepares stay-level ICU vitals/labs tables for a downstream classifier of
//! circulatory states (classes 0-3).
//!
//! ## Features
//!
//! - Gzip-compressed CSV loading with missing/infinite value sanitizing
//! - Recovery/deterioration trajectory cohort filtering
//! - Patient-level train/test split search under a class-ratio tolerance
//! - Minority class oversampling and min-max feature scaling
//! - A Burn `Dataset` and `Batcher` serving (numeric, categorical, label) rows
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use burn::data::dataset::Dataset;
//! use icu_tabular::data::{DatasetConfig, DatasetMode, SplitMode};
//! use icu_tabular::TableDataset;
//!
//! let config = DatasetConfig::new("mimic.csv.gz", DatasetMode::Mimic)
//!     .with_split_mode(SplitMode::Train)
//!     .with_seed(42)
//!     .with_augmentation(true);
//!
//! let dataset = TableDataset::new(&config).unwrap();
//! let item = dataset.get(0).unwrap();
//! println!("{} numeric features, label {}", item.numeric.len(), item.label);
//! ```

pub mod cli;
pub mod data;
pub mod error;
pub mod utils;

use burn_ndarray::NdArray;

/// Default backend type
pub type DefaultBackend = NdArray<f32>;

/// Re-export commonly used types
pub use data::dataset::{TableBatch, TableBatcher, TableDataset, TableItem};
pub use data::loader::FrameLoader;
pub use data::split::{BalancedSplitter, SplitReport};
pub use data::{DatasetConfig, DatasetMode, Frame, SplitConfig, SplitMode};
pub use error::PrepError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!(
        "{} v{} - ICU tabular data preparation",
        NAME, VERSION
    )
}
