use crate::data::{DatasetConfig, DatasetMode, SplitMode};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// icu-tabular: cohort selection and balanced splitting for ICU tabular data
#[derive(Parser, Debug)]
#[command(name = "icu-tabular")]
#[command(about = "Cohort selection and balanced splitting for ICU tabular data")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a dataset and report the split
    Prepare(PrepareArgs),

    /// Show the inferred column roles of a file
    Inspect(InspectArgs),
}

/// Dataset preparation arguments
#[derive(Parser, Debug)]
pub struct PrepareArgs {
    /// Input data file (gzip-compressed CSV)
    #[arg(short, long, required_unless_present = "config")]
    pub input: Option<PathBuf>,

    /// JSON dataset configuration; command-line flags override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Identifier naming convention [default: mimic]
    #[arg(short, long, value_enum)]
    pub dataset: Option<DatasetMode>,

    /// Partition to serve [default: train]
    #[arg(short, long, value_enum)]
    pub split: Option<SplitMode>,

    /// Random seed for the split search
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fraction of patients in the training partition
    #[arg(long)]
    pub train_ratio: Option<f64>,

    /// Class ratio tolerance
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Maximum number of split trials
    #[arg(long)]
    pub n_trial: Option<usize>,

    /// Oversample minority classes in the training partition
    #[arg(long)]
    pub augment: bool,

    /// Keep only recovery and deterioration trajectories
    #[arg(long)]
    pub cohort_filter: bool,

    /// Column ordering rows within a stay
    #[arg(long)]
    pub time_column: Option<String>,

    /// Reference file for eICU scaling
    #[arg(short, long)]
    pub reference: Option<PathBuf>,

    /// Write the split report as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl PrepareArgs {
    /// Resolve the dataset configuration from the config file and flags
    pub fn to_config(&self) -> Result<DatasetConfig> {
        let mut config = match (&self.config, &self.input) {
            (Some(path), _) => DatasetConfig::from_json_file(path)?,
            (None, Some(input)) => {
                DatasetConfig::new(input, self.dataset.unwrap_or(DatasetMode::Mimic))
            }
            (None, None) => bail!("Either --input or --config is required"),
        };

        if let Some(input) = &self.input {
            config.data_path = input.clone();
        }
        if let Some(dataset) = self.dataset {
            config.dataset_mode = dataset;
        }
        if let Some(split) = self.split {
            config.split_mode = split;
        }
        if let Some(seed) = self.seed {
            config.split.seed = seed;
        }
        if let Some(train_ratio) = self.train_ratio {
            config.split.train_ratio = train_ratio;
        }
        if let Some(threshold) = self.threshold {
            config.split.threshold = threshold;
        }
        if let Some(n_trial) = self.n_trial {
            config.split.n_trial = n_trial;
        }
        if self.augment {
            config.augmentation = true;
        }
        if self.cohort_filter {
            config.visualization = true;
        }
        if self.time_column.is_some() {
            config.time_column = self.time_column.clone();
        }
        if self.reference.is_some() {
            config.reference_path = self.reference.clone();
        }

        Ok(config)
    }
}

/// Schema inspection arguments
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Input data file
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Identifier naming convention
    #[arg(short, long, value_enum, default_value = "mimic")]
    pub dataset: DatasetMode,
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Setup logging based on verbosity
pub fn setup_logging(verbose: bool) {
    let filter = if verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
