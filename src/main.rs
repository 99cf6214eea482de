use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use icu_tabular::cli::{parse_args, setup_logging, Commands, InspectArgs, PrepareArgs};
use icu_tabular::data::schema::ColumnRoles;
use icu_tabular::{FrameLoader, TableDataset};
use tracing::{error, info};

fn main() {
    let cli = parse_args();

    setup_logging(cli.verbose);

    info!("{}", icu_tabular::info());

    let result = match cli.command {
        Commands::Prepare(args) => run_prepare(args),
        Commands::Inspect(args) => run_inspect(args),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_prepare(args: PrepareArgs) -> Result<()> {
    let config = args.to_config()?;
    info!("Input file: {:?}", config.data_path);

    let dataset = TableDataset::new(&config)
        .with_context(|| format!("Failed to prepare dataset from {:?}", config.data_path))?;

    info!("\n=== Dataset ===");
    info!("Split mode: {:?}", config.split_mode);
    info!("Rows: {}", dataset.len());
    info!("Numeric features: {}", dataset.roles().numeric.len());
    info!("Categorical features: {}", dataset.roles().categorical.len());
    if let Some(cohort) = dataset.cohort() {
        info!(
            "Cohort: {} recovery stays, {} deterioration stays",
            cohort.recovery_stays, cohort.deterioration_stays
        );
    }
    if let Some(counts) = dataset.balanced_counts() {
        info!("Balanced class counts: {:?}", counts);
    }

    if let Some(output) = args.output {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            icu_tabular::utils::ensure_dir(parent)?;
        }
        let report = serde_json::to_string_pretty(dataset.report())?;
        std::fs::write(&output, report)
            .with_context(|| format!("Failed to write report to {:?}", output))?;
        info!("Split report saved to: {:?}", output);
    }

    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let frame = FrameLoader::new()
        .load(&args.input)
        .with_context(|| format!("Failed to load data from {:?}", args.input))?;

    let roles = ColumnRoles::infer(&frame, args.dataset)?;

    info!("\n=== Column Roles ({}) ===", args.dataset);
    info!("Numeric ({}): {:?}", roles.numeric.len(), roles.numeric);
    info!("Categorical ({}): {:?}", roles.categorical.len(), roles.categorical);

    Ok(())
}
