//! Housing random forest trainer CLI
//!
//! Runs the training pipeline once and prints the run summary as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use housing_core::config::{ConfigStore, DEFAULT_DATA_CONFIG, DEFAULT_MODEL_CONFIG};
use housing_registry::open_from_env;
use housing_trainer::{
    CsvDatasetProvider, DatasetProvider, SyntheticHousingProvider, TrainingOrchestrator,
    DATASET_ENV,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "housing-train")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and register the housing random forest", long_about = None)]
struct Args {
    /// Data contract (split, features, target)
    #[arg(long, default_value = DEFAULT_DATA_CONFIG)]
    data_config: PathBuf,

    /// Model contract (hyperparameters, registered model name)
    #[arg(long, default_value = DEFAULT_MODEL_CONFIG)]
    model_config: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) -> Result<()> {
    let fallback = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {e}"))
}

fn dataset_provider(target: &str) -> Box<dyn DatasetProvider> {
    match std::env::var(DATASET_ENV) {
        Ok(path) if !path.trim().is_empty() => Box::new(CsvDatasetProvider::new(path, target)),
        _ => Box::new(SyntheticHousingProvider::default()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    info!("Housing Random Forest Trainer v{}", housing_trainer::VERSION);
    info!("═══════════════════════════════════════════");

    let store = ConfigStore::new(&args.data_config, &args.model_config);
    let target = store
        .load_data()
        .with_context(|| format!("Failed to load {}", args.data_config.display()))?
        .target_feature;

    let provider = dataset_provider(&target);
    let tracking = open_from_env().context("Failed to open tracking backend")?;

    let summary = TrainingOrchestrator::new(&store, provider.as_ref(), tracking.as_ref())
        .run()
        .context("Training run failed")?;

    info!("═══════════════════════════════════════════");
    info!("✓ Training completed successfully");
    info!("  Model: {}", summary.model_uri);
    info!("  RMSE: {:.4}", summary.rmse);
    info!("  Hash: {}", summary.model_hash);

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
