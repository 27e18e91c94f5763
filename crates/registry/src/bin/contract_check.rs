//! Registered model contract check
//!
//! Resolves the latest version of the model named in the model config and
//! verifies its input/output contract. Exits non-zero on any violation.

use anyhow::{Context, Result};
use clap::Parser;
use housing_core::config::{ConfigStore, DEFAULT_DATA_CONFIG, DEFAULT_MODEL_CONFIG};
use housing_registry::{open_from_env, ContractTester};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "contract-check")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify the input/output contract of the latest registered model", long_about = None)]
struct Args {
    /// Model config naming the registered model
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

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    info!("Housing model contract check v{}", housing_registry::VERSION);

    let model_config = ConfigStore::new(DEFAULT_DATA_CONFIG, &args.model_config)
        .load_model()
        .with_context(|| format!("Failed to load {}", args.model_config.display()))?;
    let tracking = open_from_env().context("Failed to open tracking backend")?;

    let tester = ContractTester::new(tracking.as_ref());
    match tester.check(&model_config.registered_model_name) {
        Ok(report) => {
            info!("✓ Contract holds for {}", report.uri);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(violation) => {
            error!("✗ Contract violated: {}", violation);
            Err(violation.into())
        }
    }
}
