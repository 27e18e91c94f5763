//! Housing trainer - config-driven random forest training pipeline
//!
//! Fetches the housing data, splits and validates it, applies the income
//! transform, fits a deterministic random forest and registers it with the
//! tracking backend as one all-or-nothing run.

pub mod cart;
pub mod errors;
pub mod evaluation;
pub mod forest;
pub mod orchestrator;
pub mod provider;

pub use cart::{CartBuilder, TreeConfig};
pub use errors::{EstimatorError, PipelineError, Stage};
pub use evaluation::rmse;
pub use forest::{Estimator, MaxFeatures, RandomForestParams, RandomForestRegressor};
pub use orchestrator::{TrainingOrchestrator, TrainingSummary};
pub use provider::{
    CsvDatasetProvider, DatasetProvider, SyntheticHousingProvider, HOUSING_TARGET,
};

/// Environment variable pointing the trainer at a CSV dataset
pub const DATASET_ENV: &str = "HOUSING_DATASET";

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
