//! Data and model contracts for the housing training pipeline
//!
//! Everything a training run and a registry consumer must agree on lives
//! here, so both sides compile against the same definitions.
//!
//! Modules:
//! - `config`: YAML data/model contracts loaded through [`ConfigStore`]
//! - `dataset`: typed tabular data, CSV loading, deterministic splitting
//! - `schema`: the schema gate ([`SchemaValidator`])
//! - `features`: the log1p income transform ([`FeatureTransformer`])
//! - `forest`: random forest artifact and the [`Predictor`] trait
//! - `deterministic`: seeded LCG, seed mixing, split tie-breaking
//! - `serde_canon`: canonical JSON and BLAKE3 hashing
//! - `errors`: error types per concern

pub mod config;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod features;
pub mod forest;
pub mod schema;
pub mod serde_canon;

pub use config::{
    ConfigSnapshot, ConfigStore, DatasetConfig, HyperParams, ModelConfig, ParamValue,
    PipelineConfig, SplitConfig,
};
pub use dataset::{
    test_row_count, train_test_split, Column, ColumnType, ColumnValues, TabularDataset,
    TrainTestSplit,
};
pub use errors::{ConfigError, DatasetError, ModelError, SchemaError, TransformError};
pub use features::{FeatureTransformer, INCOME_COLUMN, INCOME_LOG_COLUMN};
pub use forest::{ForestModel, Node, Predictor, Tree, MODEL_FORMAT_VERSION};
pub use schema::{ContractCheckError, SchemaContract, SchemaValidator};

/// Crate version string, recorded alongside trained models
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
