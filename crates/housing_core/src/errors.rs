//! Error types for the pipeline contracts

use crate::dataset::ColumnType;
use std::path::PathBuf;
use thiserror::Error;

/// Missing, unreadable, malformed or semantically invalid configuration.
///
/// Every variant carries the offending path so the caller can report it.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration in {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// Schema skew between a dataset and the declared contract
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("missing columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("target column '{0}' is missing")]
    MissingTarget(String),

    #[error("column '{column}' must be numeric, found {found}")]
    WrongType { column: String, found: ColumnType },
}

/// Errors raised while building, reading or partitioning a dataset
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset is empty")]
    Empty,

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("column '{column}' is not numeric ({found})")]
    NonNumeric { column: String, found: ColumnType },

    #[error("cannot concatenate datasets: {0}")]
    Incompatible(String),

    #[error("invalid split: {0}")]
    InvalidSplit(String),
}

/// Feature transform failures. The transform fails fast instead of emitting NaNs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("source column '{0}' is missing")]
    MissingSource(String),

    #[error("source column '{column}' must be numeric, found {found}")]
    NonNumericSource { column: String, found: ColumnType },

    #[error("derived column '{0}' already exists")]
    DerivedExists(String),

    #[error("value {value} in column '{column}' at row {row} has no finite log1p")]
    OutOfDomain { column: String, row: usize, value: f64 },

    #[error("dataset error: {0}")]
    Dataset(String),
}

/// Model artifact errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model validation failed: {0}")]
    ValidationFailed(String),

    #[error("input features {actual:?} do not match the model input schema {expected:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("input column '{column}' is not numeric ({found})")]
    NonNumericInput { column: String, found: ColumnType },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("canonical serialization error: {0}")]
    Canonical(#[from] crate::serde_canon::CanonicalError),
}
