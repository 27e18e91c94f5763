use housing_core::serde_canon::CanonicalError;
use housing_core::{ConfigError, DatasetError, ModelError, SchemaError, TransformError};
use housing_registry::TrackingError;
use std::fmt;
use thiserror::Error;

/// Errors returned by the random-forest estimator.
#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("unknown hyperparameter '{0}'")]
    UnknownParam(String),

    #[error("invalid value for hyperparameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("feature rows ({features}) and targets ({targets}) differ in length")]
    LengthMismatch { features: usize, targets: usize },

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("non-finite value in column '{column}' at row {row}")]
    NonFinite { column: String, row: usize },

    #[error("thread pool error: {0}")]
    ThreadPool(String),

    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

/// Pipeline state-machine stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadConfig,
    LoadData,
    Split,
    ValidateSchema,
    Transform,
    Fit,
    Evaluate,
    LogMetricsParams,
    LogArtifacts,
    RegisterModel,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::LoadConfig => "LOAD_CONFIG",
            Stage::LoadData => "LOAD_DATA",
            Stage::Split => "SPLIT",
            Stage::ValidateSchema => "VALIDATE_SCHEMA",
            Stage::Transform => "TRANSFORM",
            Stage::Fit => "FIT",
            Stage::Evaluate => "EVALUATE",
            Stage::LogMetricsParams => "LOG_METRICS_PARAMS",
            Stage::LogArtifacts => "LOG_ARTIFACTS",
            Stage::RegisterModel => "REGISTER_MODEL",
            Stage::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// A training run that aborted. Nothing is registered when this is returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("schema check failed at {stage}: {source}")]
    Schema {
        stage: Stage,
        #[source]
        source: SchemaError,
    },

    #[error("dataset error at {stage}: {source}")]
    Dataset {
        stage: Stage,
        #[source]
        source: DatasetError,
    },

    #[error("feature transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("estimator error at {stage}: {source}")]
    Estimator {
        stage: Stage,
        #[source]
        source: EstimatorError,
    },

    #[error("tracking error at {stage}: {source}")]
    Tracking {
        stage: Stage,
        #[source]
        source: TrackingError,
    },

    #[error("fingerprint failed: {0}")]
    Fingerprint(#[from] CanonicalError),
}

impl PipelineError {
    /// Stage in which the run failed
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Config(_) => Stage::LoadConfig,
            PipelineError::Transform(_) => Stage::Transform,
            PipelineError::Fingerprint(_) => Stage::LogMetricsParams,
            PipelineError::Schema { stage, .. }
            | PipelineError::Dataset { stage, .. }
            | PipelineError::Estimator { stage, .. }
            | PipelineError::Tracking { stage, .. } => *stage,
        }
    }

    pub(crate) fn tracking(stage: Stage) -> impl FnOnce(TrackingError) -> Self {
        move |source| PipelineError::Tracking { stage, source }
    }

    pub(crate) fn dataset(stage: Stage) -> impl FnOnce(DatasetError) -> Self {
        move |source| PipelineError::Dataset { stage, source }
    }

    pub(crate) fn schema(stage: Stage) -> impl FnOnce(SchemaError) -> Self {
        move |source| PipelineError::Schema { stage, source }
    }

    pub(crate) fn estimator(stage: Stage) -> impl FnOnce(EstimatorError) -> Self {
        move |source| PipelineError::Estimator { stage, source }
    }
}
