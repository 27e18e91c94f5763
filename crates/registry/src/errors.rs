//! Error types for experiment tracking and the model registry

use housing_core::ModelError;
use thiserror::Error;

/// Errors that can occur while tracking runs or resolving registered models
#[derive(Error, Debug)]
pub enum TrackingError {
    /// No run with this id exists
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// The run has already ended and cannot accept more data
    #[error("Run {run_id} is not active (status: {status})")]
    RunNotActive { run_id: String, status: String },

    /// Model version not found
    #[error("Model not found: {name} version {version}")]
    ModelNotFound { name: String, version: String },

    /// A version number was claimed by another run before commit
    #[error("Version {version} of model {name} already exists")]
    VersionConflict { name: String, version: String },

    /// Malformed `models:/<name>/<version>` URI
    #[error("Invalid model URI: {0}")]
    InvalidModelUri(String),

    /// Unsupported or malformed tracking URI
    #[error("Invalid tracking URI: {0}")]
    InvalidTrackingUri(String),

    /// Invalid registered model name
    #[error("Invalid model name: {0}")]
    InvalidModelName(String),

    /// Artifact path escapes the run's artifact root or is empty
    #[error("Invalid artifact path: {0}")]
    InvalidArtifactPath(String),

    /// Artifact not found in a committed run
    #[error("Artifact not found: {run_id}/{path}")]
    ArtifactNotFound { run_id: String, path: String },

    /// Stored model failed to load or validate
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Failure injected by a test double
    #[error("Injected failure: {0}")]
    Injected(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for tracking operations
pub type Result<T> = std::result::Result<T, TrackingError>;
