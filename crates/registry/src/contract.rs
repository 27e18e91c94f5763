//! Input/output contract check for the latest registered model
//!
//! The check resolves the numerically largest version of a model, loads it,
//! feeds it one row laid out exactly as the model was trained, and asserts
//! the output is one finite number per input row. Every failure, including
//! registry and prediction errors, is reported as a [`ContractViolation`].

use crate::errors::TrackingError;
use crate::tracking::{ModelVersionRecord, TrackingClient};
use housing_core::{Column, ColumnType, ColumnValues, ModelError, TabularDataset};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

/// A broken model contract
#[derive(Error, Debug)]
pub enum ContractViolation {
    #[error("no model named '{name}' is registered")]
    NoModelFound { name: String },

    #[error("registry lookup for '{name}' failed: {source}")]
    RegistryLookup {
        name: String,
        #[source]
        source: TrackingError,
    },

    #[error("model '{name}' has non-numeric version '{version}'")]
    InvalidVersion { name: String, version: String },

    #[error("failed to load model from '{uri}': {source}")]
    LoadFailure {
        uri: String,
        #[source]
        source: TrackingError,
    },

    #[error("prediction with model '{uri}' failed: {source}")]
    PredictionFailure {
        uri: String,
        #[source]
        source: ModelError,
    },

    #[error("expected {expected} predictions, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("prediction output is {found}, expected a numeric sequence")]
    NonNumericOutput { found: ColumnType },

    #[error("prediction {index} is not finite: {value}")]
    NonFiniteOutput { index: usize, value: f64 },
}

/// One input row laid out in the post-transform feature order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractSample {
    pub feature_names: Vec<String>,
    pub row: Vec<f64>,
}

impl ContractSample {
    /// Training-time feature order of the housing model: the raw features
    /// without `MedInc`, followed by the derived `MedInc_log`.
    pub fn california_housing() -> Self {
        let names = [
            "HouseAge",
            "AveRooms",
            "AveBedrms",
            "Population",
            "AveOccup",
            "Latitude",
            "Longitude",
            "MedInc_log",
        ];
        Self {
            feature_names: names.iter().map(|s| s.to_string()).collect(),
            row: vec![41.0, 6.9841, 1.0238, 322.0, 2.5555, 37.88, -122.23, 2.2327],
        }
    }

    /// Single-row table of the sample
    pub fn to_dataset(&self) -> Result<TabularDataset, ModelError> {
        if self.feature_names.len() != self.row.len() {
            return Err(ModelError::ValidationFailed(format!(
                "sample has {} names but {} values",
                self.feature_names.len(),
                self.row.len()
            )));
        }

        let columns = self
            .feature_names
            .iter()
            .zip(&self.row)
            .map(|(name, value)| Column::float(name.clone(), vec![*value]))
            .collect();
        TabularDataset::new(columns).map_err(|e| ModelError::ValidationFailed(e.to_string()))
    }
}

/// Outcome of a passed contract check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractReport {
    pub model_name: String,
    pub version: String,
    pub uri: String,
    pub predictions: Vec<f64>,
}

/// Pick the version with the numerically largest version number.
///
/// Versions are strings; "10" beats "2".
pub fn latest_version<'a>(
    name: &str,
    versions: &'a [ModelVersionRecord],
) -> Result<&'a ModelVersionRecord, ContractViolation> {
    let mut latest: Option<(u64, &ModelVersionRecord)> = None;
    for record in versions {
        let number = record
            .version_number()
            .ok_or_else(|| ContractViolation::InvalidVersion {
                name: name.to_string(),
                version: record.version.clone(),
            })?;
        if latest.map_or(true, |(best, _)| number > best) {
            latest = Some((number, record));
        }
    }

    latest
        .map(|(_, record)| record)
        .ok_or_else(|| ContractViolation::NoModelFound {
            name: name.to_string(),
        })
}

/// Read-only registry consumer that verifies the model contract
pub struct ContractTester<'a> {
    tracking: &'a dyn TrackingClient,
    sample: ContractSample,
}

impl<'a> ContractTester<'a> {
    pub fn new(tracking: &'a dyn TrackingClient) -> Self {
        Self::with_sample(tracking, ContractSample::california_housing())
    }

    pub fn with_sample(tracking: &'a dyn TrackingClient, sample: ContractSample) -> Self {
        Self { tracking, sample }
    }

    pub fn sample(&self) -> &ContractSample {
        &self.sample
    }

    #[instrument(skip(self))]
    pub fn check(&self, model_name: &str) -> Result<ContractReport, ContractViolation> {
        let versions = self
            .tracking
            .search_versions(model_name)
            .map_err(|source| ContractViolation::RegistryLookup {
                name: model_name.to_string(),
                source,
            })?;

        let latest = latest_version(model_name, &versions)?;
        info!("Model found: {}", latest.uri);

        let model = self
            .tracking
            .load_model(&latest.uri)
            .map_err(|source| ContractViolation::LoadFailure {
                uri: latest.uri.clone(),
                source,
            })?;
        info!("Model {} loaded", latest.uri);

        let prediction_failure = |source: ModelError| ContractViolation::PredictionFailure {
            uri: latest.uri.clone(),
            source,
        };
        let input = self.sample.to_dataset().map_err(prediction_failure)?;
        let output = model.predict(&input).map_err(prediction_failure)?;

        let predictions = match output {
            ColumnValues::Float(values) => values,
            ColumnValues::Integer(values) => values.into_iter().map(|v| v as f64).collect(),
            ColumnValues::Text(_) => {
                return Err(ContractViolation::NonNumericOutput {
                    found: ColumnType::Text,
                })
            }
        };

        if predictions.len() != input.len() {
            return Err(ContractViolation::ShapeMismatch {
                expected: input.len(),
                actual: predictions.len(),
            });
        }

        if let Some((index, value)) = predictions
            .iter()
            .enumerate()
            .find(|(_, value)| !value.is_finite())
        {
            return Err(ContractViolation::NonFiniteOutput {
                index,
                value: *value,
            });
        }

        info!("Model input/output contract holds for {}", latest.uri);
        Ok(ContractReport {
            model_name: model_name.to_string(),
            version: latest.version.clone(),
            uri: latest.uri.clone(),
            predictions,
        })
    }
}
