//! Schema gate between the data source, the feature transform and the model
//!
//! Validation is a pure check: it never alters the dataset, and it reports
//! the first violated contract as a typed [`SchemaError`].

use crate::config::{ConfigStore, DatasetConfig};
use crate::dataset::TabularDataset;
use crate::errors::{ConfigError, SchemaError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Columns and typing a dataset must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaContract {
    /// Required feature columns, in declared order
    pub required_columns: Vec<String>,
    pub target_column: String,
}

impl SchemaContract {
    pub fn new(required_columns: Vec<String>, target_column: impl Into<String>) -> Self {
        Self {
            required_columns,
            target_column: target_column.into(),
        }
    }

    pub fn from_config(config: &DatasetConfig) -> Self {
        Self::new(config.features.clone(), config.target_feature.clone())
    }

    /// Columns that must hold numeric values. Every required feature does.
    pub fn numeric_types_required(&self) -> &[String] {
        &self.required_columns
    }
}

/// Failure of [`SchemaValidator::validate_against_config`]
#[derive(Error, Debug)]
pub enum ContractCheckError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Stateless dataset checker
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    /// Check `dataset` against `contract`.
    ///
    /// 1. every required column is present, otherwise `MissingColumns` with
    ///    the missing names in declared order
    /// 2. unless `is_target_check` is set, the target column is present
    /// 3. every required column is numeric (integer or float)
    ///
    /// `is_target_check` marks a features-only table whose target travels
    /// separately.
    pub fn validate(
        dataset: &TabularDataset,
        contract: &SchemaContract,
        is_target_check: bool,
    ) -> Result<(), SchemaError> {
        let missing: Vec<String> = contract
            .required_columns
            .iter()
            .filter(|name| !dataset.has_column(name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns(missing));
        }

        if !is_target_check && !dataset.has_column(&contract.target_column) {
            return Err(SchemaError::MissingTarget(contract.target_column.clone()));
        }

        for name in contract.numeric_types_required() {
            if let Some(found) = dataset.column_type(name) {
                if !found.is_numeric() {
                    return Err(SchemaError::WrongType {
                        column: name.clone(),
                        found,
                    });
                }
            }
        }

        debug!(
            "Schema check passed: {} rows, {} required columns",
            dataset.len(),
            contract.required_columns.len()
        );
        Ok(())
    }

    /// Re-read the data contract from `store` and validate against it.
    pub fn validate_against_config(
        store: &ConfigStore,
        dataset: &TabularDataset,
        is_target_check: bool,
    ) -> Result<(), ContractCheckError> {
        let contract = SchemaContract::from_config(&store.load_data()?);
        Self::validate(dataset, &contract, is_target_check)?;
        Ok(())
    }
}
