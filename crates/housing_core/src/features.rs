//! Feature engineering
//!
//! One stateless transform: the skewed income column is replaced by its
//! `ln(v + 1)`, stored under a new name at the end of the column order.

use crate::dataset::{Column, TabularDataset};
use crate::errors::TransformError;
use crate::schema::SchemaContract;
use tracing::debug;

/// Raw income column
pub const INCOME_COLUMN: &str = "MedInc";

/// Log-transformed income column
pub const INCOME_LOG_COLUMN: &str = "MedInc_log";

/// log1p transform of one column with rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureTransformer {
    source: String,
    derived: String,
}

impl Default for FeatureTransformer {
    fn default() -> Self {
        Self::new(INCOME_COLUMN, INCOME_LOG_COLUMN)
    }
}

impl FeatureTransformer {
    pub fn new(source: impl Into<String>, derived: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            derived: derived.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn derived(&self) -> &str {
        &self.derived
    }

    /// Return a transformed copy of `dataset`; the input is left untouched.
    ///
    /// Fails if the source column is missing or not numeric, if the derived
    /// column already exists, or if any value has no finite `ln(v + 1)`
    /// (v <= -1, NaN, infinity).
    pub fn transform(&self, dataset: &TabularDataset) -> Result<TabularDataset, TransformError> {
        let column = dataset
            .column(&self.source)
            .ok_or_else(|| TransformError::MissingSource(self.source.clone()))?;

        if dataset.has_column(&self.derived) {
            return Err(TransformError::DerivedExists(self.derived.clone()));
        }

        let raw = column
            .values
            .to_f64()
            .ok_or_else(|| TransformError::NonNumericSource {
                column: self.source.clone(),
                found: column.column_type(),
            })?;

        let mut logged = Vec::with_capacity(raw.len());
        for (row, value) in raw.into_iter().enumerate() {
            let out = value.ln_1p();
            if !out.is_finite() {
                return Err(TransformError::OutOfDomain {
                    column: self.source.clone(),
                    row,
                    value,
                });
            }
            logged.push(out);
        }

        let transformed = dataset
            .clone()
            .without_column(&self.source)
            .and_then(|d| d.with_column(Column::float(self.derived.clone(), logged)))
            .map_err(|e| TransformError::Dataset(e.to_string()))?;

        debug!(
            "Transformed {} -> {} over {} rows",
            self.source,
            self.derived,
            transformed.len()
        );
        Ok(transformed)
    }

    /// Feature names after the transform: source removed, derived appended
    pub fn output_features(&self, features: &[String]) -> Vec<String> {
        features
            .iter()
            .filter(|name| **name != self.source)
            .cloned()
            .chain(std::iter::once(self.derived.clone()))
            .collect()
    }

    /// Contract a transformed dataset must satisfy
    pub fn output_contract(&self, contract: &SchemaContract) -> SchemaContract {
        SchemaContract::new(
            self.output_features(&contract.required_columns),
            contract.target_column.clone(),
        )
    }
}
