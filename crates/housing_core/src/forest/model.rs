//! Random forest model artifact
//!
//! The model carries its input schema (ordered feature names) and the
//! hyperparameters it was trained with. It is serialized as canonical JSON
//! and identified by the BLAKE3 hash of that JSON.

use super::tree::Tree;
use crate::dataset::{ColumnValues, TabularDataset};
use crate::errors::ModelError;
use crate::serde_canon::{hash_canonical_hex, to_canonical_json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Current artifact format version
pub const MODEL_FORMAT_VERSION: i32 = 1;

/// Anything that turns a feature table into predictions.
///
/// Output is returned as a typed column so consumers can assert the output
/// contract (homogeneous, numeric, one value per input row).
pub trait Predictor: Send + Sync {
    /// Ordered feature names the model was trained on
    fn input_schema(&self) -> &[String];

    fn predict(&self, input: &TabularDataset) -> Result<ColumnValues, ModelError>;
}

/// Averaging ensemble of regression trees
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForestModel {
    /// Artifact format version
    pub version: i32,

    /// Input schema: feature names in training order
    pub feature_names: Vec<String>,

    /// Regression trees, predictions are averaged
    pub trees: Vec<Tree>,

    /// Hyperparameters used to train the model, string encoded
    pub params: BTreeMap<String, String>,
}

impl ForestModel {
    pub fn new(feature_names: Vec<String>, trees: Vec<Tree>, params: BTreeMap<String, String>) -> Self {
        Self {
            version: MODEL_FORMAT_VERSION,
            feature_names,
            trees,
            params,
        }
    }

    /// Validate model structure
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.version != MODEL_FORMAT_VERSION {
            return Err(ModelError::ValidationFailed(format!(
                "unsupported model version: {}",
                self.version
            )));
        }

        if self.feature_names.is_empty() {
            return Err(ModelError::ValidationFailed(
                "model has an empty input schema".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.feature_names.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(ModelError::ValidationFailed(format!(
                "duplicate feature name in input schema: {dup}"
            )));
        }

        if self.trees.is_empty() {
            return Err(ModelError::ValidationFailed("model has no trees".to_string()));
        }

        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_names.len()).map_err(|e| {
                ModelError::ValidationFailed(format!("tree {i} validation failed: {e}"))
            })?;
        }

        Ok(())
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean of the tree outputs for one feature vector in schema order
    pub fn predict_row(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.evaluate(features)).sum();
        sum / self.trees.len() as f64
    }

    /// Predict every row of a feature table.
    ///
    /// The table's columns must equal the input schema, names and order.
    pub fn predict_values(&self, input: &TabularDataset) -> Result<Vec<f64>, ModelError> {
        let actual = input.column_names();
        if actual != self.feature_names {
            return Err(ModelError::FeatureMismatch {
                expected: self.feature_names.clone(),
                actual,
            });
        }

        if let Some(column) = input.columns().iter().find(|c| !c.column_type().is_numeric()) {
            return Err(ModelError::NonNumericInput {
                column: column.name.clone(),
                found: column.column_type(),
            });
        }

        let matrix = input
            .feature_matrix(&self.feature_names)
            .map_err(|e| ModelError::ValidationFailed(e.to_string()))?;

        Ok(matrix.iter().map(|row| self.predict_row(row)).collect())
    }

    /// Serialize model to canonical JSON (sorted keys, no whitespace)
    pub fn to_canonical_json(&self) -> Result<String, ModelError> {
        Ok(to_canonical_json(self)?)
    }

    /// BLAKE3 hash of the canonical JSON, hex encoded
    pub fn hash_hex(&self) -> Result<String, ModelError> {
        Ok(hash_canonical_hex(self)?)
    }

    /// Parse and validate a model from JSON
    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        let model: ForestModel = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    /// Save model to a JSON file with canonical serialization
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        fs::write(path, self.to_canonical_json()?)?;
        Ok(())
    }

    /// Load and validate a model from a JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

impl Predictor for ForestModel {
    fn input_schema(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, input: &TabularDataset) -> Result<ColumnValues, ModelError> {
        self.predict_values(input).map(ColumnValues::Float)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;
    use crate::forest::tree::Node;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn create_test_model() -> ForestModel {
        let tree1 = Tree::new(vec![
            Node::internal(0, 0, 50.0, 1, 2),
            Node::leaf(1, 1.0),
            Node::leaf(2, 2.0),
        ]);
        let tree2 = Tree::new(vec![
            Node::internal(0, 1, 1.5, 1, 2),
            Node::leaf(1, 3.0),
            Node::leaf(2, 5.0),
        ]);

        let mut params = BTreeMap::new();
        params.insert("n_estimators".to_string(), "2".to_string());
        ForestModel::new(names(&["HouseAge", "MedInc_log"]), vec![tree1, tree2], params)
    }

    #[test]
    fn test_model_creation() {
        let model = create_test_model();
        assert_eq!(model.version, MODEL_FORMAT_VERSION);
        assert_eq!(model.num_trees(), 2);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_predict_row_averages_trees() {
        let model = create_test_model();
        // tree1 -> 1.0, tree2 -> 5.0
        assert_eq!(model.predict_row(&[30.0, 2.0]), 3.0);
        // tree1 -> 2.0, tree2 -> 3.0
        assert_eq!(model.predict_row(&[60.0, 1.0]), 2.5);
    }

    #[test]
    fn test_predict_requires_exact_schema() {
        let model = create_test_model();

        let input = TabularDataset::new(vec![
            Column::integer("HouseAge", vec![30, 60]),
            Column::float("MedInc_log", vec![2.0, 1.0]),
        ])
        .unwrap();
        let output = model.predict(&input).unwrap();
        assert_eq!(output, ColumnValues::Float(vec![3.0, 2.5]));

        let reordered = input.select_columns(&names(&["MedInc_log", "HouseAge"])).unwrap();
        assert!(matches!(
            model.predict(&reordered),
            Err(ModelError::FeatureMismatch { .. })
        ));

        let raw = TabularDataset::new(vec![
            Column::integer("HouseAge", vec![30]),
            Column::float("MedInc", vec![8.0]),
        ])
        .unwrap();
        assert!(matches!(
            model.predict(&raw),
            Err(ModelError::FeatureMismatch { .. })
        ));
    }

    #[test]
    fn test_predict_rejects_text_input() {
        let model = create_test_model();
        let input = TabularDataset::new(vec![
            Column::integer("HouseAge", vec![30]),
            Column::text("MedInc_log", vec!["high".to_string()]),
        ])
        .unwrap();
        assert!(matches!(
            model.predict(&input),
            Err(ModelError::NonNumericInput { .. })
        ));
    }

    #[test]
    fn test_validation_failures() {
        let mut no_trees = create_test_model();
        no_trees.trees.clear();
        assert!(no_trees.validate().is_err());

        let mut duplicate = create_test_model();
        duplicate.feature_names = names(&["HouseAge", "HouseAge"]);
        assert!(duplicate.validate().is_err());

        let mut narrow = create_test_model();
        narrow.feature_names = names(&["HouseAge"]);
        assert!(narrow.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip_and_hash() {
        let model = create_test_model();
        let json = model.to_canonical_json().unwrap();
        assert!(!json.contains('\n'));

        let loaded = ForestModel::from_json_str(&json).unwrap();
        assert_eq!(loaded, model);
        assert_eq!(loaded.hash_hex().unwrap(), model.hash_hex().unwrap());

        let mut changed = model.clone();
        changed.trees[0].nodes[1].leaf = Some(1.5);
        assert_ne!(changed.hash_hex().unwrap(), model.hash_hex().unwrap());
    }

    #[test]
    fn test_saved_floats_reload_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        // Midpoints and means rarely have short decimal forms
        let awkward = [0.1 + 0.2, 1.0 / 3.0, -122.23 + 1e-13, 2.2250738585072014e-308];
        let trees = awkward
            .iter()
            .map(|&value| {
                Tree::new(vec![
                    Node::internal(0, 1, value, 1, 2),
                    Node::leaf(1, value / 7.0),
                    Node::leaf(2, value * 3.0),
                ])
            })
            .collect();
        let model = ForestModel::new(names(&["HouseAge", "MedInc_log"]), trees, BTreeMap::new());

        model.save_json(&path).unwrap();
        let loaded = ForestModel::load_json(&path).unwrap();

        for (saved, reloaded) in model.trees.iter().zip(&loaded.trees) {
            for (a, b) in saved.nodes.iter().zip(&reloaded.nodes) {
                assert_eq!(a.threshold.to_bits(), b.threshold.to_bits());
                assert_eq!(a.leaf.map(f64::to_bits), b.leaf.map(f64::to_bits));
            }
        }
        assert_eq!(loaded.hash_hex().unwrap(), model.hash_hex().unwrap());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let model = create_test_model();
        model.save_json(&path).unwrap();
        assert_eq!(ForestModel::load_json(&path).unwrap(), model);

        std::fs::write(&path, "{\"version\":2}").unwrap();
        assert!(ForestModel::load_json(&path).is_err());
    }
}
