//! Declarative pipeline configuration
//!
//! Two YAML files drive a run: the data contract (split parameters, the
//! ordered feature list and the target column) and the model contract
//! (hyperparameters and the registered model name). Both are parsed into
//! typed structs and checked once at load time; a missing file, a parse
//! failure or a missing key is a [`ConfigError`], never a silent default.

use crate::errors::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default location of the data contract
pub const DEFAULT_DATA_CONFIG: &str = "config/data/raw.yaml";

/// Default location of the model contract
pub const DEFAULT_MODEL_CONFIG: &str = "config/model/random_forest.yaml";

/// Train/test split parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of rows held out for evaluation, strictly between 0 and 1
    pub test_size: f64,
    /// Seed for the row permutation
    pub random_state: i64,
}

/// Data contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub split: SplitConfig,
    /// Expected feature columns, in order
    pub features: Vec<String>,
    pub target_feature: String,
}

impl DatasetConfig {
    fn check(&self) -> Result<(), String> {
        let test_size = self.split.test_size;
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(format!("split.test_size must be in (0, 1), got {test_size}"));
        }

        if self.features.is_empty() {
            return Err("features must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for feature in &self.features {
            if feature.trim().is_empty() {
                return Err("feature names must not be blank".to_string());
            }
            if !seen.insert(feature.as_str()) {
                return Err(format!("duplicate feature: {feature}"));
            }
        }

        if self.target_feature.trim().is_empty() {
            return Err("target_feature must not be blank".to_string());
        }
        if seen.contains(self.target_feature.as_str()) {
            return Err(format!(
                "target_feature '{}' is also listed as a feature",
                self.target_feature
            ));
        }

        Ok(())
    }
}

/// A single hyperparameter value as written in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl ParamValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v:?}"),
            ParamValue::Text(v) => f.write_str(v),
            ParamValue::Null => f.write_str("null"),
        }
    }
}

/// Hyperparameters keyed by name, kept in sorted order for stable logging
pub type HyperParams = BTreeMap<String, ParamValue>;

/// Model contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub params: HyperParams,
    pub registered_model_name: String,
    /// Experiment the run is filed under; defaults to the model name
    #[serde(default)]
    pub experiment_name: Option<String>,
}

impl ModelConfig {
    pub fn experiment(&self) -> &str {
        self.experiment_name
            .as_deref()
            .unwrap_or(&self.registered_model_name)
    }

    /// Hyperparameters rendered as strings, the form tracked alongside a run
    pub fn params_as_strings(&self) -> BTreeMap<String, String> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }

    fn check(&self) -> Result<(), String> {
        if self.registered_model_name.trim().is_empty() {
            return Err("registered_model_name must not be blank".to_string());
        }
        if self.registered_model_name.contains(['/', '\\']) {
            return Err(format!(
                "registered_model_name '{}' must not contain path separators",
                self.registered_model_name
            ));
        }
        Ok(())
    }
}

/// Raw text of a config file as it was when the run read it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub path: PathBuf,
    pub text: String,
}

impl ConfigSnapshot {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

/// Both contracts of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub data: DatasetConfig,
    pub model: ModelConfig,
    /// Data then model file, exactly as parsed
    pub snapshots: Vec<ConfigSnapshot>,
}

fn read_config_text(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

fn parse_yaml<T: DeserializeOwned>(path: &Path, content: &str) -> Result<T, ConfigError> {
    serde_yaml::from_str(content).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a YAML file into `T`, distinguishing missing, unreadable and
/// malformed files.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    parse_yaml(path, &read_config_text(path)?)
}

/// Location of the two configuration files.
///
/// Holds paths only; every `load_*` call re-reads the file so callers always
/// see the current configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    data_path: PathBuf,
    model_path: PathBuf,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_CONFIG, DEFAULT_MODEL_CONFIG)
    }
}

impl ConfigStore {
    pub fn new(data_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            model_path: model_path.into(),
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Load and check the data contract
    pub fn load_data(&self) -> Result<DatasetConfig, ConfigError> {
        self.read_data().map(|(config, _)| config)
    }

    /// Load and check the model contract
    pub fn load_model(&self) -> Result<ModelConfig, ConfigError> {
        self.read_model().map(|(config, _)| config)
    }

    fn read_data(&self) -> Result<(DatasetConfig, ConfigSnapshot), ConfigError> {
        debug!("Loading data config from {}", self.data_path.display());
        let snapshot = self.snapshot(&self.data_path)?;
        let config: DatasetConfig = parse_yaml(&self.data_path, &snapshot.text)?;
        config.check().map_err(|reason| ConfigError::Invalid {
            path: self.data_path.clone(),
            reason,
        })?;
        Ok((config, snapshot))
    }

    fn read_model(&self) -> Result<(ModelConfig, ConfigSnapshot), ConfigError> {
        debug!("Loading model config from {}", self.model_path.display());
        let snapshot = self.snapshot(&self.model_path)?;
        let config: ModelConfig = parse_yaml(&self.model_path, &snapshot.text)?;
        config.check().map_err(|reason| ConfigError::Invalid {
            path: self.model_path.clone(),
            reason,
        })?;
        Ok((config, snapshot))
    }

    fn snapshot(&self, path: &Path) -> Result<ConfigSnapshot, ConfigError> {
        Ok(ConfigSnapshot {
            path: path.to_path_buf(),
            text: read_config_text(path)?,
        })
    }

    /// Load both contracts, keeping the text each was parsed from
    pub fn load(&self) -> Result<PipelineConfig, ConfigError> {
        let (data, data_snapshot) = self.read_data()?;
        let (model, model_snapshot) = self.read_model()?;
        info!(
            "Configuration loaded: {} features, target '{}', model '{}'",
            data.features.len(),
            data.target_feature,
            model.registered_model_name
        );
        Ok(PipelineConfig {
            data,
            model,
            snapshots: vec![data_snapshot, model_snapshot],
        })
    }
}
