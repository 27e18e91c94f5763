//! Experiment tracking interface
//!
//! A [`TrackingClient`] records runs (params, metrics, tags, artifacts) and
//! versions registered models. Every call names its run through an explicit
//! [`RunHandle`]; there is no ambient "active run".
//!
//! Logging is staged: nothing a run logs or registers becomes visible to
//! readers until the run ends with [`RunStatus::Finished`]. Ending with
//! [`RunStatus::Failed`] discards the staged data, so a failed run leaves no
//! metrics and no model versions behind.

use crate::errors::{Result, TrackingError};
use chrono::{DateTime, Utc};
use housing_core::{ForestModel, Predictor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

/// Prefix of registered model URIs
pub const MODEL_URI_SCHEME: &str = "models:/";

/// Status of a tracking run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run is accepting data
    Running,
    /// Run committed its staged data
    Finished,
    /// Run aborted, staged data discarded
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Explicit reference to a started run, passed to every logging call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: String,
    pub experiment: String,
}

/// Committed view of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub experiment: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
    /// Artifact paths relative to the run's artifact root
    pub artifacts: Vec<String>,
}

impl RunRecord {
    pub fn new(run_id: String, experiment: String) -> Self {
        Self {
            run_id,
            experiment,
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            tags: BTreeMap::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn handle(&self) -> RunHandle {
        RunHandle {
            run_id: self.run_id.clone(),
            experiment: self.experiment.clone(),
        }
    }
}

/// One registered version of a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersionRecord {
    pub name: String,
    /// Integer version serialized as a string
    pub version: String,
    pub uri: String,
    /// Run that produced the version, absent for imported models
    pub run_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// BLAKE3 hash of the model's canonical JSON
    pub model_hash: String,
}

impl ModelVersionRecord {
    /// Numeric value of the version string
    pub fn version_number(&self) -> Option<u64> {
        self.version.parse().ok()
    }
}

/// Parsed `models:/<name>/<version>` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelUri {
    pub name: String,
    pub version: String,
}

impl ModelUri {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MODEL_URI_SCHEME}{}/{}", self.name, self.version)
    }
}

impl FromStr for ModelUri {
    type Err = TrackingError;

    fn from_str(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix(MODEL_URI_SCHEME)
            .ok_or_else(|| TrackingError::InvalidModelUri(uri.to_string()))?;
        let (name, version) = rest
            .rsplit_once('/')
            .ok_or_else(|| TrackingError::InvalidModelUri(uri.to_string()))?;

        if validate_model_name(name).is_err() || version.parse::<u64>().is_err() {
            return Err(TrackingError::InvalidModelUri(uri.to_string()));
        }
        Ok(Self::new(name, version))
    }
}

/// Model names become directory names, so they must be plain path segments.
pub fn validate_model_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(TrackingError::InvalidModelName(name.to_string()));
    }
    Ok(())
}

/// Normalize an artifact path under a run's artifact root.
///
/// `dir` may be empty. The result uses `/` separators and never escapes the
/// root (no absolute paths, no `..`).
pub fn artifact_path(dir: &str, file_name: &str) -> Result<String> {
    let joined = if dir.trim_matches('/').is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", dir.trim_matches('/'), file_name)
    };

    let mut parts = Vec::new();
    for component in Path::new(&joined).components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => return Err(TrackingError::InvalidArtifactPath(joined.clone())),
            },
            Component::CurDir => {}
            _ => return Err(TrackingError::InvalidArtifactPath(joined.clone())),
        }
    }

    if parts.is_empty() {
        return Err(TrackingError::InvalidArtifactPath(joined));
    }
    Ok(parts.join("/"))
}

/// Next version for a model: one past the largest committed version.
pub fn next_version<'a>(existing: impl IntoIterator<Item = &'a ModelVersionRecord>) -> u64 {
    existing
        .into_iter()
        .filter_map(ModelVersionRecord::version_number)
        .max()
        .unwrap_or(0)
        + 1
}

/// A model version waiting for its run to finish
#[derive(Debug, Clone)]
pub struct PendingVersion {
    pub record: ModelVersionRecord,
    pub model: ForestModel,
}

/// Everything a running run has logged but not yet committed
#[derive(Debug, Clone, Default)]
pub struct StagedRun {
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
    /// Artifact bytes keyed by normalized path
    pub artifacts: BTreeMap<String, Vec<u8>>,
    pub versions: Vec<PendingVersion>,
}

impl StagedRun {
    /// Fold the staged data into the committed record.
    pub fn apply_to(&self, record: &mut RunRecord) {
        record
            .params
            .extend(self.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        record.metrics.extend(self.metrics.iter().map(|(k, v)| (k.clone(), *v)));
        record
            .tags
            .extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        for path in self.artifacts.keys() {
            if !record.artifacts.contains(path) {
                record.artifacts.push(path.clone());
            }
        }
    }

    /// Version numbers this run has already reserved for `name`
    pub fn reserved_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ModelVersionRecord> {
        self.versions
            .iter()
            .map(|pending| &pending.record)
            .filter(move |record| record.name == name)
    }
}

/// Experiment tracking and model registry backend.
///
/// All methods take `&self`; backends use interior mutability so one client
/// can be shared between the training pipeline and registry readers.
pub trait TrackingClient: Send + Sync {
    /// Where this client stores data, e.g. `file:./mlruns`
    fn tracking_uri(&self) -> String;

    fn start_run(&self, experiment: &str) -> Result<RunHandle>;

    fn log_params(&self, run: &RunHandle, params: &BTreeMap<String, String>) -> Result<()>;

    fn log_metric(&self, run: &RunHandle, key: &str, value: f64) -> Result<()>;

    fn set_tag(&self, run: &RunHandle, key: &str, value: &str) -> Result<()>;

    /// Stage raw bytes as an artifact at `artifact_path` (already normalized
    /// by the provided methods).
    fn log_artifact_bytes(&self, run: &RunHandle, artifact_path: &str, bytes: Vec<u8>) -> Result<()>;

    /// Stage a model version; the version becomes visible when the run finishes.
    fn register_model(
        &self,
        run: &RunHandle,
        model: &ForestModel,
        name: &str,
    ) -> Result<ModelVersionRecord>;

    /// Finish or fail a run. `Finished` commits everything staged,
    /// `Failed` discards it.
    fn end_run(&self, run: &RunHandle, status: RunStatus) -> Result<()>;

    fn get_run(&self, run_id: &str) -> Result<RunRecord>;

    /// Committed artifact bytes of a run
    fn download_artifact(&self, run_id: &str, artifact_path: &str) -> Result<Vec<u8>>;

    /// Committed versions of `name`; empty if the model is unknown
    fn search_versions(&self, name: &str) -> Result<Vec<ModelVersionRecord>>;

    /// Load the model behind a `models:/<name>/<version>` URI
    fn load_model(&self, uri: &str) -> Result<Box<dyn Predictor>>;

    /// Copy a local file into the run's artifacts under `artifact_dir`.
    ///
    /// The bytes are read now, so later edits to the file do not change
    /// what the run records. Returns the artifact path.
    fn log_artifact(&self, run: &RunHandle, local_path: &Path, artifact_dir: &str) -> Result<String> {
        let file_name = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| TrackingError::InvalidArtifactPath(local_path.display().to_string()))?;
        let path = artifact_path(artifact_dir, file_name)?;
        let bytes = std::fs::read(local_path)?;
        self.log_artifact_bytes(run, &path, bytes)?;
        Ok(path)
    }

    /// Stage text as an artifact file, e.g. `model/input_example.json`
    fn log_text(&self, run: &RunHandle, text: &str, artifact_file: &str) -> Result<String> {
        let path = artifact_path("", artifact_file)?;
        self.log_artifact_bytes(run, &path, text.as_bytes().to_vec())?;
        Ok(path)
    }
}
