//! Directory-backed tracking store
//!
//! Layout under the root directory:
//!
//! ```text
//! runs/<run_id>/run.json
//! runs/<run_id>/artifacts/<artifact path>
//! models/<name>/<version>/version.json
//! models/<name>/<version>/model.json
//! ```
//!
//! Staged run data is held in process until the run ends. A model version is
//! written into a hidden staging directory and published with a single
//! rename, so readers never observe a half-written version.

use crate::errors::{Result, TrackingError};
use crate::tracking::{
    artifact_path, next_version, validate_model_name, ModelUri, ModelVersionRecord,
    PendingVersion, RunHandle, RunRecord, RunStatus, StagedRun, TrackingClient,
};
use chrono::Utc;
use housing_core::{ForestModel, Predictor};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

const RUN_FILE: &str = "run.json";
const VERSION_FILE: &str = "version.json";
const MODEL_FILE: &str = "model.json";
const STAGING_PREFIX: &str = ".staging-";

/// File-system tracking store
#[derive(Debug)]
pub struct FileTracking {
    root: PathBuf,
    staged: Mutex<HashMap<String, StagedRun>>,
}

impl FileTracking {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("runs"))?;
        fs::create_dir_all(root.join("models"))?;
        info!("Opened file tracking store at {}", root.display());
        Ok(Self {
            root,
            staged: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join("runs").join(run_id)
    }

    fn model_dir(&self, name: &str) -> PathBuf {
        self.root.join("models").join(name)
    }

    fn read_run(&self, run_id: &str) -> Result<RunRecord> {
        let path = self.run_dir(run_id).join(RUN_FILE);
        if !path.exists() {
            return Err(TrackingError::RunNotFound(run_id.to_string()));
        }
        read_json(&path)
    }

    fn write_run(&self, record: &RunRecord) -> Result<()> {
        let dir = self.run_dir(&record.run_id);
        fs::create_dir_all(&dir)?;
        write_json_atomic(&dir, RUN_FILE, record)
    }

    /// Run the closure against the staged data of an active run
    fn with_staged<T>(&self, run: &RunHandle, f: impl FnOnce(&mut StagedRun) -> T) -> Result<T> {
        let mut staged = self.staged.lock();
        match staged.get_mut(&run.run_id) {
            Some(entry) => Ok(f(entry)),
            None => {
                let record = self.read_run(&run.run_id)?;
                Err(TrackingError::RunNotActive {
                    run_id: run.run_id.clone(),
                    status: record.status.to_string(),
                })
            }
        }
    }

    fn committed_versions(&self, name: &str) -> Result<Vec<ModelVersionRecord>> {
        let dir = self.model_dir(name);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let hidden = file_name.to_str().map_or(true, |n| n.starts_with('.'));
            if hidden || !entry.file_type()?.is_dir() {
                continue;
            }
            let record_path = entry.path().join(VERSION_FILE);
            if record_path.exists() {
                versions.push(read_json::<ModelVersionRecord>(&record_path)?);
            }
        }

        versions.sort_by_key(|record| record.version_number());
        Ok(versions)
    }

    /// Write a version into a staging directory, then rename it into place
    fn publish_version(&self, pending: &PendingVersion) -> Result<PathBuf> {
        let name = &pending.record.name;
        let model_dir = self.model_dir(name);
        fs::create_dir_all(&model_dir)?;

        let target = model_dir.join(&pending.record.version);
        if target.exists() {
            return Err(TrackingError::VersionConflict {
                name: name.clone(),
                version: pending.record.version.clone(),
            });
        }

        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&model_dir)?;
        fs::write(staging.path().join(MODEL_FILE), pending.model.to_canonical_json()?)?;
        write_json_atomic(staging.path(), VERSION_FILE, &pending.record)?;

        let staging_path = staging.into_path();
        if let Err(err) = fs::rename(&staging_path, &target) {
            let _ = fs::remove_dir_all(&staging_path);
            return Err(if target.exists() {
                TrackingError::VersionConflict {
                    name: name.clone(),
                    version: pending.record.version.clone(),
                }
            } else {
                err.into()
            });
        }

        debug!("Published {}", ModelUri::new(name, &pending.record.version));
        Ok(target)
    }

    /// Write artifacts, then publish versions, then the finished record.
    /// Versions go last so a failed commit never leaves a loadable model.
    fn commit(&self, record: &RunRecord, staged: &StagedRun) -> Result<()> {
        self.write_artifacts(&record.run_id, staged)?;

        let mut published = Vec::new();
        for pending in &staged.versions {
            match self.publish_version(pending) {
                Ok(path) => published.push(path),
                Err(err) => {
                    roll_back(&published);
                    return Err(err);
                }
            }
        }

        let mut finished = record.clone();
        staged.apply_to(&mut finished);
        finished.status = RunStatus::Finished;
        if let Err(err) = self.write_run(&finished) {
            roll_back(&published);
            return Err(err);
        }
        Ok(())
    }

    fn write_artifacts(&self, run_id: &str, staged: &StagedRun) -> Result<()> {
        let artifact_root = self.run_dir(run_id).join("artifacts");
        for (path, bytes) in &staged.artifacts {
            let target = artifact_root.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, bytes)?;
        }
        Ok(())
    }

    fn discard_artifacts(&self, run_id: &str) {
        let artifact_root = self.run_dir(run_id).join("artifacts");
        if artifact_root.is_dir() {
            if let Err(err) = fs::remove_dir_all(&artifact_root) {
                warn!("Failed to discard {}: {}", artifact_root.display(), err);
            }
        }
    }
}

fn roll_back(published: &[PathBuf]) {
    for path in published {
        if let Err(err) = fs::remove_dir_all(path) {
            warn!("Failed to roll back {}: {}", path.display(), err);
        }
    }
}

impl TrackingClient for FileTracking {
    fn tracking_uri(&self) -> String {
        format!("file:{}", self.root.display())
    }

    fn start_run(&self, experiment: &str) -> Result<RunHandle> {
        let record = RunRecord::new(Uuid::new_v4().simple().to_string(), experiment.to_string());
        self.write_run(&record)?;
        self.staged
            .lock()
            .insert(record.run_id.clone(), StagedRun::default());

        debug!("Started run {} in experiment {}", record.run_id, experiment);
        Ok(record.handle())
    }

    fn log_params(&self, run: &RunHandle, params: &BTreeMap<String, String>) -> Result<()> {
        self.with_staged(run, |staged| {
            staged
                .params
                .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())))
        })
    }

    fn log_metric(&self, run: &RunHandle, key: &str, value: f64) -> Result<()> {
        self.with_staged(run, |staged| {
            staged.metrics.insert(key.to_string(), value);
        })
    }

    fn set_tag(&self, run: &RunHandle, key: &str, value: &str) -> Result<()> {
        self.with_staged(run, |staged| {
            staged.tags.insert(key.to_string(), value.to_string());
        })
    }

    fn log_artifact_bytes(&self, run: &RunHandle, path: &str, bytes: Vec<u8>) -> Result<()> {
        let path = artifact_path("", path)?;
        self.with_staged(run, |staged| {
            staged.artifacts.insert(path, bytes);
        })
    }

    fn register_model(
        &self,
        run: &RunHandle,
        model: &ForestModel,
        name: &str,
    ) -> Result<ModelVersionRecord> {
        validate_model_name(name)?;
        model.validate()?;
        let model_hash = model.hash_hex()?;
        let committed = self.committed_versions(name)?;

        let mut staged = self.staged.lock();
        if !staged.contains_key(&run.run_id) {
            drop(staged);
            let record = self.read_run(&run.run_id)?;
            return Err(TrackingError::RunNotActive {
                run_id: run.run_id.clone(),
                status: record.status.to_string(),
            });
        }

        let reserved = staged.values().flat_map(|s| s.reserved_for(name));
        let version = next_version(&committed).max(next_version(reserved)).to_string();
        let record = ModelVersionRecord {
            name: name.to_string(),
            uri: ModelUri::new(name, &version).to_string(),
            version,
            run_id: Some(run.run_id.clone()),
            created_at: Utc::now(),
            model_hash,
        };

        if let Some(entry) = staged.get_mut(&run.run_id) {
            entry.versions.push(PendingVersion {
                record: record.clone(),
                model: model.clone(),
            });
        }
        Ok(record)
    }

    fn end_run(&self, run: &RunHandle, status: RunStatus) -> Result<()> {
        let staged = self.staged.lock().remove(&run.run_id);
        let mut record = self.read_run(&run.run_id)?;
        let Some(staged) = staged else {
            return Err(TrackingError::RunNotActive {
                run_id: run.run_id.clone(),
                status: record.status.to_string(),
            });
        };

        record.end_time = Some(Utc::now());
        let outcome = match status {
            RunStatus::Finished => self.commit(&record, &staged),
            _ => {
                record.status = status;
                self.write_run(&record)
            }
        };

        if let Err(err) = outcome {
            self.discard_artifacts(&run.run_id);
            record.status = RunStatus::Failed;
            if let Err(write_err) = self.write_run(&record) {
                warn!("Failed to mark run {} failed: {}", run.run_id, write_err);
            }
            return Err(err);
        }

        debug!("Ended run {} with status {}", run.run_id, status);
        Ok(())
    }

    fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        self.read_run(run_id)
    }

    fn download_artifact(&self, run_id: &str, path: &str) -> Result<Vec<u8>> {
        let path = artifact_path("", path)?;
        let file = self.run_dir(run_id).join("artifacts").join(&path);
        if !file.is_file() {
            return Err(TrackingError::ArtifactNotFound {
                run_id: run_id.to_string(),
                path,
            });
        }
        Ok(fs::read(file)?)
    }

    fn search_versions(&self, name: &str) -> Result<Vec<ModelVersionRecord>> {
        validate_model_name(name)?;
        self.committed_versions(name)
    }

    fn load_model(&self, uri: &str) -> Result<Box<dyn Predictor>> {
        let parsed: ModelUri = uri.parse()?;
        let path = self.model_dir(&parsed.name).join(&parsed.version).join(MODEL_FILE);
        if !path.is_file() {
            return Err(TrackingError::ModelNotFound {
                name: parsed.name,
                version: parsed.version,
            });
        }
        Ok(Box::new(ForestModel::load_json(&path)?))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write `value` as pretty JSON to `dir/file_name` via a temp file and rename
fn write_json_atomic<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
    tmp.persist(dir.join(file_name)).map_err(|e| e.error)?;
    Ok(())
}
