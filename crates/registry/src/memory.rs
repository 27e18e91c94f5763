//! In-memory tracking backend
//!
//! Cloning an [`InMemoryTracking`] shares the underlying store, so a test can
//! hand one clone to the training pipeline and read through another. Faults
//! can be injected per operation to exercise failure paths.

use crate::errors::{Result, TrackingError};
use crate::tracking::{
    next_version, validate_model_name, ModelUri, ModelVersionRecord, PendingVersion, RunHandle,
    RunRecord, RunStatus, StagedRun, TrackingClient,
};
use chrono::Utc;
use housing_core::{ForestModel, Predictor};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Tracking operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    StartRun,
    LogParams,
    LogMetric,
    SetTag,
    LogArtifact,
    RegisterModel,
    EndRun,
    SearchVersions,
    LoadModel,
}

#[derive(Debug, Default)]
struct MemoryState {
    runs: BTreeMap<String, RunRecord>,
    staged: HashMap<String, StagedRun>,
    artifacts: HashMap<String, BTreeMap<String, Vec<u8>>>,
    models: BTreeMap<String, Vec<(ModelVersionRecord, ForestModel)>>,
    faults: HashSet<Operation>,
}

impl MemoryState {
    fn staged_mut(&mut self, run: &RunHandle) -> Result<&mut StagedRun> {
        if let Some(status) = self
            .runs
            .get(&run.run_id)
            .map(|record| record.status)
            .filter(|status| *status != RunStatus::Running)
        {
            return Err(TrackingError::RunNotActive {
                run_id: run.run_id.clone(),
                status: status.to_string(),
            });
        }
        self.staged
            .get_mut(&run.run_id)
            .ok_or_else(|| TrackingError::RunNotFound(run.run_id.clone()))
    }

    fn check_fault(&self, op: Operation) -> Result<()> {
        if self.faults.contains(&op) {
            return Err(TrackingError::Injected(format!("{op:?}")));
        }
        Ok(())
    }

    fn committed(&self, name: &str) -> impl Iterator<Item = &ModelVersionRecord> {
        self.models
            .get(name)
            .into_iter()
            .flat_map(|versions| versions.iter().map(|(record, _)| record))
    }

    /// Next free version, counting reservations of every running run
    fn reserve_version(&self, name: &str) -> u64 {
        let reserved = self
            .staged
            .values()
            .flat_map(|staged| staged.reserved_for(name));
        next_version(self.committed(name)).max(next_version(reserved))
    }

    fn commit(&mut self, run_id: &str, staged: &StagedRun) -> Result<()> {
        for pending in &staged.versions {
            let taken = self
                .committed(&pending.record.name)
                .any(|record| record.version == pending.record.version);
            if taken {
                return Err(TrackingError::VersionConflict {
                    name: pending.record.name.clone(),
                    version: pending.record.version.clone(),
                });
            }
        }

        for pending in &staged.versions {
            self.models
                .entry(pending.record.name.clone())
                .or_default()
                .push((pending.record.clone(), pending.model.clone()));
        }
        self.artifacts
            .entry(run_id.to_string())
            .or_default()
            .extend(staged.artifacts.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

/// Shared in-memory tracking store
#[derive(Debug, Clone, Default)]
pub struct InMemoryTracking {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryTracking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of `op` fail with [`TrackingError::Injected`]
    pub fn fail_on(&self, op: Operation) {
        self.state.write().faults.insert(op);
    }

    pub fn clear_faults(&self) {
        self.state.write().faults.clear();
    }

    /// Add a committed version directly, outside of any run
    pub fn import_version(
        &self,
        name: &str,
        version: &str,
        model: ForestModel,
    ) -> Result<ModelVersionRecord> {
        validate_model_name(name)?;
        let uri = ModelUri::new(name, version);
        if version.parse::<u64>().is_err() {
            return Err(TrackingError::InvalidModelUri(uri.to_string()));
        }

        let record = ModelVersionRecord {
            name: name.to_string(),
            version: version.to_string(),
            uri: uri.to_string(),
            run_id: None,
            created_at: Utc::now(),
            model_hash: model.hash_hex()?,
        };

        let mut state = self.state.write();
        if state.committed(name).any(|r| r.version == version) {
            return Err(TrackingError::VersionConflict {
                name: name.to_string(),
                version: version.to_string(),
            });
        }
        state
            .models
            .entry(name.to_string())
            .or_default()
            .push((record.clone(), model));
        Ok(record)
    }

    /// Every run ever started, committed view
    pub fn runs(&self) -> Vec<RunRecord> {
        self.state.read().runs.values().cloned().collect()
    }
}

impl TrackingClient for InMemoryTracking {
    fn tracking_uri(&self) -> String {
        "memory:".to_string()
    }

    fn start_run(&self, experiment: &str) -> Result<RunHandle> {
        let mut state = self.state.write();
        state.check_fault(Operation::StartRun)?;

        let record = RunRecord::new(Uuid::new_v4().simple().to_string(), experiment.to_string());
        let handle = record.handle();
        state.staged.insert(record.run_id.clone(), StagedRun::default());
        state.runs.insert(record.run_id.clone(), record);

        debug!("Started run {} in experiment {}", handle.run_id, experiment);
        Ok(handle)
    }

    fn log_params(&self, run: &RunHandle, params: &BTreeMap<String, String>) -> Result<()> {
        let mut state = self.state.write();
        state.check_fault(Operation::LogParams)?;
        state
            .staged_mut(run)?
            .params
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn log_metric(&self, run: &RunHandle, key: &str, value: f64) -> Result<()> {
        let mut state = self.state.write();
        state.check_fault(Operation::LogMetric)?;
        state.staged_mut(run)?.metrics.insert(key.to_string(), value);
        Ok(())
    }

    fn set_tag(&self, run: &RunHandle, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.write();
        state.check_fault(Operation::SetTag)?;
        state
            .staged_mut(run)?
            .tags
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn log_artifact_bytes(&self, run: &RunHandle, artifact_path: &str, bytes: Vec<u8>) -> Result<()> {
        let mut state = self.state.write();
        state.check_fault(Operation::LogArtifact)?;
        state
            .staged_mut(run)?
            .artifacts
            .insert(artifact_path.to_string(), bytes);
        Ok(())
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

        let mut state = self.state.write();
        state.check_fault(Operation::RegisterModel)?;
        state.staged_mut(run)?;

        let version = state.reserve_version(name).to_string();
        let record = ModelVersionRecord {
            name: name.to_string(),
            uri: ModelUri::new(name, &version).to_string(),
            version,
            run_id: Some(run.run_id.clone()),
            created_at: Utc::now(),
            model_hash,
        };

        state.staged_mut(run)?.versions.push(PendingVersion {
            record: record.clone(),
            model: model.clone(),
        });
        Ok(record)
    }

    fn end_run(&self, run: &RunHandle, status: RunStatus) -> Result<()> {
        let mut state = self.state.write();
        state.check_fault(Operation::EndRun)?;
        state.staged_mut(run)?;

        let staged = state.staged.remove(&run.run_id).unwrap_or_default();
        let outcome = match status {
            RunStatus::Finished => state.commit(&run.run_id, &staged),
            _ => Ok(()),
        };
        let final_status = if outcome.is_ok() { status } else { RunStatus::Failed };

        if let Some(record) = state.runs.get_mut(&run.run_id) {
            if final_status == RunStatus::Finished {
                staged.apply_to(record);
            }
            record.status = final_status;
            record.end_time = Some(Utc::now());
        }

        debug!("Ended run {} with status {}", run.run_id, final_status);
        outcome
    }

    fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        self.state
            .read()
            .runs
            .get(run_id)
            .cloned()
            .ok_or_else(|| TrackingError::RunNotFound(run_id.to_string()))
    }

    fn download_artifact(&self, run_id: &str, artifact_path: &str) -> Result<Vec<u8>> {
        self.state
            .read()
            .artifacts
            .get(run_id)
            .and_then(|artifacts| artifacts.get(artifact_path))
            .cloned()
            .ok_or_else(|| TrackingError::ArtifactNotFound {
                run_id: run_id.to_string(),
                path: artifact_path.to_string(),
            })
    }

    fn search_versions(&self, name: &str) -> Result<Vec<ModelVersionRecord>> {
        let state = self.state.read();
        state.check_fault(Operation::SearchVersions)?;
        Ok(state.committed(name).cloned().collect())
    }

    fn load_model(&self, uri: &str) -> Result<Box<dyn Predictor>> {
        let state = self.state.read();
        state.check_fault(Operation::LoadModel)?;

        let parsed: ModelUri = uri.parse()?;
        let model = state
            .models
            .get(&parsed.name)
            .and_then(|versions| {
                versions
                    .iter()
                    .find(|(record, _)| record.version == parsed.version)
            })
            .map(|(_, model)| model.clone())
            .ok_or_else(|| TrackingError::ModelNotFound {
                name: parsed.name.clone(),
                version: parsed.version.clone(),
            })?;
        Ok(Box::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use housing_core::{Node, Tree};

    fn model() -> ForestModel {
        ForestModel::new(
            vec!["HouseAge".to_string(), "MedInc_log".to_string()],
            vec![Tree::new(vec![
                Node::internal(0, 1, 1.5, 1, 2),
                Node::leaf(1, 1.0),
                Node::leaf(2, 3.0),
            ])],
            BTreeMap::new(),
        )
    }

    #[test]
    fn test_nothing_visible_before_finish() {
        let tracking = InMemoryTracking::new();
        let run = tracking.start_run("housing").unwrap();

        tracking.log_metric(&run, "rmse", 0.5).unwrap();
        let version = tracking.register_model(&run, &model(), "housing-rf").unwrap();
        assert_eq!(version.version, "1");

        assert!(tracking.get_run(&run.run_id).unwrap().metrics.is_empty());
        assert!(tracking.search_versions("housing-rf").unwrap().is_empty());

        tracking.end_run(&run, RunStatus::Finished).unwrap();

        let record = tracking.get_run(&run.run_id).unwrap();
        assert_eq!(record.status, RunStatus::Finished);
        assert_eq!(record.metrics["rmse"], 0.5);
        assert_eq!(tracking.search_versions("housing-rf").unwrap(), vec![version]);
    }

    #[test]
    fn test_failed_run_discards_staged_data() {
        let tracking = InMemoryTracking::new();
        let run = tracking.start_run("housing").unwrap();
        tracking.log_metric(&run, "rmse", 0.5).unwrap();
        tracking
            .log_artifact_bytes(&run, "config/raw.yaml", b"x".to_vec())
            .unwrap();
        tracking.register_model(&run, &model(), "housing-rf").unwrap();

        tracking.end_run(&run, RunStatus::Failed).unwrap();

        let record = tracking.get_run(&run.run_id).unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert!(record.metrics.is_empty());
        assert!(record.artifacts.is_empty());
        assert!(tracking.search_versions("housing-rf").unwrap().is_empty());
        assert!(tracking.download_artifact(&run.run_id, "config/raw.yaml").is_err());
    }

    #[test]
    fn test_ended_run_rejects_logging() {
        let tracking = InMemoryTracking::new();
        let run = tracking.start_run("housing").unwrap();
        tracking.end_run(&run, RunStatus::Finished).unwrap();

        assert!(matches!(
            tracking.log_metric(&run, "rmse", 1.0),
            Err(TrackingError::RunNotActive { .. })
        ));
        assert!(matches!(
            tracking.end_run(&run, RunStatus::Finished),
            Err(TrackingError::RunNotActive { .. })
        ));

        let unknown = RunHandle {
            run_id: "nope".into(),
            experiment: "housing".into(),
        };
        assert!(matches!(
            tracking.log_metric(&unknown, "rmse", 1.0),
            Err(TrackingError::RunNotFound(_))
        ));
    }

    #[test]
    fn test_versions_increment_after_max() {
        let tracking = InMemoryTracking::new();
        for v in ["2", "10", "1"] {
            tracking.import_version("housing-rf", v, model()).unwrap();
        }

        let run = tracking.start_run("housing").unwrap();
        let record = tracking.register_model(&run, &model(), "housing-rf").unwrap();
        assert_eq!(record.version, "11");
        assert_eq!(record.uri, "models:/housing-rf/11");
    }

    #[test]
    fn test_concurrent_runs_reserve_distinct_versions() {
        let tracking = InMemoryTracking::new();
        let first = tracking.start_run("housing").unwrap();
        let second = tracking.start_run("housing").unwrap();

        let a = tracking.register_model(&first, &model(), "housing-rf").unwrap();
        let b = tracking.register_model(&second, &model(), "housing-rf").unwrap();
        assert_ne!(a.version, b.version);

        tracking.end_run(&second, RunStatus::Finished).unwrap();
        tracking.end_run(&first, RunStatus::Finished).unwrap();
        assert_eq!(tracking.search_versions("housing-rf").unwrap().len(), 2);
    }

    #[test]
    fn test_load_model_by_uri() {
        let tracking = InMemoryTracking::new();
        tracking.import_version("housing-rf", "3", model()).unwrap();

        let predictor = tracking.load_model("models:/housing-rf/3").unwrap();
        assert_eq!(predictor.input_schema(), ["HouseAge", "MedInc_log"]);

        assert!(matches!(
            tracking.load_model("models:/housing-rf/4"),
            Err(TrackingError::ModelNotFound { .. })
        ));
        assert!(tracking.load_model("housing-rf/3").is_err());
    }

    #[test]
    fn test_fault_injection() {
        let tracking = InMemoryTracking::new();
        tracking.fail_on(Operation::SearchVersions);
        assert!(matches!(
            tracking.search_versions("housing-rf"),
            Err(TrackingError::Injected(_))
        ));
        tracking.clear_faults();
        assert!(tracking.search_versions("housing-rf").is_ok());
    }

    #[test]
    fn test_clones_share_state() {
        let writer = InMemoryTracking::new();
        let reader = writer.clone();
        writer.import_version("housing-rf", "1", model()).unwrap();
        assert_eq!(reader.search_versions("housing-rf").unwrap().len(), 1);
    }
}
