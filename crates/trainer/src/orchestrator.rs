//! Training pipeline state machine
//!
//! LOAD_CONFIG → LOAD_DATA → SPLIT → VALIDATE_SCHEMA → TRANSFORM → FIT →
//! EVALUATE → LOG_METRICS_PARAMS → LOG_ARTIFACTS → REGISTER_MODEL → DONE
//!
//! Every stage either advances or aborts the run. Everything logged to the
//! tracking backend is staged on the run and committed by a single
//! `end_run(Finished)`; an aborted run is ended as failed, which discards it.

use crate::errors::{PipelineError, Stage};
use crate::evaluation::rmse;
use crate::forest::{Estimator, RandomForestRegressor};
use crate::provider::DatasetProvider;
use housing_core::{
    train_test_split, Column, ConfigStore, FeatureTransformer, PipelineConfig, SchemaContract,
    SchemaValidator, TabularDataset,
};
use housing_registry::{RunHandle, RunStatus, TrackingClient};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Artifact directory for the configuration files of a run
pub const CONFIG_ARTIFACT_DIR: &str = "config";

/// Artifact path of the single-row input example
pub const INPUT_EXAMPLE_ARTIFACT: &str = "model/input_example.json";

/// Metric name of the held-out error
pub const RMSE_METRIC: &str = "rmse";

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub run_id: String,
    pub model_name: String,
    pub version: String,
    pub model_uri: String,
    pub rmse: f64,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Input schema of the registered model
    pub feature_names: Vec<String>,
    pub params: BTreeMap<String, String>,
    pub model_hash: String,
}

/// Drives one training run against a tracking backend
pub struct TrainingOrchestrator<'a> {
    store: &'a ConfigStore,
    provider: &'a dyn DatasetProvider,
    tracking: &'a dyn TrackingClient,
    transformer: FeatureTransformer,
}

/// Validated, transformed data ready for fitting
struct PreparedData {
    x_train: TabularDataset,
    x_test: TabularDataset,
    y_train: Column,
    y_test: Column,
}

impl<'a> TrainingOrchestrator<'a> {
    pub fn new(
        store: &'a ConfigStore,
        provider: &'a dyn DatasetProvider,
        tracking: &'a dyn TrackingClient,
    ) -> Self {
        Self {
            store,
            provider,
            tracking,
            transformer: FeatureTransformer::default(),
        }
    }

    pub fn with_transformer(mut self, transformer: FeatureTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    /// Run the pipeline end to end.
    ///
    /// On success the model version, its params, metric, tags and artifacts
    /// are all committed. On failure none of them are.
    #[instrument(skip(self), fields(model_config = %self.store.model_path().display()))]
    pub fn run(&self) -> Result<TrainingSummary, PipelineError> {
        info!("[{}] Reading configuration", Stage::LoadConfig);
        let config = self.store.load()?;

        let run = self
            .tracking
            .start_run(config.model.experiment())
            .map_err(PipelineError::tracking(Stage::LoadConfig))?;
        info!(
            "Started run {} in experiment '{}' ({})",
            run.run_id,
            run.experiment,
            self.tracking.tracking_uri()
        );

        let summary = match self.execute(&config, &run) {
            Ok(summary) => summary,
            Err(err) => {
                self.abort(&run, &err);
                return Err(err);
            }
        };

        if let Err(source) = self.tracking.end_run(&run, RunStatus::Finished) {
            let err = PipelineError::Tracking {
                stage: Stage::RegisterModel,
                source,
            };
            self.abort(&run, &err);
            return Err(err);
        }

        info!(
            "[{}] Registered {} (rmse {:.4})",
            Stage::Done,
            summary.model_uri,
            summary.rmse
        );
        Ok(summary)
    }

    /// End a still-running run as failed, discarding what it staged
    fn abort(&self, run: &RunHandle, err: &PipelineError) {
        warn!("Run {} failed at {}: {}", run.run_id, err.stage(), err);
        let running = matches!(
            self.tracking.get_run(&run.run_id).map(|record| record.status),
            Ok(RunStatus::Running)
        );
        if running {
            if let Err(end_err) = self.tracking.end_run(run, RunStatus::Failed) {
                warn!("Could not mark run {} as failed: {}", run.run_id, end_err);
            }
        }
    }

    fn execute(
        &self,
        config: &PipelineConfig,
        run: &RunHandle,
    ) -> Result<TrainingSummary, PipelineError> {
        let data = self.prepare(config)?;

        info!("[{}] Fitting random forest", Stage::Fit);
        let estimator = RandomForestRegressor::from_hyperparams(&config.model.params)
            .map_err(PipelineError::estimator(Stage::Fit))?;
        let model = estimator
            .fit(&data.x_train, &data.y_train)
            .map_err(PipelineError::estimator(Stage::Fit))?;

        info!("[{}] Scoring {} held-out rows", Stage::Evaluate, data.x_test.len());
        let predictions = model
            .predict_values(&data.x_test)
            .map_err(|e| PipelineError::estimator(Stage::Evaluate)(e.into()))?;
        let targets = data
            .y_test
            .to_f64()
            .map_err(PipelineError::dataset(Stage::Evaluate))?;
        let error = rmse(&predictions, &targets).map_err(PipelineError::estimator(Stage::Evaluate))?;
        info!("RMSE: {:.4}", error);

        info!("[{}] Logging params, metrics and tags", Stage::LogMetricsParams);
        let params = config.model.params_as_strings();
        let model_hash = model
            .hash_hex()
            .map_err(|e| PipelineError::estimator(Stage::LogMetricsParams)(e.into()))?;
        let fingerprint = data
            .x_train
            .clone()
            .with_column(data.y_train.clone())
            .map_err(PipelineError::dataset(Stage::LogMetricsParams))?
            .fingerprint()?;

        self.tracking
            .log_params(run, &params)
            .map_err(PipelineError::tracking(Stage::LogMetricsParams))?;
        self.tracking
            .log_metric(run, RMSE_METRIC, error)
            .map_err(PipelineError::tracking(Stage::LogMetricsParams))?;

        let tags = [
            ("tracking_uri", self.tracking.tracking_uri()),
            ("dataset_source", self.provider.describe()),
            ("train_rows", data.x_train.len().to_string()),
            ("test_rows", data.x_test.len().to_string()),
            ("training_data_fingerprint", fingerprint),
            ("model_hash", model_hash.clone()),
            ("feature_names", model.feature_names.join(",")),
        ];
        for (key, value) in &tags {
            self.tracking
                .set_tag(run, key, value)
                .map_err(PipelineError::tracking(Stage::LogMetricsParams))?;
        }

        info!("[{}] Logging configuration and input example", Stage::LogArtifacts);
        for snapshot in &config.snapshots {
            let file_name = snapshot.file_name().unwrap_or("config.yaml");
            let logged = self
                .tracking
                .log_text(run, &snapshot.text, &format!("{CONFIG_ARTIFACT_DIR}/{file_name}"))
                .map_err(PipelineError::tracking(Stage::LogArtifacts))?;
            debug!("Logged {} as {}", snapshot.path.display(), logged);
        }
        let example = input_example(&data.x_train)
            .map_err(PipelineError::dataset(Stage::LogArtifacts))?;
        self.tracking
            .log_text(run, &example, INPUT_EXAMPLE_ARTIFACT)
            .map_err(PipelineError::tracking(Stage::LogArtifacts))?;

        info!(
            "[{}] Registering '{}'",
            Stage::RegisterModel,
            config.model.registered_model_name
        );
        let version = self
            .tracking
            .register_model(run, &model, &config.model.registered_model_name)
            .map_err(PipelineError::tracking(Stage::RegisterModel))?;

        Ok(TrainingSummary {
            run_id: run.run_id.clone(),
            model_name: version.name,
            version: version.version,
            model_uri: version.uri,
            rmse: error,
            train_rows: data.x_train.len(),
            test_rows: data.x_test.len(),
            feature_names: model.feature_names.clone(),
            params,
            model_hash,
        })
    }

    /// LOAD_DATA through TRANSFORM: fetch, split, gate and transform.
    ///
    /// The schema gate checks both splits against the data contract read at
    /// LOAD_CONFIG. Later edits to the file do not reach this run, and the
    /// logged config artifacts are that same snapshot.
    fn prepare(&self, config: &PipelineConfig) -> Result<PreparedData, PipelineError> {
        info!("[{}] Fetching {}", Stage::LoadData, self.provider.describe());
        let (x, y) = self
            .provider
            .fetch()
            .map_err(PipelineError::dataset(Stage::LoadData))?;

        let split_config = &config.data.split;
        info!(
            "[{}] test_size={} random_state={}",
            Stage::Split,
            split_config.test_size,
            split_config.random_state
        );
        let split = train_test_split(&x, &y, split_config.test_size, split_config.random_state)
            .map_err(PipelineError::dataset(Stage::Split))?;
        info!("Train={}, Test={}", split.x_train.len(), split.x_test.len());

        info!("[{}] Checking both splits", Stage::ValidateSchema);
        let contract = SchemaContract::from_config(&config.data);
        for (features, target) in [(&split.x_train, &split.y_train), (&split.x_test, &split.y_test)] {
            let joined = features
                .clone()
                .with_column(target.clone())
                .map_err(PipelineError::dataset(Stage::ValidateSchema))?;
            SchemaValidator::validate(&joined, &contract, false)
                .map_err(PipelineError::schema(Stage::ValidateSchema))?;
        }

        info!(
            "[{}] {} -> {}",
            Stage::Transform,
            self.transformer.source(),
            self.transformer.derived()
        );
        let output_contract = self.transformer.output_contract(&contract);
        let x_train = self.transform_split(&split.x_train, &output_contract)?;
        let x_test = self.transform_split(&split.x_test, &output_contract)?;

        Ok(PreparedData {
            x_train,
            x_test,
            y_train: split.y_train,
            y_test: split.y_test,
        })
    }

    /// Transform one split, gate it on the post-transform contract and keep
    /// only the contract's features, in contract order
    fn transform_split(
        &self,
        features: &TabularDataset,
        output_contract: &SchemaContract,
    ) -> Result<TabularDataset, PipelineError> {
        let transformed = self.transformer.transform(features)?;
        SchemaValidator::validate(&transformed, output_contract, true)
            .map_err(PipelineError::schema(Stage::Transform))?;
        transformed
            .select_columns(&output_contract.required_columns)
            .map_err(PipelineError::dataset(Stage::Transform))
    }
}

/// First row of `features` as a column/data JSON document
fn input_example(features: &TabularDataset) -> Result<String, housing_core::DatasetError> {
    let columns = features.column_names();
    let rows = features.head(1).feature_matrix(&columns)?;
    let example = serde_json::json!({
        "columns": columns,
        "data": rows,
    });
    Ok(example.to_string())
}
