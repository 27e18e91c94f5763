//! Random forest regressor
//!
//! Bagged CART regression trees. Each tree draws its bootstrap sample and
//! per-node feature subsets from its own LCG stream, seeded from
//! `random_state` and the tree index, so the fitted model does not depend on
//! how many threads fit it.

use crate::cart::{CartBuilder, TreeConfig};
use crate::errors::EstimatorError;
use housing_core::deterministic::{mix_seed, LcgRng};
use housing_core::{Column, ForestModel, HyperParams, ParamValue, Predictor, TabularDataset, Tree};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// An estimator fits a predictor from features and a target column
pub trait Estimator {
    type Model: Predictor;

    fn fit(&self, x: &TabularDataset, y: &Column) -> Result<Self::Model, EstimatorError>;
}

/// Features considered per split
#[derive(Clone, Debug, PartialEq)]
pub enum MaxFeatures {
    All,
    Count(usize),
    Fraction(f64),
    Sqrt,
    Log2,
}

impl MaxFeatures {
    /// Resolve against the number of input features, never below one
    pub fn resolve(&self, feature_count: usize) -> usize {
        let n = feature_count.max(1);
        let k = match self {
            MaxFeatures::All => n,
            MaxFeatures::Count(k) => *k,
            MaxFeatures::Fraction(f) => (f * n as f64).floor() as usize,
            MaxFeatures::Sqrt => (n as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n as f64).log2().floor() as usize,
        };
        k.clamp(1, n)
    }
}

/// Typed random-forest hyperparameters
#[derive(Clone, Debug, PartialEq)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: Option<i64>,
    /// `None` and `Some(1)` fit sequentially; `Some(-1)` uses every core
    pub n_jobs: Option<i64>,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            random_state: None,
            n_jobs: None,
        }
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> EstimatorError {
    EstimatorError::InvalidParam {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn positive_int(name: &str, value: &ParamValue, min: i64) -> Result<usize, EstimatorError> {
    match value.as_i64() {
        Some(v) if v >= min => Ok(v as usize),
        _ => Err(invalid(name, format!("expected an integer >= {min}, got {value}"))),
    }
}

fn optional_int(name: &str, value: &ParamValue) -> Result<Option<i64>, EstimatorError> {
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_i64()
        .map(Some)
        .ok_or_else(|| invalid(name, format!("expected an integer or null, got {value}")))
}

impl RandomForestParams {
    /// Interpret hyperparameters, rejecting unknown names and ill-typed values
    pub fn from_hyperparams(params: &HyperParams) -> Result<Self, EstimatorError> {
        let mut out = Self::default();

        for (name, value) in params {
            match name.as_str() {
                "n_estimators" => out.n_estimators = positive_int(name, value, 1)?,
                "max_depth" => {
                    out.max_depth = if value.is_null() {
                        None
                    } else {
                        Some(positive_int(name, value, 1)?)
                    }
                }
                "min_samples_split" => out.min_samples_split = positive_int(name, value, 2)?,
                "min_samples_leaf" => out.min_samples_leaf = positive_int(name, value, 1)?,
                "max_features" => out.max_features = parse_max_features(value)?,
                "bootstrap" => {
                    out.bootstrap = value
                        .as_bool()
                        .ok_or_else(|| invalid(name, format!("expected a boolean, got {value}")))?
                }
                "random_state" => out.random_state = optional_int(name, value)?,
                "n_jobs" => {
                    out.n_jobs = optional_int(name, value)?;
                    if matches!(out.n_jobs, Some(j) if j == 0 || j < -1) {
                        return Err(invalid(name, "must be -1, null or a positive integer"));
                    }
                }
                other => return Err(EstimatorError::UnknownParam(other.to_string())),
            }
        }

        Ok(out)
    }

    fn tree_config(&self, feature_count: usize) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features.resolve(feature_count),
        }
    }
}

fn parse_max_features(value: &ParamValue) -> Result<MaxFeatures, EstimatorError> {
    const NAME: &str = "max_features";
    match value {
        ParamValue::Null => Ok(MaxFeatures::All),
        ParamValue::Int(k) if *k >= 1 => Ok(MaxFeatures::Count(*k as usize)),
        ParamValue::Float(f) if *f > 0.0 && *f <= 1.0 => Ok(MaxFeatures::Fraction(*f)),
        ParamValue::Text(s) if s == "sqrt" => Ok(MaxFeatures::Sqrt),
        ParamValue::Text(s) if s == "log2" => Ok(MaxFeatures::Log2),
        other => Err(invalid(
            NAME,
            format!("expected null, an integer >= 1, a fraction in (0, 1], \"sqrt\" or \"log2\", got {other}"),
        )),
    }
}

/// Random forest regressor configured from model hyperparameters
#[derive(Clone, Debug)]
pub struct RandomForestRegressor {
    params: RandomForestParams,
    /// Hyperparameters as given, recorded on the fitted model
    raw_params: BTreeMap<String, String>,
}

impl RandomForestRegressor {
    pub fn new(params: RandomForestParams) -> Self {
        Self {
            params,
            raw_params: BTreeMap::new(),
        }
    }

    /// Build from hyperparameters, keeping their textual form for the artifact
    pub fn from_hyperparams(params: &HyperParams) -> Result<Self, EstimatorError> {
        Ok(Self {
            params: RandomForestParams::from_hyperparams(params)?,
            raw_params: params
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect(),
        })
    }

    pub fn params(&self) -> &RandomForestParams {
        &self.params
    }

    fn fit_tree(
        &self,
        tree_idx: usize,
        features: &[Vec<f64>],
        targets: &[f64],
        config: &TreeConfig,
    ) -> Tree {
        let seed = mix_seed(self.params.random_state.unwrap_or(0), tree_idx as u64);
        let mut rng = LcgRng::new(seed);
        let n = targets.len();

        let sample: Vec<usize> = if self.params.bootstrap {
            (0..n).map(|_| rng.next_index(n)).collect()
        } else {
            (0..n).collect()
        };

        let tree = CartBuilder::new(features, targets, config.clone()).build(&sample, &mut rng);
        debug!(
            "Fitted tree {}/{}: {} nodes, depth {}",
            tree_idx + 1,
            self.params.n_estimators,
            tree.nodes.len(),
            tree.depth()
        );
        tree
    }

    fn fit_trees(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
        config: &TreeConfig,
    ) -> Result<Vec<Tree>, EstimatorError> {
        let count = self.params.n_estimators;
        match self.params.n_jobs {
            None | Some(1) => Ok((0..count)
                .map(|i| self.fit_tree(i, features, targets, config))
                .collect()),
            Some(jobs) => {
                // Zero lets rayon pick one thread per core
                let threads = if jobs < 0 { 0 } else { jobs as usize };
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| EstimatorError::ThreadPool(e.to_string()))?;
                Ok(pool.install(|| {
                    (0..count)
                        .into_par_iter()
                        .map(|i| self.fit_tree(i, features, targets, config))
                        .collect::<Vec<Tree>>()
                }))
            }
        }
    }
}

fn check_finite(name: &str, values: impl IntoIterator<Item = f64>) -> Result<(), EstimatorError> {
    match values.into_iter().position(|v| !v.is_finite()) {
        Some(row) => Err(EstimatorError::NonFinite {
            column: name.to_string(),
            row,
        }),
        None => Ok(()),
    }
}

impl Estimator for RandomForestRegressor {
    type Model = ForestModel;

    fn fit(&self, x: &TabularDataset, y: &Column) -> Result<ForestModel, EstimatorError> {
        if x.is_empty() {
            return Err(EstimatorError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(EstimatorError::LengthMismatch {
                features: x.len(),
                targets: y.len(),
            });
        }

        let feature_names = x.column_names();
        let features = x.feature_matrix(&feature_names)?;
        let targets = y.to_f64()?;

        for (idx, name) in feature_names.iter().enumerate() {
            check_finite(name, features.iter().map(|row| row[idx]))?;
        }
        check_finite(&y.name, targets.iter().copied())?;

        let config = self.params.tree_config(feature_names.len());
        info!(
            "Fitting {} trees on {} rows x {} features (max_features={}, bootstrap={})",
            self.params.n_estimators,
            x.len(),
            feature_names.len(),
            config.max_features,
            self.params.bootstrap
        );

        let trees = self.fit_trees(&features, &targets, &config)?;
        let model = ForestModel::new(feature_names, trees, self.raw_params.clone());
        model.validate()?;
        Ok(model)
    }
}
