//! Experiment tracking and model registry for the housing pipeline
//!
//! Modules:
//! - `tracking`: the [`TrackingClient`] interface, run and version records
//! - `memory`: shared in-memory backend with fault injection
//! - `storage`: directory backend with atomic version publishing
//! - `backend`: backend selection from `HOUSING_TRACKING_URI`
//! - `contract`: the registered-model contract check
//! - `errors`: error types

pub mod backend;
pub mod contract;
pub mod errors;
pub mod memory;
pub mod storage;
pub mod tracking;

pub use backend::{open_from_env, TrackingUri, DEFAULT_TRACKING_URI, TRACKING_URI_ENV};
pub use contract::{latest_version, ContractReport, ContractSample, ContractTester, ContractViolation};
pub use errors::TrackingError;
pub use memory::{InMemoryTracking, Operation};
pub use storage::FileTracking;
pub use tracking::{
    ModelUri, ModelVersionRecord, RunHandle, RunRecord, RunStatus, TrackingClient,
};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
