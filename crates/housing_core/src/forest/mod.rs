//! Random forest regression artifacts
//!
//! - `tree`: flat-vector regression trees and traversal
//! - `model`: the ensemble artifact, canonical JSON, hashing and the
//!   [`Predictor`](model::Predictor) trait used by registry consumers

pub mod model;
pub mod tree;

pub use model::{ForestModel, Predictor, MODEL_FORMAT_VERSION};
pub use tree::{Node, Tree};
