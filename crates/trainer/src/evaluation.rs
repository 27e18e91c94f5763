//! Regression metrics

use crate::errors::EstimatorError;

/// Root mean squared error between predictions and held-out targets
pub fn rmse(predictions: &[f64], targets: &[f64]) -> Result<f64, EstimatorError> {
    if predictions.len() != targets.len() {
        return Err(EstimatorError::LengthMismatch {
            features: predictions.len(),
            targets: targets.len(),
        });
    }
    if targets.is_empty() {
        return Err(EstimatorError::EmptyTrainingSet);
    }

    let sum_sq: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (p - t) * (p - t))
        .sum();
    Ok((sum_sq / targets.len() as f64).sqrt())
}
