//! Robust Model - Isolation Forest over Standardised Efficiency
//!
//! Trained once a vehicle has `robust.min_readings` readings, always over the
//! full history. The artifact keeps the scaler it was fitted with so that a
//! new reading is standardised exactly like the training data.

mod forest;
mod scaler;

pub use forest::{average_path_length, IsolationForest, IsolationTree};
pub use scaler::StandardScaler;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::RobustConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RobustModelError {
    #[error("Robust model needs at least {required} readings, got {available}")]
    InsufficientSamples { required: usize, available: usize },

    #[error("History contains non-finite values")]
    NonFiniteHistory,
}

/// A trained isolation forest plus its feature scaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustModelArtifact {
    scaler: StandardScaler,
    forest: IsolationForest,
    /// Number of readings the model was trained on
    pub trained_on: usize,
    /// Score above which `is_outlier` returns true
    pub score_threshold: f64,
}

impl RobustModelArtifact {
    /// Train over the full history.
    ///
    /// Identical `values` and `config` always produce an identical artifact.
    pub fn train(values: &[f64], config: &RobustConfig) -> Result<Self, RobustModelError> {
        let required = config.min_readings.max(2);
        if values.len() < required {
            return Err(RobustModelError::InsufficientSamples {
                required,
                available: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(RobustModelError::NonFiniteHistory);
        }

        let scaler = StandardScaler::fit(values);
        let scaled = scaler.transform_all(values);
        let forest = IsolationForest::fit(
            &scaled,
            config.n_trees.max(1),
            config.max_samples,
            config.seed,
        );

        debug!(
            samples = values.len(),
            trees = forest.n_trees(),
            sample_size = forest.sample_size(),
            "Isolation forest trained"
        );

        Ok(Self {
            scaler,
            forest,
            trained_on: values.len(),
            score_threshold: config.score_threshold,
        })
    }

    /// Anomaly score of a raw (unscaled) reading.
    pub fn score(&self, value: f64) -> f64 {
        self.forest.score(self.scaler.transform(value))
    }

    pub fn is_outlier(&self, value: f64) -> bool {
        self.score(value) > self.score_threshold
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// 60 readings clustered around 10 km/L.
    fn history() -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(11);
        (0..60)
            .map(|_| {
                let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                let u2: f64 = rng.gen();
                10.0 + 0.4 * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
            })
            .collect()
    }

    #[test]
    fn test_insufficient_samples() {
        let err = RobustModelArtifact::train(&[10.0; 29], &RobustConfig::default()).unwrap_err();
        assert_eq!(
            err,
            RobustModelError::InsufficientSamples {
                required: 30,
                available: 29
            }
        );
    }

    #[test]
    fn test_far_reading_is_outlier() {
        let model = RobustModelArtifact::train(&history(), &RobustConfig::default()).unwrap();
        assert_eq!(model.trained_on, 60);
        assert!(model.is_outlier(25.0));
        assert!(model.score(25.0) > model.score(10.0));
    }

    #[test]
    fn test_retrain_is_reproducible() {
        let config = RobustConfig::default();
        let a = RobustModelArtifact::train(&history(), &config).unwrap();
        let b = RobustModelArtifact::train(&history(), &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_artifact_serde_round_trip() {
        let model = RobustModelArtifact::train(&history(), &RobustConfig::default()).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let back: RobustModelArtifact = serde_json::from_str(&json).unwrap();
        assert!((back.score(12.0) - model.score(12.0)).abs() < 1e-9);
    }
}
