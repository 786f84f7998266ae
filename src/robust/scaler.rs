//! Feature standardisation for the isolation forest.
//!
//! Fitted once over the full efficiency history and stored alongside the
//! forest, so inference scales a new reading with exactly the statistics
//! the forest was trained on.

use serde::{Deserialize, Serialize};

/// Scale floor below which the feature is treated as constant.
const MIN_SCALE: f64 = 1e-12;

/// Zero-mean / unit-variance scaler over a single feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: f64,
    /// Population standard deviation, or 1.0 for a constant feature
    scale: f64,
    count: usize,
}

impl StandardScaler {
    /// Fit on a batch of values using Welford's algorithm.
    pub fn fit(values: &[f64]) -> Self {
        let mut count = 0usize;
        let mut mean = 0.0;
        let mut m2 = 0.0;

        for &x in values {
            count += 1;
            let delta = x - mean;
            mean += delta / count as f64;
            m2 += delta * (x - mean);
        }

        let scale = if count == 0 {
            1.0
        } else {
            let std = (m2 / count as f64).sqrt();
            if std < MIN_SCALE {
                1.0
            } else {
                std
            }
        };

        Self { mean, scale, count }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform(v)).collect()
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Number of samples the scaler was fitted on.
    pub fn count(&self) -> usize {
        self.count
    }
}
