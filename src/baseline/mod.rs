//! Statistical Model - Control Limits over Efficiency History
//!
//! Once a vehicle has accumulated `statistical.min_readings` efficiency
//! readings, its control limits are derived from the whole history:
//!
//! ```text
//! lower = max(mean − k·std, floor)
//! upper = mean + k·std
//! ```
//!
//! with `k = 1.5` and `floor = 0.1 km/L` by default. `std` is the population
//! standard deviation.
//!
//! Limits are always recomputed from the entire history, never updated
//! incrementally.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::config::StatisticalConfig;

// ============================================================================
// Control Limits
// ============================================================================

/// Mean/std control limits for one vehicle.
///
/// Invariant: `lower <= mean <= upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlLimits {
    /// Mean efficiency over the history (km/L)
    pub mean: f64,
    /// Population standard deviation (km/L)
    pub std: f64,
    /// Lower control limit (km/L)
    pub lower: f64,
    /// Upper control limit (km/L)
    pub upper: f64,
    /// Number of readings the limits were computed from
    pub sample_count: usize,
}

impl ControlLimits {
    /// Compute limits from a full history of values.
    ///
    /// Returns `None` below the configured minimum, or if any value is
    /// non-finite (history is validated on entry, so that indicates a
    /// corrupt store).
    pub fn from_history(values: &[f64], config: &StatisticalConfig) -> Option<Self> {
        if values.len() < config.min_readings.max(1) {
            return None;
        }
        if values.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let mean = values.iter().mean();
        let std = values.iter().population_std_dev();
        let spread = config.sigma_multiplier * std;

        // The floor may not push the lower limit above the mean.
        let floor = config.lower_floor.min(mean);
        let lower = (mean - spread).max(floor);
        let upper = mean + spread;

        debug!(
            samples = values.len(),
            mean,
            std,
            lower,
            upper,
            "Control limits recomputed"
        );

        Some(Self {
            mean,
            std,
            lower,
            upper,
            sample_count: values.len(),
        })
    }

    /// Whether a value lies outside `[lower, upper]`
    pub fn is_outside(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }

    /// Whether a value lies below the lower limit
    pub fn is_below(&self, value: f64) -> bool {
        value < self.lower
    }

    /// Absolute distance of a value from the mean
    pub fn deviation(&self, value: f64) -> f64 {
        (value - self.mean).abs()
    }
}

// ============================================================================
// Tests
// ============================================================================
