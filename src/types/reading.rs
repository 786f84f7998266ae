//! Efficiency readings and per-vehicle model state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::baseline::ControlLimits;
use crate::robust::RobustModelArtifact;

/// One km/L value, produced only when a full-tank refuel closes an interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyReading {
    pub vehicle_id: String,
    /// Efficiency in km per liter (> 0)
    pub value: f64,
    /// Position in the vehicle's history (0-based, append-only)
    pub sequence_index: usize,
}

impl EfficiencyReading {
    pub fn new(vehicle_id: impl Into<String>, value: f64, sequence_index: usize) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            value,
            sequence_index,
        }
    }

    /// A reading may enter history only if it is finite and strictly positive.
    pub fn is_valid_value(value: f64) -> bool {
        value.is_finite() && value > 0.0
    }
}

/// Which state of the detection state machine a vehicle is in.
///
/// Ordered: a vehicle only ever moves forward while its history grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DetectionStage {
    /// Too few readings for any threshold
    NotReady,
    /// Control limits available, robust model not (yet) trained
    StatisticalOnly,
    /// Control limits plus isolation forest
    RobustModel,
}

impl std::fmt::Display for DetectionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionStage::NotReady => write!(f, "NOT_READY"),
            DetectionStage::StatisticalOnly => write!(f, "STATISTICAL_ONLY"),
            DetectionStage::RobustModel => write!(f, "ROBUST_MODEL"),
        }
    }
}

/// Everything the pipeline knows about one vehicle.
///
/// Owned by the vehicle registry and mutated only through
/// `VehicleRegistry::submit_reading` (or an explicit retrain).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleModelState {
    pub vehicle_id: String,
    /// Append-only efficiency history
    pub history: Vec<EfficiencyReading>,
    /// Control limits over the whole history (once enough readings exist)
    pub statistical: Option<ControlLimits>,
    /// Isolation forest trained over the whole history (once enough readings exist)
    pub robust: Option<RobustModelArtifact>,
    /// When either model was last (re)trained
    pub trained_at: Option<DateTime<Utc>>,
}

impl VehicleModelState {
    /// Fresh state for a vehicle with no readings yet
    pub fn empty(vehicle_id: impl Into<String>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            history: Vec::new(),
            statistical: None,
            robust: None,
            trained_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Raw history values in sequence order
    pub fn values(&self) -> Vec<f64> {
        self.history.iter().map(|r| r.value).collect()
    }
}
