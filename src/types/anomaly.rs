//! Classifier verdicts and the alert boundary type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DetectionStage;
use crate::baseline::ControlLimits;

// ============================================================================
// Severity
// ============================================================================

/// Coarse severity tier of an anomalous reading.
///
/// Ordered so that `High > Medium`, which lets the alert gate compare
/// against a configured minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

// ============================================================================
// Verdict
// ============================================================================

/// Which detectors flagged a reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorSignals {
    /// Reading fell outside the control limits
    pub statistical: bool,
    /// Isolation forest predicted an outlier
    pub robust: bool,
}

impl DetectorSignals {
    pub fn any(&self) -> bool {
        self.statistical || self.robust
    }
}

/// Tagged classification outcome.
///
/// `NotReady` is an expected steady state for new vehicles, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum AnomalyVerdict {
    NotReady,
    Normal,
    Anomalous {
        severity: Severity,
        signals: DetectorSignals,
    },
}

impl AnomalyVerdict {
    pub fn is_anomalous(&self) -> bool {
        matches!(self, AnomalyVerdict::Anomalous { .. })
    }

    pub fn severity(&self) -> Option<Severity> {
        match self {
            AnomalyVerdict::Anomalous { severity, .. } => Some(*severity),
            _ => None,
        }
    }
}

/// Result of classifying one reading for one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub vehicle_id: String,
    pub reading_value: f64,
    /// State-machine state that produced the verdict
    pub stage: DetectionStage,
    pub verdict: AnomalyVerdict,
    /// Control limits in effect when the reading was classified
    pub statistical_snapshot: Option<ControlLimits>,
    /// Isolation-forest anomaly score in [0, 1] (only in `RobustModel` stage)
    pub robust_score: Option<f64>,
}

impl AnomalyResult {
    pub fn not_ready(vehicle_id: &str, reading_value: f64) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            reading_value,
            stage: DetectionStage::NotReady,
            verdict: AnomalyVerdict::NotReady,
            statistical_snapshot: None,
            robust_score: None,
        }
    }
}

// ============================================================================
// Alert Request
// ============================================================================

/// Request handed to the external alert emitter.
///
/// The core does not retry or guarantee delivery. `id` is unique per
/// request so a collaborator can deduplicate its own retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub id: Uuid,
    pub vehicle_id: String,
    pub reading_value: f64,
    pub severity: Severity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
