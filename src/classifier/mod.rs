//! Anomaly Classifier - combines the statistical and robust models
//!
//! State machine per vehicle, driven by history length:
//!
//! ```text
//! NotReady ──(n ≥ 10)──▶ StatisticalOnly ──(n ≥ 30, forest trained)──▶ RobustModel
//! ```
//!
//! In `RobustModel` a reading is anomalous if EITHER detector fires (OR,
//! never AND).
//!
//! ## Severity
//!
//! Severity comes from the control limits, whichever detector fired:
//!
//! | Condition                     | Severity |
//! |-------------------------------|----------|
//! | `value < lower × 0.8`         | HIGH     |
//! | any other anomalous reading   | MEDIUM   |
//!
//! Only the LOW side escalates to HIGH. A reading far above `upper` (a
//! vehicle suddenly doing many more km per liter) stays MEDIUM. Whether
//! excess efficiency should also escalate is unresolved.

use tracing::debug;

use crate::baseline::ControlLimits;
use crate::config::{ModelSettings, StatisticalConfig};
use crate::types::{
    AnomalyResult, AnomalyVerdict, DetectionStage, DetectorSignals, Severity, VehicleModelState,
};

/// Which stage a vehicle's state is in.
pub fn stage_for(state: &VehicleModelState, settings: &ModelSettings) -> DetectionStage {
    let n = state.len();
    if n < settings.statistical.min_readings || state.statistical.is_none() {
        DetectionStage::NotReady
    } else if n >= settings.robust.min_readings && state.robust.is_some() {
        DetectionStage::RobustModel
    } else {
        DetectionStage::StatisticalOnly
    }
}

/// Severity of an anomalous reading.
///
/// Asymmetric on purpose: see the module docs.
pub fn severity_for(value: f64, limits: &ControlLimits, config: &StatisticalConfig) -> Severity {
    if value < limits.lower * config.high_severity_factor {
        Severity::High
    } else {
        Severity::Medium
    }
}

/// Classify `value` against a vehicle's current state.
///
/// `value` must be finite; the registry rejects anything else before
/// calling in.
pub fn classify_state(
    state: &VehicleModelState,
    value: f64,
    settings: &ModelSettings,
) -> AnomalyResult {
    let stage = stage_for(state, settings);

    let limits = match (stage, state.statistical) {
        (DetectionStage::NotReady, _) | (_, None) => {
            return AnomalyResult::not_ready(&state.vehicle_id, value);
        }
        (_, Some(limits)) => limits,
    };

    let mut signals = DetectorSignals {
        statistical: limits.is_outside(value),
        robust: false,
    };

    let robust_score = match (stage, state.robust.as_ref()) {
        (DetectionStage::RobustModel, Some(model)) => {
            let score = model.score(value);
            signals.robust = score > model.score_threshold;
            Some(score)
        }
        _ => None,
    };

    let verdict = if signals.any() {
        AnomalyVerdict::Anomalous {
            severity: severity_for(value, &limits, &settings.statistical),
            signals,
        }
    } else {
        AnomalyVerdict::Normal
    };

    debug!(
        vehicle_id = %state.vehicle_id,
        value,
        %stage,
        lower = limits.lower,
        upper = limits.upper,
        robust_score,
        anomalous = verdict.is_anomalous(),
        "Reading classified"
    );

    AnomalyResult {
        vehicle_id: state.vehicle_id.clone(),
        reading_value: value,
        stage,
        verdict,
        statistical_snapshot: Some(limits),
        robust_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robust::RobustModelArtifact;
    use crate::types::EfficiencyReading;

    fn state_with(values: &[f64], settings: &ModelSettings) -> VehicleModelState {
        let mut state = VehicleModelState::empty("V1");
        state.history = values
            .iter()
            .enumerate()
            .map(|(i, v)| EfficiencyReading::new("V1", *v, i))
            .collect();
        state.statistical = ControlLimits::from_history(values, &settings.statistical);
        state.robust = RobustModelArtifact::train(values, &settings.robust).ok();
        state
    }

    #[test]
    fn test_not_ready_never_flags() {
        let settings = ModelSettings::default();
        let state = state_with(&[10.0; 9], &settings);
        let result = classify_state(&state, 0.5, &settings);
        assert_eq!(result.verdict, AnomalyVerdict::NotReady);
        assert_eq!(result.stage, DetectionStage::NotReady);
        assert!(result.statistical_snapshot.is_none());
    }

    #[test]
    fn test_constant_history_scenario() {
        let settings = ModelSettings::default();
        let state = state_with(&[10.0; 10], &settings);
        assert_eq!(stage_for(&state, &settings), DetectionStage::StatisticalOnly);

        let normal = classify_state(&state, 10.0, &settings);
        assert_eq!(normal.verdict, AnomalyVerdict::Normal);

        let low = classify_state(&state, 5.0, &settings);
        assert_eq!(low.verdict.severity(), Some(Severity::High));
        assert_eq!(
            low.verdict,
            AnomalyVerdict::Anomalous {
                severity: Severity::High,
                signals: DetectorSignals {
                    statistical: true,
                    robust: false
                }
            }
        );
    }

    #[test]
    fn test_high_side_stays_medium() {
        let settings = ModelSettings::default();
        let state = state_with(&[10.0; 10], &settings);

        let result = classify_state(&state, 50.0, &settings);
        assert_eq!(result.verdict.severity(), Some(Severity::Medium));
    }

    #[test]
    fn test_low_side_between_limit_and_factor_is_medium() {
        let settings = ModelSettings::default();
        let state = state_with(&[10.0; 10], &settings);

        // 8.5 < lower (10.0) but not < 10.0 × 0.8
        let result = classify_state(&state, 8.5, &settings);
        assert_eq!(result.verdict.severity(), Some(Severity::Medium));
    }

    #[test]
    fn test_robust_stage_uses_forest() {
        let settings = ModelSettings::default();
        let state = state_with(&[10.0; 30], &settings);
        assert_eq!(stage_for(&state, &settings), DetectionStage::RobustModel);

        let result = classify_state(&state, 10.0, &settings);
        assert_eq!(result.stage, DetectionStage::RobustModel);
        assert_eq!(result.verdict, AnomalyVerdict::Normal);
        assert!(result.robust_score.is_some());
    }

    #[test]
    fn test_missing_artifact_falls_back_to_statistical() {
        let settings = ModelSettings::default();
        let mut state = state_with(&[10.0; 35], &settings);
        state.robust = None;

        let result = classify_state(&state, 10.0, &settings);
        assert_eq!(result.stage, DetectionStage::StatisticalOnly);
        assert!(result.robust_score.is_none());
    }

    #[test]
    fn test_forest_flags_reading_inside_limits() {
        let settings = ModelSettings::default();
        let mut values = vec![8.0; 20];
        values.extend([12.0; 20]);
        let state = state_with(&values, &settings);

        // Limits are 7.0 .. 13.0; 10.0 sits between the two clusters.
        let result = classify_state(&state, 10.0, &settings);
        assert_eq!(result.stage, DetectionStage::RobustModel);
        assert_eq!(
            result.verdict,
            AnomalyVerdict::Anomalous {
                severity: Severity::Medium,
                signals: DetectorSignals {
                    statistical: false,
                    robust: true
                }
            }
        );
        assert!(result.robust_score.is_some_and(|score| score > 0.5));
    }
}
