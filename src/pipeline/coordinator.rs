//! Pipeline Coordinator - one refuel in, one outcome out

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::alerts::{build_alert, dispatch, AlertEmitter};
use crate::classifier;
use crate::efficiency::compute_reading;
use crate::efficiency::validation::{validate_refuel, RefuelValidationError};
use crate::registry::{RegistryError, VehicleRegistry};
use crate::types::{
    AlertRequest, AnomalyResult, EfficiencyReading, RefuelEvent, Severity, VehicleContext,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Refuel rejected: {0}")]
    Validation(#[from] RefuelValidationError),
}

/// What happened to one refuel event.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Partial refuel, first full tank or unusable interval
    NoReading,
    Classified {
        reading: EfficiencyReading,
        result: AnomalyResult,
        /// Alert handed to the emitter, if any
        alert: Option<AlertRequest>,
    },
}

impl PipelineOutcome {
    pub fn result(&self) -> Option<&AnomalyResult> {
        match self {
            PipelineOutcome::Classified { result, .. } => Some(result),
            PipelineOutcome::NoReading => None,
        }
    }
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub events_processed: u64,
    pub readings_computed: u64,
    pub anomalies_detected: u64,
    pub alerts_emitted: u64,
    pub alerts_failed: u64,
}

#[derive(Default)]
struct Counters {
    events_processed: AtomicU64,
    readings_computed: AtomicU64,
    anomalies_detected: AtomicU64,
    alerts_emitted: AtomicU64,
    alerts_failed: AtomicU64,
}

/// Wires the calculator, registry, classifier and alert emitter together.
pub struct EfficiencyPipeline {
    registry: Arc<VehicleRegistry>,
    emitter: Arc<dyn AlertEmitter>,
    min_severity: Severity,
    counters: Counters,
}

impl EfficiencyPipeline {
    pub fn new(
        registry: Arc<VehicleRegistry>,
        emitter: Arc<dyn AlertEmitter>,
        min_severity: Severity,
    ) -> Self {
        info!(
            emitter = emitter.name(),
            min_severity = %min_severity,
            "Efficiency pipeline initialised"
        );
        Self {
            registry,
            emitter,
            min_severity,
            counters: Counters::default(),
        }
    }

    pub fn registry(&self) -> &Arc<VehicleRegistry> {
        &self.registry
    }

    /// Run one refuel through the pipeline.
    ///
    /// `prior_events` are the vehicle's earlier refuels (other vehicles'
    /// events are ignored). Alert delivery failures are logged and counted,
    /// never returned.
    pub async fn process_refuel(
        &self,
        event: &RefuelEvent,
        prior_events: &[RefuelEvent],
    ) -> Result<PipelineOutcome, PipelineError> {
        self.counters.events_processed.fetch_add(1, Ordering::Relaxed);

        let Some(reading) = compute_reading(&event.vehicle_id, event, prior_events) else {
            return Ok(PipelineOutcome::NoReading);
        };
        self.counters.readings_computed.fetch_add(1, Ordering::Relaxed);

        let value = reading.value;
        let state = self
            .registry
            .submit_reading(&event.vehicle_id, reading)
            .await?;
        let reading =
            EfficiencyReading::new(&event.vehicle_id, value, state.len().saturating_sub(1));

        // Classify against the state this submission published.
        let result = classifier::classify_state(&state, value, self.registry.settings());

        let mut alert = None;
        if result.verdict.is_anomalous() {
            self.counters.anomalies_detected.fetch_add(1, Ordering::Relaxed);
            if let Some(request) = build_alert(&result, self.min_severity) {
                if dispatch(self.emitter.as_ref(), request.clone()).await {
                    self.counters.alerts_emitted.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.alerts_failed.fetch_add(1, Ordering::Relaxed);
                }
                alert = Some(request);
            }
        }

        debug!(
            vehicle_id = %event.vehicle_id,
            odometer_km = event.odometer_km,
            value = reading.value,
            stage = %result.stage,
            anomalous = result.verdict.is_anomalous(),
            "Refuel processed"
        );

        Ok(PipelineOutcome::Classified {
            reading,
            result,
            alert,
        })
    }

    /// Validate a refuel against what is known about the vehicle, then
    /// process it.
    pub async fn process_validated(
        &self,
        event: &RefuelEvent,
        prior_events: &[RefuelEvent],
        context: &VehicleContext,
    ) -> Result<PipelineOutcome, PipelineError> {
        validate_refuel(event, context)?;
        self.process_refuel(event, prior_events).await
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            events_processed: self.counters.events_processed.load(Ordering::Relaxed),
            readings_computed: self.counters.readings_computed.load(Ordering::Relaxed),
            anomalies_detected: self.counters.anomalies_detected.load(Ordering::Relaxed),
            alerts_emitted: self.counters.alerts_emitted.load(Ordering::Relaxed),
            alerts_failed: self.counters.alerts_failed.load(Ordering::Relaxed),
        }
    }
}
