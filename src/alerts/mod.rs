//! Alert Decision & Emitters
//!
//! `build_alert` turns an anomalous `AnomalyResult` into an `AlertRequest`
//! when its severity passes the configured gate. Delivery goes through an
//! injected `AlertEmitter`; the core never retries.
//!
//! Emitters:
//! - `LogAlertEmitter`: structured tracing events
//! - `ChannelAlertEmitter` + `AlertDispatcher`: in-process mpsc queue drained
//!   to a downstream emitter, torn down with a `CancellationToken`
//! - `WebhookAlertEmitter`: JSON POST to an HTTP endpoint

mod channel;
mod webhook;

pub use channel::{alert_channel, AlertDispatcher, ChannelAlertEmitter, DispatchStats};
pub use webhook::WebhookAlertEmitter;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::types::{AlertRequest, AnomalyResult, AnomalyVerdict, Severity};

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Alert endpoint returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("Alert channel closed")]
    ChannelClosed,
}

/// Outbound sink for alert requests.
#[async_trait]
pub trait AlertEmitter: Send + Sync {
    async fn emit(&self, alert: AlertRequest) -> Result<(), AlertError>;

    /// Emitter name for logging
    fn name(&self) -> &'static str;
}

/// Alert for `result`, if it is anomalous with severity `>= min_severity`.
pub fn build_alert(result: &AnomalyResult, min_severity: Severity) -> Option<AlertRequest> {
    let AnomalyVerdict::Anomalous { severity, signals } = result.verdict else {
        return None;
    };
    if severity < min_severity {
        return None;
    }

    let mut detectors = Vec::new();
    if signals.statistical {
        detectors.push("control limits");
    }
    if signals.robust {
        detectors.push("isolation forest");
    }

    let bounds = result
        .statistical_snapshot
        .map(|l| format!(" (expected {:.2}–{:.2} km/L)", l.lower, l.upper))
        .unwrap_or_default();

    Some(AlertRequest {
        id: Uuid::new_v4(),
        vehicle_id: result.vehicle_id.clone(),
        reading_value: result.reading_value,
        severity,
        message: format!(
            "{severity} fuel efficiency anomaly for vehicle {}: {:.2} km/L{bounds}, flagged by {}",
            result.vehicle_id,
            result.reading_value,
            detectors.join(" and "),
        ),
        created_at: Utc::now(),
    })
}

/// Hand an alert to an emitter, logging instead of propagating failure.
///
/// Returns whether the emitter accepted the alert.
pub async fn dispatch(emitter: &dyn AlertEmitter, alert: AlertRequest) -> bool {
    let vehicle_id = alert.vehicle_id.clone();
    let alert_id = alert.id;
    match emitter.emit(alert).await {
        Ok(()) => true,
        Err(e) => {
            error!(
                emitter = emitter.name(),
                vehicle_id = %vehicle_id,
                alert_id = %alert_id,
                error = %e,
                "Alert delivery failed"
            );
            false
        }
    }
}

/// Writes every alert as a structured `WARN` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertEmitter;

#[async_trait]
impl AlertEmitter for LogAlertEmitter {
    async fn emit(&self, alert: AlertRequest) -> Result<(), AlertError> {
        warn!(
            alert_id = %alert.id,
            vehicle_id = %alert.vehicle_id,
            reading_value = alert.reading_value,
            severity = %alert.severity,
            "{}",
            alert.message
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
