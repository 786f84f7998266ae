//! Batch replay of recorded refuels.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::info;

use super::coordinator::{EfficiencyPipeline, PipelineOutcome, PipelineStats};
use crate::types::{RefuelEvent, Severity};

/// Totals for one replay run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplaySummary {
    pub vehicles: usize,
    pub events: usize,
    pub readings: usize,
    pub anomalies: usize,
    pub high_severity: usize,
    pub alerts: usize,
}

/// Group events by vehicle and order each group by odometer, then timestamp.
pub fn order_events(events: Vec<RefuelEvent>) -> BTreeMap<String, Vec<RefuelEvent>> {
    let mut by_vehicle: BTreeMap<String, Vec<RefuelEvent>> = BTreeMap::new();
    for event in events {
        by_vehicle
            .entry(event.vehicle_id.clone())
            .or_default()
            .push(event);
    }
    for events in by_vehicle.values_mut() {
        events.sort_by(|a, b| {
            a.odometer_km
                .cmp(&b.odometer_km)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });
    }
    by_vehicle
}

impl EfficiencyPipeline {
    /// Feed a flat list of refuels through the pipeline.
    ///
    /// Vehicles run concurrently; within a vehicle each event sees all of
    /// its predecessors as prior events. Returns every outcome, grouped per
    /// vehicle in processing order.
    pub async fn replay(
        &self,
        events: Vec<RefuelEvent>,
    ) -> Result<(ReplaySummary, Vec<PipelineOutcome>)> {
        let grouped = order_events(events);
        let vehicles = grouped.len();
        let events_total: usize = grouped.values().map(Vec::len).sum();
        info!(vehicles, events = events_total, "Replaying refuel history");

        let per_vehicle = try_join_all(grouped.into_iter().map(|(vehicle_id, events)| async move {
            let mut outcomes = Vec::with_capacity(events.len());
            for (i, event) in events.iter().enumerate() {
                let outcome = self
                    .process_refuel(event, &events[..i])
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to process refuel for {} at {} km",
                            vehicle_id, event.odometer_km
                        )
                    })?;
                outcomes.push(outcome);
            }
            Ok::<_, anyhow::Error>(outcomes)
        }))
        .await?;

        let outcomes: Vec<PipelineOutcome> = per_vehicle.into_iter().flatten().collect();
        let summary = summarise(vehicles, events_total, &outcomes);

        let PipelineStats { alerts_failed, .. } = self.stats();
        info!(
            readings = summary.readings,
            anomalies = summary.anomalies,
            alerts = summary.alerts,
            alerts_failed,
            "Replay complete"
        );
        Ok((summary, outcomes))
    }
}

fn summarise(vehicles: usize, events: usize, outcomes: &[PipelineOutcome]) -> ReplaySummary {
    let mut summary = ReplaySummary {
        vehicles,
        events,
        ..Default::default()
    };
    for outcome in outcomes {
        if let PipelineOutcome::Classified { result, alert, .. } = outcome {
            summary.readings += 1;
            if let Some(severity) = result.verdict.severity() {
                summary.anomalies += 1;
                if severity == Severity::High {
                    summary.high_severity += 1;
                }
            }
            if alert.is_some() {
                summary.alerts += 1;
            }
        }
    }
    summary
}
