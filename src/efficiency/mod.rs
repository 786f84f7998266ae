//! Efficiency Calculator - km/L from full-tank intervals
//!
//! A reading is only produced when a full-tank refuel closes an interval
//! opened by an earlier full tank (the anchor). Every liter dispensed in
//! between, partial or full, was burned over that distance:
//!
//! ```text
//! distance     = new.odometer − anchor.odometer
//! liters_total = Σ liters over (anchor.odometer, new.odometer]  (incl. new)
//! value        = round_half_up(distance / liters_total, 2)
//! ```
//!
//! Division and rounding are done in `Decimal` so that 500 / 60 rounds to
//! 8.33 regardless of binary float representation.

pub mod validation;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};

use crate::types::{EfficiencyReading, RefuelEvent};

/// Decimal places kept on an efficiency value.
const VALUE_DECIMALS: u32 = 2;

/// Compute the efficiency reading closed by `new_event`, if any.
///
/// Pure over its inputs. `prior_events` may contain events of other
/// vehicles (ignored) and may already contain `new_event` itself (not
/// counted twice). Returns `None` for a partial refuel, the first full
/// tank, a non-monotonic odometer or a zero liter total.
///
/// The returned `sequence_index` is provisional: the registry assigns the
/// authoritative index when the reading is submitted.
pub fn compute_reading(
    vehicle_id: &str,
    new_event: &RefuelEvent,
    prior_events: &[RefuelEvent],
) -> Option<EfficiencyReading> {
    if !new_event.is_full_tank {
        return None;
    }

    let prior: Vec<&RefuelEvent> = prior_events
        .iter()
        .filter(|e| e.is_for(vehicle_id) && *e != new_event)
        .collect();

    let anchor = prior
        .iter()
        .filter(|e| e.is_full_tank && e.odometer_km < new_event.odometer_km)
        .max_by(|a, b| {
            a.odometer_km
                .cmp(&b.odometer_km)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });

    let Some(anchor) = anchor else {
        if prior.iter().any(|e| e.is_full_tank) {
            warn!(
                vehicle_id,
                odometer_km = new_event.odometer_km,
                "Full tank at or below every earlier full tank, odometer not monotonic"
            );
        } else {
            debug!(vehicle_id, "First full tank, anchor established");
        }
        return None;
    };

    let distance = new_event.odometer_km.saturating_sub(anchor.odometer_km);
    if distance == 0 {
        warn!(
            vehicle_id,
            odometer_km = new_event.odometer_km,
            anchor_km = anchor.odometer_km,
            "Non-positive distance since last full tank"
        );
        return None;
    }

    let burned: Decimal = prior
        .iter()
        .filter(|e| e.odometer_km > anchor.odometer_km && e.odometer_km <= new_event.odometer_km)
        .map(|e| e.liters)
        .sum();
    let liters_total = burned + new_event.liters;
    if liters_total <= Decimal::ZERO {
        warn!(vehicle_id, %liters_total, "Non-positive liter total, no reading");
        return None;
    }

    let value = Decimal::from(distance)
        .checked_div(liters_total)?
        .round_dp_with_strategy(VALUE_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()?;

    if !EfficiencyReading::is_valid_value(value) {
        // e.g. 1 km over 1000 L rounds to 0.00
        warn!(vehicle_id, value, "Efficiency rounds to a non-positive value");
        return None;
    }

    debug!(
        vehicle_id,
        distance_km = distance,
        %liters_total,
        value,
        "Efficiency reading computed"
    );

    Some(EfficiencyReading::new(
        vehicle_id,
        value,
        readings_before(&prior, new_event.odometer_km),
    ))
}

/// Number of readings the full tanks below `odometer_km` already closed.
fn readings_before(prior: &[&RefuelEvent], odometer_km: u64) -> usize {
    let mut full_odometers: Vec<u64> = prior
        .iter()
        .filter(|e| e.is_full_tank && e.odometer_km < odometer_km)
        .map(|e| e.odometer_km)
        .collect();
    full_odometers.sort_unstable();
    full_odometers.dedup();
    full_odometers.len().saturating_sub(1)
}
