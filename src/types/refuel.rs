//! Refuel event types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single refueling record.
///
/// Immutable once recorded. Per vehicle, events are expected in
/// non-decreasing `odometer_km` order; the efficiency calculator tolerates
/// violations rather than relying on this record to enforce them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefuelEvent {
    /// Vehicle identifier (licence plate in the fleet application)
    pub vehicle_id: String,
    /// Odometer reading at the pump (km)
    pub odometer_km: u64,
    /// Volume dispensed (liters)
    pub liters: Decimal,
    /// Whether the tank was filled completely
    pub is_full_tank: bool,
    /// When the refuel was recorded
    pub timestamp: DateTime<Utc>,
}

impl RefuelEvent {
    pub fn new(
        vehicle_id: impl Into<String>,
        odometer_km: u64,
        liters: Decimal,
        is_full_tank: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            odometer_km,
            liters,
            is_full_tank,
            timestamp,
        }
    }

    /// Whether this event belongs to the given vehicle
    pub fn is_for(&self, vehicle_id: &str) -> bool {
        self.vehicle_id == vehicle_id
    }
}

/// Vehicle facts known to the surrounding application, used by the
/// optional ingestion gate in `efficiency::validation`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleContext {
    /// Last odometer reading recorded for the vehicle (km)
    pub current_odometer_km: Option<u64>,
    /// Tank capacity (liters)
    pub tank_capacity_liters: Option<Decimal>,
}
