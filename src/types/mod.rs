//! Shared data structures for the fuel efficiency pipeline
//!
//! - `RefuelEvent`: one refueling record as supplied by the persistence layer
//! - `EfficiencyReading`: km/L value produced when a full tank closes an interval
//! - `VehicleModelState`: per-vehicle history plus trained models
//! - `AnomalyResult` / `AlertRequest`: classifier output and alert boundary

mod anomaly;
mod reading;
mod refuel;

pub use anomaly::*;
pub use reading::*;
pub use refuel::*;
