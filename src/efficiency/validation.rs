//! Ingestion gate for refuel events.
//!
//! Opt-in: `compute_reading` tolerates bad events on its own, this gate lets
//! an ingestion path reject them with a reason before they are recorded.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{RefuelEvent, VehicleContext};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefuelValidationError {
    #[error("Liters must be greater than zero (got {0})")]
    NonPositiveLiters(Decimal),

    #[error("Odometer must be greater than zero")]
    ZeroOdometer,

    #[error("Refuel odometer ({odometer_km} km) is below the vehicle's current odometer ({current_km} km)")]
    OdometerRegression { odometer_km: u64, current_km: u64 },

    #[error("Refuel of {liters} L exceeds tank capacity of {capacity} L")]
    ExceedsTankCapacity { liters: Decimal, capacity: Decimal },
}

/// Check a refuel against basic sanity rules and what is known about the vehicle.
pub fn validate_refuel(
    event: &RefuelEvent,
    context: &VehicleContext,
) -> Result<(), RefuelValidationError> {
    if event.liters <= Decimal::ZERO {
        return Err(RefuelValidationError::NonPositiveLiters(event.liters));
    }
    if event.odometer_km == 0 {
        return Err(RefuelValidationError::ZeroOdometer);
    }
    if let Some(current_km) = context.current_odometer_km {
        if event.odometer_km < current_km {
            return Err(RefuelValidationError::OdometerRegression {
                odometer_km: event.odometer_km,
                current_km,
            });
        }
    }
    if let Some(capacity) = context.tank_capacity_liters {
        if event.liters > capacity {
            return Err(RefuelValidationError::ExceedsTankCapacity {
                liters: event.liters,
                capacity,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn refuel(km: u64, liters: Decimal) -> RefuelEvent {
        RefuelEvent::new("V1", km, liters, true, Utc::now())
    }

    #[test]
    fn test_valid_refuel() {
        let ctx = VehicleContext {
            current_odometer_km: Some(1000),
            tank_capacity_liters: Some(Decimal::new(55, 0)),
        };
        assert!(validate_refuel(&refuel(1000, Decimal::new(4050, 2)), &ctx).is_ok());
        assert!(validate_refuel(&refuel(1, Decimal::ONE), &VehicleContext::default()).is_ok());
    }

    #[test]
    fn test_rejections() {
        let ctx = VehicleContext {
            current_odometer_km: Some(1000),
            tank_capacity_liters: Some(Decimal::new(55, 0)),
        };

        assert_eq!(
            validate_refuel(&refuel(1200, Decimal::ZERO), &ctx),
            Err(RefuelValidationError::NonPositiveLiters(Decimal::ZERO))
        );
        assert_eq!(
            validate_refuel(&refuel(0, Decimal::TEN), &VehicleContext::default()),
            Err(RefuelValidationError::ZeroOdometer)
        );
        assert_eq!(
            validate_refuel(&refuel(900, Decimal::TEN), &ctx),
            Err(RefuelValidationError::OdometerRegression {
                odometer_km: 900,
                current_km: 1000
            })
        );
        assert!(matches!(
            validate_refuel(&refuel(1200, Decimal::new(60, 0)), &ctx),
            Err(RefuelValidationError::ExceedsTankCapacity { .. })
        ));
    }
}
