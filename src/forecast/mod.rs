//! Consumption Forecast - expected efficiency for a vehicle's next trip
//!
//! The forecast is the historical mean, with its spread as an error
//! estimate. Once there are enough readings, an ordinary least-squares line
//! over `(sequence_index, value)` shows whether efficiency is drifting.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::defaults::TREND_MIN_READINGS;
use crate::types::VehicleModelState;

/// Forecast for one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionForecast {
    pub vehicle_id: String,
    pub readings: usize,
    /// Mean of the history (km/L)
    pub expected_km_per_liter: Option<f64>,
    /// Root-mean-square deviation from the mean; needs 2+ readings
    pub rmse: Option<f64>,
    /// Efficiency of the supplied current trip (km/L)
    pub current_km_per_liter: Option<f64>,
    /// `|current − expected|`
    pub absolute_gap: Option<f64>,
    pub trend: Option<TrendLine>,
}

/// Least-squares line `value = intercept + slope · sequence_index`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    /// km/L gained (or lost, if negative) per reading
    pub slope: f64,
    pub intercept: f64,
    /// Fitted value at the next sequence index
    pub next_value: f64,
    /// Residual RMSE of the fit
    pub rmse: f64,
}

impl TrendLine {
    /// Fit over `values` indexed 0..n. `None` below the minimum or when
    /// all x are equal.
    pub fn fit(values: &[f64]) -> Option<Self> {
        let n = values.len();
        if n < TREND_MIN_READINGS {
            return None;
        }

        let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let x_mean = xs.iter().mean();
        let y_mean = values.iter().mean();

        let (sxy, sxx) = xs
            .iter()
            .zip(values)
            .fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
                let dx = x - x_mean;
                (sxy + dx * (y - y_mean), sxx + dx * dx)
            });
        if sxx <= 0.0 {
            return None;
        }

        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;
        let sse: f64 = xs
            .iter()
            .zip(values)
            .map(|(x, y)| {
                let residual = y - (intercept + slope * x);
                residual * residual
            })
            .sum();

        Some(Self {
            slope,
            intercept,
            next_value: intercept + slope * n as f64,
            rmse: (sse / n as f64).sqrt(),
        })
    }
}

/// Forecast consumption for `state`, optionally comparing a current trip
/// given as `(distance_km, liters)`.
pub fn predict_consumption(
    state: &VehicleModelState,
    current: Option<(f64, f64)>,
) -> ConsumptionForecast {
    let values = state.values();

    let expected = (!values.is_empty()).then(|| values.iter().mean());
    let rmse = (values.len() >= 2).then(|| values.iter().population_std_dev());

    let current_km_per_liter = current
        .filter(|(distance, liters)| *liters > 0.0 && distance.is_finite() && liters.is_finite())
        .map(|(distance, liters)| distance / liters);
    let absolute_gap = match (current_km_per_liter, expected, rmse) {
        // A single reading has no spread to compare against.
        (Some(now), Some(mean), Some(_)) => Some((now - mean).abs()),
        _ => None,
    };

    ConsumptionForecast {
        vehicle_id: state.vehicle_id.clone(),
        readings: values.len(),
        expected_km_per_liter: expected,
        rmse,
        current_km_per_liter,
        absolute_gap,
        trend: TrendLine::fit(&values),
    }
}
