//! System-wide default constants.
//!
//! Grouped by subsystem. Every value here can be overridden in
//! `fuelwatch.toml`; these are what apply when no file is present.

// ============================================================================
// Statistical Model
// ============================================================================

/// Readings required before control limits are computed.
pub const STATISTICAL_MIN_READINGS: usize = 10;

/// Control limits sit at `mean ± SIGMA_MULTIPLIER · std`.
pub const SIGMA_MULTIPLIER: f64 = 1.5;

/// Lower control limit never drops below this (km/L).
pub const LOWER_LIMIT_FLOOR: f64 = 0.1;

/// A reading below `lower × HIGH_SEVERITY_FACTOR` is `HIGH` severity.
pub const HIGH_SEVERITY_FACTOR: f64 = 0.8;

// ============================================================================
// Robust Model (isolation forest)
// ============================================================================

/// Readings required before the isolation forest is trained.
pub const ROBUST_MIN_READINGS: usize = 30;

/// Retrain every N submissions past the minimum (1 = every insert).
pub const ROBUST_RETRAIN_EVERY: usize = 1;

/// Trees in the forest.
pub const ISOLATION_TREES: usize = 100;

/// Subsample size per tree (capped by history length).
pub const ISOLATION_MAX_SAMPLES: usize = 256;

/// Anomaly score above which the forest flags an outlier.
///
/// 0.5 is the score of a point with average path length.
pub const ISOLATION_SCORE_THRESHOLD: f64 = 0.5;

/// RNG seed for tree construction. Fixed so retraining is reproducible.
pub const ISOLATION_SEED: u64 = 42;

// ============================================================================
// Alerts
// ============================================================================

/// Capacity of the in-process alert channel.
pub const ALERT_CHANNEL_CAPACITY: usize = 256;

/// HTTP timeout for webhook delivery (seconds).
pub const ALERT_HTTP_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Storage
// ============================================================================

/// Default sled directory for vehicle state.
pub const DATA_DIR: &str = "./data/fuelwatch";

// ============================================================================
// Forecast
// ============================================================================

/// Readings required before a linear trend is fitted.
pub const TREND_MIN_READINGS: usize = 5;
