//! FuelWatch Configuration Module
//!
//! Model and alerting parameters loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `FUELWATCH_CONFIG` environment variable (path to TOML file)
//! 2. `fuelwatch.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! The binary calls `config::init()` once at startup. Library types never
//! read the global; they take their settings explicitly:
//!
//! ```ignore
//! config::init(FuelWatchConfig::load());
//! let registry = VehicleRegistry::new(store, config::get().model_settings());
//! ```

mod fuel_config;
pub mod defaults;
pub mod validation;

pub use fuel_config::*;

use std::sync::OnceLock;

/// Global configuration, initialized once at startup.
static FUELWATCH_CONFIG: OnceLock<FuelWatchConfig> = OnceLock::new();

/// Initialize the global configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: FuelWatchConfig) {
    if FUELWATCH_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get the global configuration, or the built-in defaults when `init()`
/// has not been called.
pub fn get() -> &'static FuelWatchConfig {
    FUELWATCH_CONFIG.get_or_init(FuelWatchConfig::default)
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    FUELWATCH_CONFIG.get().is_some()
}
