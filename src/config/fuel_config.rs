//! FuelWatch Configuration - model thresholds and alerting as TOML values
//!
//! Each struct implements `Default` with the built-in constants from
//! `defaults.rs`, so a missing file or a missing section changes nothing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::types::Severity;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "FUELWATCH_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "fuelwatch.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `FuelWatchConfig::load()` which searches:
/// 1. `$FUELWATCH_CONFIG`
/// 2. `./fuelwatch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FuelWatchConfig {
    /// Control-limit model
    #[serde(default)]
    pub statistical: StatisticalConfig,

    /// Isolation forest model
    #[serde(default)]
    pub robust: RobustConfig,

    /// Alert gate and delivery
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Vehicle state persistence
    #[serde(default)]
    pub storage: StorageConfig,
}

impl FuelWatchConfig {
    /// Load configuration using the standard search order, falling back to
    /// defaults on any error.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys only produce warnings; range violations are errors.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to TOML (used by `fuelwatch config`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Settings the vehicle registry needs.
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            statistical: self.statistical.clone(),
            robust: self.robust.clone(),
        }
    }

    /// Validate value ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();
        let s = &self.statistical;
        let r = &self.robust;

        if s.min_readings < 2 {
            errors.push(format!(
                "statistical.min_readings ({}) must be at least 2",
                s.min_readings
            ));
        }
        if !(s.sigma_multiplier.is_finite() && s.sigma_multiplier > 0.0) {
            errors.push(format!(
                "statistical.sigma_multiplier ({}) must be positive",
                s.sigma_multiplier
            ));
        }
        if !(s.lower_floor.is_finite() && s.lower_floor >= 0.0) {
            errors.push(format!(
                "statistical.lower_floor ({}) must be non-negative",
                s.lower_floor
            ));
        }
        if !(s.high_severity_factor > 0.0 && s.high_severity_factor <= 1.0) {
            errors.push(format!(
                "statistical.high_severity_factor ({}) must be in (0, 1]",
                s.high_severity_factor
            ));
        }

        if r.min_readings < s.min_readings {
            errors.push(format!(
                "robust.min_readings ({}) must be >= statistical.min_readings ({})",
                r.min_readings, s.min_readings
            ));
        }
        if r.retrain_every == 0 {
            errors.push("robust.retrain_every must be at least 1".to_string());
        }
        if r.n_trees == 0 {
            errors.push("robust.n_trees must be at least 1".to_string());
        }
        if r.max_samples < 2 {
            errors.push(format!(
                "robust.max_samples ({}) must be at least 2",
                r.max_samples
            ));
        }
        if !(r.score_threshold > 0.0 && r.score_threshold < 1.0) {
            errors.push(format!(
                "robust.score_threshold ({}) must be in (0, 1)",
                r.score_threshold
            ));
        }

        if self.alerts.channel_capacity == 0 {
            errors.push("alerts.channel_capacity must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Statistical Model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalConfig {
    /// Readings required before control limits exist
    pub min_readings: usize,
    /// Multiple of std on either side of the mean
    pub sigma_multiplier: f64,
    /// Floor for the lower control limit (km/L)
    pub lower_floor: f64,
    /// `value < lower × factor` escalates to HIGH severity
    pub high_severity_factor: f64,
}

impl Default for StatisticalConfig {
    fn default() -> Self {
        Self {
            min_readings: defaults::STATISTICAL_MIN_READINGS,
            sigma_multiplier: defaults::SIGMA_MULTIPLIER,
            lower_floor: defaults::LOWER_LIMIT_FLOOR,
            high_severity_factor: defaults::HIGH_SEVERITY_FACTOR,
        }
    }
}

// ============================================================================
// Robust Model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustConfig {
    /// Readings required before the forest is trained
    pub min_readings: usize,
    /// Retrain cadence past `min_readings` (1 = every insert)
    pub retrain_every: usize,
    /// Number of isolation trees
    pub n_trees: usize,
    /// Subsample size per tree
    pub max_samples: usize,
    /// Anomaly score above which a reading is an outlier
    pub score_threshold: f64,
    /// Seed for reproducible training
    pub seed: u64,
}

impl Default for RobustConfig {
    fn default() -> Self {
        Self {
            min_readings: defaults::ROBUST_MIN_READINGS,
            retrain_every: defaults::ROBUST_RETRAIN_EVERY,
            n_trees: defaults::ISOLATION_TREES,
            max_samples: defaults::ISOLATION_MAX_SAMPLES,
            score_threshold: defaults::ISOLATION_SCORE_THRESHOLD,
            seed: defaults::ISOLATION_SEED,
        }
    }
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Lowest severity that produces an alert request
    pub min_severity: Severity,
    /// Optional webhook receiving alert requests as JSON
    pub webhook_url: Option<String>,
    /// In-process alert channel capacity
    pub channel_capacity: usize,
    /// Webhook HTTP timeout (seconds)
    pub http_timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            min_severity: Severity::Medium,
            webhook_url: None,
            channel_capacity: defaults::ALERT_CHANNEL_CAPACITY,
            http_timeout_secs: defaults::ALERT_HTTP_TIMEOUT_SECS,
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// sled database directory
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DATA_DIR),
        }
    }
}

// ============================================================================
// Model Settings
// ============================================================================

/// The subset of configuration that governs model lifecycle and
/// classification, handed explicitly to the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSettings {
    pub statistical: StatisticalConfig,
    pub robust: RobustConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FuelWatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.statistical.min_readings, 10);
        assert_eq!(config.robust.min_readings, 30);
        assert!((config.statistical.sigma_multiplier - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FuelWatchConfig::from_toml_str(
            r#"
            [robust]
            retrain_every = 5

            [alerts]
            min_severity = "high"
            "#,
        )
        .unwrap();

        assert_eq!(config.robust.retrain_every, 5);
        assert_eq!(config.robust.n_trees, defaults::ISOLATION_TREES);
        assert_eq!(config.alerts.min_severity, Severity::High);
        assert_eq!(config.statistical, StatisticalConfig::default());
    }

    #[test]
    fn test_robust_below_statistical_rejected() {
        let result = FuelWatchConfig::from_toml_str(
            r#"
            [statistical]
            min_readings = 20

            [robust]
            min_readings = 15
            "#,
        );
        match result {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("robust.min_readings")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_toml_round_trip() {
        let config = FuelWatchConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = FuelWatchConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
