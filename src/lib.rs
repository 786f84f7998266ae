//! FuelWatch: Fleet Fuel Efficiency & Consumption Anomaly Detection
//!
//! Turns irregular refuel records into km/L readings and flags abnormal
//! consumption per vehicle.
//!
//! ## Architecture
//!
//! - **Efficiency Calculator** (`efficiency`): full-tank to full-tank km/L
//! - **Vehicle Registry** (`registry`): append-only history and model lifecycle
//! - **Statistical Model** (`baseline`): mean ± 1.5σ control limits
//! - **Robust Model** (`robust`): isolation forest over standardised readings
//! - **Anomaly Classifier** (`classifier`): NotReady → StatisticalOnly → RobustModel
//! - **Alerts** (`alerts`): severity gate and injected emitters
//! - **Forecast** (`forecast`): expected km/L and efficiency trend
//! - **Pipeline** (`pipeline`): refuel in, classified reading and alert out

pub mod alerts;
pub mod baseline;
pub mod classifier;
pub mod config;
pub mod efficiency;
pub mod forecast;
pub mod pipeline;
pub mod registry;
pub mod robust;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::{FuelWatchConfig, ModelSettings};

// Re-export commonly used types
pub use types::{
    AlertRequest, AnomalyResult, AnomalyVerdict, DetectionStage, DetectorSignals,
    EfficiencyReading, RefuelEvent, Severity, VehicleContext, VehicleModelState,
};

// Re-export core operations
pub use efficiency::compute_reading;
pub use forecast::{predict_consumption, ConsumptionForecast};
pub use registry::{RegistryError, VehicleRegistry};

// Re-export models
pub use baseline::ControlLimits;
pub use robust::RobustModelArtifact;

// Re-export storage and alerting seams
pub use alerts::{AlertEmitter, LogAlertEmitter};
pub use pipeline::{EfficiencyPipeline, PipelineOutcome};
pub use storage::{InMemoryStore, ModelStore, SledStore};
