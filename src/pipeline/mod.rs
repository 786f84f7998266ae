//! Refuel Processing Pipeline
//!
//! ```text
//! RefuelEvent
//!   → compute_reading        (None: partial refuel / no anchor → stop)
//!   → submit_reading         (append, retrain models when due)
//!   → classify               (against the freshly published state)
//!   → build_alert + emit     (only anomalies at or above the severity gate)
//! ```
//!
//! `replay` runs a flat event list through the same path, one task per
//! vehicle, events of a vehicle strictly in odometer order.

mod coordinator;
mod replay;

pub use coordinator::{EfficiencyPipeline, PipelineError, PipelineOutcome, PipelineStats};
pub use replay::{order_events, ReplaySummary};
