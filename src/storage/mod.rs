//! Vehicle State Storage - keyed persistence of `VehicleModelState`
//!
//! The registry only talks to the `ModelStore` trait, so the backing store
//! can be swapped without touching model lifecycle code:
//! - `InMemoryStore`: tests, replays and ephemeral runs
//! - `SledStore`: embedded on-disk store, one history blob and one model
//!   blob per vehicle

mod memory;
mod sled_store;

pub use memory::InMemoryStore;
pub use sled_store::{SledStore, MODEL_SCHEMA_VERSION};

use crate::types::VehicleModelState;

/// Keyed store for per-vehicle state.
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across async tasks.
pub trait ModelStore: Send + Sync {
    /// Load a vehicle's state, or `None` if it has never been stored.
    ///
    /// A backend that keeps models separately from history must recover
    /// from an unreadable model blob by rebuilding from history; only an
    /// unreadable history is an error.
    fn get(&self, vehicle_id: &str) -> Result<Option<VehicleModelState>, StoreError>;

    /// Insert or replace a vehicle's state
    fn put(&self, state: &VehicleModelState) -> Result<(), StoreError>;

    /// Delete a vehicle's state. Removing an unknown vehicle is not an error.
    fn remove(&self, vehicle_id: &str) -> Result<(), StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Recoverable: models are rebuilt from the raw history
    #[error("model artifact for {vehicle_id} is corrupt: {reason}")]
    ModelArtifactCorrupt { vehicle_id: String, reason: String },

    #[error("efficiency history for {vehicle_id} is unavailable: {reason}")]
    HistoryUnavailable { vehicle_id: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),
}
