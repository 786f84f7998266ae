//! In-memory `ModelStore`.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{ModelStore, StoreError};
use crate::types::VehicleModelState;

/// In-memory store for tests, replays and ephemeral runs
///
/// Thread-safe via `RwLock`. Not durable: data is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    states: RwLock<HashMap<String, VehicleModelState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vehicles stored
    pub fn len(&self) -> usize {
        self.states.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModelStore for InMemoryStore {
    fn get(&self, vehicle_id: &str) -> Result<Option<VehicleModelState>, StoreError> {
        let states = self
            .states
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(states.get(vehicle_id).cloned())
    }

    fn put(&self, state: &VehicleModelState) -> Result<(), StoreError> {
        let mut states = self
            .states
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        states.insert(state.vehicle_id.clone(), state.clone());
        Ok(())
    }

    fn remove(&self, vehicle_id: &str) -> Result<(), StoreError> {
        let mut states = self
            .states
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        states.remove(vehicle_id);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}
