//! Vehicle Registry - per-vehicle history and model lifecycle
//!
//! Each vehicle gets one `VehicleSlot`:
//!
//! ```text
//! writer: tokio Mutex<()>            serialises submit / retrain / remove
//! state:  ArcSwap<VehicleModelState> published snapshot, read lock-free
//! ```
//!
//! A writer clones the current snapshot, appends, retrains and persists the
//! clone, then swaps it in. Readers see either the previous or the new
//! state, never a partial one. Slots live in a `DashMap`, so vehicles never
//! contend with each other. Store reads on a miss happen outside the map's
//! shard locks.
//!
//! ## Model lifecycle
//!
//! | History length                                   | Action                     |
//! |--------------------------------------------------|----------------------------|
//! | `n ≥ statistical.min_readings`                    | recompute control limits   |
//! | `n ≥ robust.min_readings` and cadence due         | retrain isolation forest   |
//!
//! The cadence is due when `(n − robust.min_readings) % robust.retrain_every == 0`
//! or no forest exists yet. Between retrains the previous forest stays in
//! place.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::baseline::ControlLimits;
use crate::classifier;
use crate::config::ModelSettings;
use crate::robust::RobustModelArtifact;
use crate::storage::{ModelStore, StoreError};
use crate::types::{AnomalyResult, DetectionStage, EfficiencyReading, VehicleModelState};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid efficiency value {value} for vehicle {vehicle_id}: must be finite and > 0")]
    InvalidReading { vehicle_id: String, value: f64 },

    #[error("Vehicle {0} has no stored state")]
    UnknownVehicle(String),

    #[error("Vehicle {0} was removed while the request was pending")]
    VehicleRemoved(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Bring the models of `state` up to date after its history grew.
///
/// Returns true if any model was (re)trained.
pub fn update_models(state: &mut VehicleModelState, settings: &ModelSettings) -> bool {
    let n = state.len();
    let mut trained = false;

    if n >= settings.statistical.min_readings {
        let values = state.values();
        if let Some(limits) = ControlLimits::from_history(&values, &settings.statistical) {
            state.statistical = Some(limits);
            trained = true;
        }

        if robust_due(n, state.robust.is_some(), settings) {
            match RobustModelArtifact::train(&values, &settings.robust) {
                Ok(model) => {
                    state.robust = Some(model);
                    trained = true;
                }
                // Keep the previous forest.
                Err(e) => warn!(
                    vehicle_id = %state.vehicle_id,
                    error = %e,
                    "Robust model training failed"
                ),
            }
        }
    }

    if trained {
        state.trained_at = Some(Utc::now());
    }
    trained
}

/// Rebuild both models from the raw history, ignoring the retrain cadence.
pub fn rebuild_models(state: &mut VehicleModelState, settings: &ModelSettings) {
    let values = state.values();
    state.statistical = ControlLimits::from_history(&values, &settings.statistical);
    state.robust = if values.len() >= settings.robust.min_readings {
        RobustModelArtifact::train(&values, &settings.robust)
            .map_err(|e| {
                warn!(vehicle_id = %state.vehicle_id, error = %e, "Robust model rebuild failed")
            })
            .ok()
    } else {
        None
    };
    state.trained_at = if state.statistical.is_some() || state.robust.is_some() {
        Some(Utc::now())
    } else {
        None
    };
    debug!(
        vehicle_id = %state.vehicle_id,
        readings = values.len(),
        "Models rebuilt from history"
    );
}

fn robust_due(n: usize, has_model: bool, settings: &ModelSettings) -> bool {
    let min = settings.robust.min_readings;
    if n < min {
        return false;
    }
    !has_model || (n - min) % settings.robust.retrain_every.max(1) == 0
}

// ============================================================================
// Registry
// ============================================================================

struct VehicleSlot {
    writer: Mutex<()>,
    state: ArcSwap<VehicleModelState>,
    removed: AtomicBool,
}

impl VehicleSlot {
    fn new(state: VehicleModelState) -> Self {
        Self {
            writer: Mutex::new(()),
            state: ArcSwap::from_pointee(state),
            removed: AtomicBool::new(false),
        }
    }
}

/// Owner of every vehicle's `VehicleModelState`.
///
/// Slots stay resident once loaded. Every write is persisted before it is
/// published, so `evict_idle` can drop them at any time and the next access
/// reloads from the store.
pub struct VehicleRegistry {
    store: Arc<dyn ModelStore>,
    settings: ModelSettings,
    slots: DashMap<String, Arc<VehicleSlot>>,
    /// Bumped whenever a slot leaves the map. A load that started before the
    /// bump may have read stale state and is retried.
    unloads: AtomicU64,
}

enum Install {
    Slot(Arc<VehicleSlot>),
    Absent,
    Stale,
}

impl VehicleRegistry {
    pub fn new(store: Arc<dyn ModelStore>, settings: ModelSettings) -> Self {
        info!(backend = store.backend_name(), "Vehicle registry initialised");
        Self {
            store,
            settings,
            slots: DashMap::new(),
            unloads: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Number of vehicles currently loaded
    pub fn loaded_vehicles(&self) -> usize {
        self.slots.len()
    }

    /// Drop every slot nobody is using. Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            self.unloads.fetch_add(1, Ordering::SeqCst);
            false
        });
        let evicted = before.saturating_sub(self.slots.len());
        if evicted > 0 {
            debug!(evicted, "Idle vehicle slots evicted");
        }
        evicted
    }

    fn cached(&self, vehicle_id: &str) -> Option<Arc<VehicleSlot>> {
        self.slots.get(vehicle_id).map(|slot| Arc::clone(slot.value()))
    }

    /// Publish a state loaded from the store, unless another loader won the
    /// race or a slot was unloaded since `epoch` was read.
    fn install(
        &self,
        vehicle_id: &str,
        epoch: u64,
        loaded: Option<VehicleModelState>,
        create: bool,
    ) -> Install {
        match self.slots.entry(vehicle_id.to_string()) {
            Entry::Occupied(entry) => Install::Slot(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                if self.unloads.load(Ordering::SeqCst) != epoch {
                    return Install::Stale;
                }
                let state = match loaded {
                    Some(state) => state,
                    None if create => VehicleModelState::empty(vehicle_id),
                    None => return Install::Absent,
                };
                let slot = Arc::new(VehicleSlot::new(state));
                entry.insert(Arc::clone(&slot));
                Install::Slot(slot)
            }
        }
    }

    /// Slot for a vehicle, reading the store on the calling thread on a miss.
    ///
    /// With `create` an unknown vehicle gets an empty state; without it the
    /// result is `None`.
    fn load_slot(
        &self,
        vehicle_id: &str,
        create: bool,
    ) -> Result<Option<Arc<VehicleSlot>>, RegistryError> {
        loop {
            if let Some(slot) = self.cached(vehicle_id) {
                return Ok(Some(slot));
            }
            let epoch = self.unloads.load(Ordering::SeqCst);
            let loaded = self.store.get(vehicle_id)?;
            match self.install(vehicle_id, epoch, loaded, create) {
                Install::Slot(slot) => return Ok(Some(slot)),
                Install::Absent => return Ok(None),
                Install::Stale => debug!(vehicle_id, "Vehicle unloaded during load, reloading"),
            }
        }
    }

    /// Like `load_slot`, with the store read moved to the blocking pool.
    async fn load_slot_blocking(
        &self,
        vehicle_id: &str,
        create: bool,
    ) -> Result<Option<Arc<VehicleSlot>>, RegistryError> {
        loop {
            if let Some(slot) = self.cached(vehicle_id) {
                return Ok(Some(slot));
            }
            let epoch = self.unloads.load(Ordering::SeqCst);
            let store = Arc::clone(&self.store);
            let id = vehicle_id.to_string();
            let loaded = tokio::task::spawn_blocking(move || store.get(&id)).await??;
            match self.install(vehicle_id, epoch, loaded, create) {
                Install::Slot(slot) => return Ok(Some(slot)),
                Install::Absent => return Ok(None),
                Install::Stale => debug!(vehicle_id, "Vehicle unloaded during load, reloading"),
            }
        }
    }

    /// Append a reading and bring the vehicle's models up to date.
    ///
    /// The reading's `sequence_index` is overwritten with its position in
    /// history. Concurrent submissions for one vehicle are serialised;
    /// different vehicles proceed in parallel.
    pub async fn submit_reading(
        &self,
        vehicle_id: &str,
        reading: EfficiencyReading,
    ) -> Result<Arc<VehicleModelState>, RegistryError> {
        if !EfficiencyReading::is_valid_value(reading.value) {
            warn!(vehicle_id, value = reading.value, "Rejected invalid efficiency reading");
            return Err(RegistryError::InvalidReading {
                vehicle_id: vehicle_id.to_string(),
                value: reading.value,
            });
        }

        let slot = self
            .load_slot_blocking(vehicle_id, true)
            .await?
            .ok_or_else(|| RegistryError::UnknownVehicle(vehicle_id.to_string()))?;
        let _writer = slot.writer.lock().await;
        if slot.removed.load(Ordering::Acquire) {
            return Err(RegistryError::VehicleRemoved(vehicle_id.to_string()));
        }

        let mut next = VehicleModelState::clone(&slot.state.load());
        let sequence_index = next.len();
        next.history.push(EfficiencyReading::new(
            vehicle_id,
            reading.value,
            sequence_index,
        ));

        let next = if robust_due(next.len(), next.robust.is_some(), &self.settings) {
            let settings = self.settings.clone();
            tokio::task::spawn_blocking(move || {
                update_models(&mut next, &settings);
                next
            })
            .await?
        } else {
            update_models(&mut next, &self.settings);
            next
        };

        self.store.put(&next)?;
        let next = Arc::new(next);
        slot.state.store(Arc::clone(&next));

        debug!(
            vehicle_id,
            value = reading.value,
            sequence_index,
            stage = %classifier::stage_for(&next, &self.settings),
            "Reading submitted"
        );
        Ok(next)
    }

    /// Classify a value against the vehicle's current snapshot.
    ///
    /// Unknown vehicles are `NotReady`. Never blocks on a writer.
    pub fn classify(&self, vehicle_id: &str, value: f64) -> Result<AnomalyResult, RegistryError> {
        if !value.is_finite() {
            return Err(RegistryError::InvalidReading {
                vehicle_id: vehicle_id.to_string(),
                value,
            });
        }
        match self.snapshot(vehicle_id)? {
            Some(state) => Ok(classifier::classify_state(&state, value, &self.settings)),
            None => Ok(AnomalyResult::not_ready(vehicle_id, value)),
        }
    }

    /// Current published state of a vehicle.
    ///
    /// A vehicle that is not loaded yet is read from the store on the
    /// calling thread.
    pub fn snapshot(
        &self,
        vehicle_id: &str,
    ) -> Result<Option<Arc<VehicleModelState>>, RegistryError> {
        Ok(self
            .load_slot(vehicle_id, false)?
            .map(|slot| slot.state.load_full()))
    }

    /// Detection stage of a vehicle (`NotReady` if unknown)
    pub fn stage(&self, vehicle_id: &str) -> Result<DetectionStage, RegistryError> {
        Ok(self
            .snapshot(vehicle_id)?
            .map(|state| classifier::stage_for(&state, &self.settings))
            .unwrap_or(DetectionStage::NotReady))
    }

    /// Force a full rebuild of both models from history.
    ///
    /// Training is seeded, so two retrains on the same history produce the
    /// same models.
    pub async fn retrain(&self, vehicle_id: &str) -> Result<Arc<VehicleModelState>, RegistryError> {
        let slot = self
            .load_slot_blocking(vehicle_id, false)
            .await?
            .ok_or_else(|| RegistryError::UnknownVehicle(vehicle_id.to_string()))?;
        let _writer = slot.writer.lock().await;
        if slot.removed.load(Ordering::Acquire) {
            return Err(RegistryError::VehicleRemoved(vehicle_id.to_string()));
        }

        let mut next = VehicleModelState::clone(&slot.state.load());
        let settings = self.settings.clone();
        let next = tokio::task::spawn_blocking(move || {
            rebuild_models(&mut next, &settings);
            next
        })
        .await?;

        self.store.put(&next)?;
        let next = Arc::new(next);
        slot.state.store(Arc::clone(&next));
        info!(vehicle_id, readings = next.len(), "Vehicle models retrained");
        Ok(next)
    }

    /// Delete a vehicle's state.
    ///
    /// Goes through the same slot as every writer and waits for the one in
    /// flight. A submission queued behind the removal fails with
    /// `VehicleRemoved` instead of resurrecting the vehicle.
    pub async fn remove_vehicle(&self, vehicle_id: &str) -> Result<(), RegistryError> {
        let Some(slot) = self.load_slot_blocking(vehicle_id, false).await? else {
            debug!(vehicle_id, "Removal of unknown vehicle ignored");
            return Ok(());
        };
        let _writer = slot.writer.lock().await;
        if slot.removed.load(Ordering::Acquire) {
            return Ok(());
        }

        self.store.remove(vehicle_id)?;
        slot.removed.store(true, Ordering::Release);
        self.unloads.fetch_add(1, Ordering::SeqCst);
        self.slots
            .remove_if(vehicle_id, |_, current| Arc::ptr_eq(current, &slot));
        info!(vehicle_id, "Vehicle removed from registry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::storage::InMemoryStore;
    use crate::types::AnomalyVerdict;

    /// Store whose reads return the state as of the call, then stall.
    #[derive(Default)]
    struct SlowStore {
        inner: InMemoryStore,
        get_delays: std::sync::Mutex<VecDeque<Duration>>,
        remove_delay: Duration,
        gets: AtomicUsize,
    }

    impl SlowStore {
        fn seeded(vehicle_id: &str, readings: usize, get_delays: &[u64], remove_ms: u64) -> Self {
            let store = Self {
                get_delays: std::sync::Mutex::new(
                    get_delays.iter().map(|ms| Duration::from_millis(*ms)).collect(),
                ),
                remove_delay: Duration::from_millis(remove_ms),
                ..Self::default()
            };
            let mut state = VehicleModelState::empty(vehicle_id);
            state.history = (0..readings)
                .map(|i| EfficiencyReading::new(vehicle_id, 9.0, i))
                .collect();
            store.inner.put(&state).unwrap();
            store
        }
    }

    impl ModelStore for SlowStore {
        fn get(&self, vehicle_id: &str) -> Result<Option<VehicleModelState>, StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            let state = self.inner.get(vehicle_id)?;
            let delay = self.get_delays.lock().unwrap().pop_front();
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }
            Ok(state)
        }

        fn put(&self, state: &VehicleModelState) -> Result<(), StoreError> {
            self.inner.put(state)
        }

        fn remove(&self, vehicle_id: &str) -> Result<(), StoreError> {
            std::thread::sleep(self.remove_delay);
            self.inner.remove(vehicle_id)
        }

        fn backend_name(&self) -> &'static str {
            "Slow"
        }
    }

    fn registry() -> VehicleRegistry {
        VehicleRegistry::new(Arc::new(InMemoryStore::new()), ModelSettings::default())
    }

    async fn submit_n(registry: &VehicleRegistry, vehicle: &str, n: usize, value: f64) {
        for _ in 0..n {
            registry
                .submit_reading(vehicle, EfficiencyReading::new(vehicle, value, 0))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_stage_boundaries() {
        let registry = registry();

        submit_n(&registry, "V1", 9, 10.0).await;
        assert_eq!(registry.stage("V1").unwrap(), DetectionStage::NotReady);

        submit_n(&registry, "V1", 1, 10.0).await;
        assert_eq!(registry.stage("V1").unwrap(), DetectionStage::StatisticalOnly);

        submit_n(&registry, "V1", 19, 10.0).await;
        assert_eq!(registry.stage("V1").unwrap(), DetectionStage::StatisticalOnly);

        submit_n(&registry, "V1", 1, 10.0).await;
        assert_eq!(registry.stage("V1").unwrap(), DetectionStage::RobustModel);
    }

    #[tokio::test]
    async fn test_stage_never_regresses() {
        let registry = registry();
        let mut last = DetectionStage::NotReady;
        for i in 0..45 {
            let value = 9.0 + (i % 7) as f64 * 0.3;
            registry
                .submit_reading("V1", EfficiencyReading::new("V1", value, 0))
                .await
                .unwrap();
            let stage = registry.stage("V1").unwrap();
            assert!(stage >= last, "stage regressed at reading {i}");
            last = stage;
        }
        assert_eq!(last, DetectionStage::RobustModel);
    }

    #[tokio::test]
    async fn test_sequence_index_assigned() {
        let registry = registry();
        submit_n(&registry, "V1", 3, 8.0).await;
        let state = registry
            .submit_reading("V1", EfficiencyReading::new("V1", 8.5, 99))
            .await
            .unwrap();
        let indices: Vec<usize> = state.history.iter().map(|r| r.sequence_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_invalid_reading_rejected() {
        let registry = registry();
        submit_n(&registry, "V1", 2, 8.0).await;

        for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let err = registry
                .submit_reading("V1", EfficiencyReading::new("V1", bad, 0))
                .await
                .unwrap_err();
            assert!(matches!(err, RegistryError::InvalidReading { .. }));
        }
        assert_eq!(registry.snapshot("V1").unwrap().unwrap().len(), 2);
        assert!(registry.classify("V1", f64::NAN).is_err());
    }

    #[tokio::test]
    async fn test_unknown_vehicle_not_ready() {
        let registry = registry();
        let result = registry.classify("ghost", 3.0).unwrap();
        assert_eq!(result.verdict, AnomalyVerdict::NotReady);
        assert!(registry.snapshot("ghost").unwrap().is_none());
        assert_eq!(registry.loaded_vehicles(), 0);
    }

    #[tokio::test]
    async fn test_constant_history_converges() {
        let registry = registry();
        submit_n(&registry, "V1", 10, 10.0).await;

        let state = registry.snapshot("V1").unwrap().unwrap();
        let limits = state.statistical.unwrap();
        assert!(limits.std.abs() < 1e-12);
        assert!((limits.lower - 10.0).abs() < 1e-12);
        assert!((limits.upper - 10.0).abs() < 1e-12);

        assert_eq!(
            registry.classify("V1", 10.0).unwrap().verdict,
            AnomalyVerdict::Normal
        );
        assert_eq!(
            registry.classify("V1", 5.0).unwrap().verdict.severity(),
            Some(crate::types::Severity::High)
        );
    }

    #[tokio::test]
    async fn test_retrain_is_idempotent() {
        let registry = registry();
        for i in 0..40 {
            let value = 10.0 + ((i * 7) % 11) as f64 * 0.2;
            registry
                .submit_reading("V1", EfficiencyReading::new("V1", value, 0))
                .await
                .unwrap();
        }

        let first = registry.retrain("V1").await.unwrap();
        let second = registry.retrain("V1").await.unwrap();
        assert_eq!(first.statistical, second.statistical);
        assert_eq!(first.robust, second.robust);

        for value in [4.0, 9.5, 10.8, 12.0, 30.0] {
            let a = classifier::classify_state(&first, value, registry.settings());
            let b = classifier::classify_state(&second, value, registry.settings());
            assert_eq!(a.verdict, b.verdict);
        }
    }

    #[tokio::test]
    async fn test_retrain_cadence() {
        let mut settings = ModelSettings::default();
        settings.robust.retrain_every = 5;
        let registry = VehicleRegistry::new(Arc::new(InMemoryStore::new()), settings);

        submit_n(&registry, "V1", 30, 10.0).await;
        let trained_on = |r: &VehicleRegistry| {
            r.snapshot("V1")
                .unwrap()
                .unwrap()
                .robust
                .as_ref()
                .map(|m| m.trained_on)
        };
        assert_eq!(trained_on(&registry), Some(30));

        submit_n(&registry, "V1", 4, 10.0).await;
        assert_eq!(trained_on(&registry), Some(30));

        submit_n(&registry, "V1", 1, 10.0).await;
        assert_eq!(trained_on(&registry), Some(35));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_serialised() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..40)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    let reading = EfficiencyReading::new("V1", 9.0 + i as f64 * 0.01, 0);
                    registry.submit_reading("V1", reading).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let state = registry.snapshot("V1").unwrap().unwrap();
        assert_eq!(state.len(), 40);
        let indices: Vec<usize> = state.history.iter().map(|r| r.sequence_index).collect();
        assert_eq!(indices, (0..40).collect::<Vec<_>>());
        assert!(state.robust.is_some());
    }

    #[tokio::test]
    async fn test_remove_vehicle() {
        let store = Arc::new(InMemoryStore::new());
        let registry = VehicleRegistry::new(store.clone(), ModelSettings::default());
        submit_n(&registry, "V1", 12, 9.0).await;
        assert_eq!(store.len(), 1);

        registry.remove_vehicle("V1").await.unwrap();
        assert!(registry.snapshot("V1").unwrap().is_none());
        assert!(store.is_empty());

        // A fresh history starts from scratch.
        let state = registry
            .submit_reading("V1", EfficiencyReading::new("V1", 9.0, 0))
            .await
            .unwrap();
        assert_eq!(state.len(), 1);
    }

    #[tokio::test]
    async fn test_state_reloaded_from_store() {
        let store: Arc<dyn ModelStore> = Arc::new(InMemoryStore::new());
        {
            let registry = VehicleRegistry::new(Arc::clone(&store), ModelSettings::default());
            submit_n(&registry, "V1", 11, 7.5).await;
        }
        let registry = VehicleRegistry::new(store, ModelSettings::default());
        assert_eq!(registry.stage("V1").unwrap(), DetectionStage::StatisticalOnly);
        assert_eq!(registry.snapshot("V1").unwrap().unwrap().len(), 11);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_removal_of_cold_vehicle_waits_for_loader() {
        let store = Arc::new(SlowStore::seeded("V1", 12, &[150, 150], 50));
        let registry = Arc::new(VehicleRegistry::new(
            Arc::clone(&store) as Arc<dyn ModelStore>,
            ModelSettings::default(),
        ));

        let remover = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.remove_vehicle("V1").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let submitter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .submit_reading("V1", EfficiencyReading::new("V1", 9.0, 0))
                    .await
            })
        };

        remover.await.unwrap().unwrap();
        match submitter.await.unwrap() {
            Err(RegistryError::VehicleRemoved(id)) => assert_eq!(id, "V1"),
            Ok(state) => assert_eq!(state.len(), 1),
            Err(e) => panic!("unexpected error: {e}"),
        }
        let persisted = store.inner.get("V1").unwrap();
        assert!(persisted.map_or(true, |state| state.len() == 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stale_load_retried_after_removal() {
        // The submission reads 12 readings, then stalls while the removal
        // completes.
        let store = Arc::new(SlowStore::seeded("V1", 12, &[150], 0));
        let registry = Arc::new(VehicleRegistry::new(
            Arc::clone(&store) as Arc<dyn ModelStore>,
            ModelSettings::default(),
        ));

        let submitter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .submit_reading("V1", EfficiencyReading::new("V1", 9.0, 0))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.remove_vehicle("V1").await.unwrap();

        let state = submitter.await.unwrap().unwrap();
        assert_eq!(state.len(), 1);
        assert_eq!(store.inner.get("V1").unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_cold_snapshot_reads_store_once() {
        let store = Arc::new(SlowStore::seeded("V1", 12, &[], 0));
        let registry = VehicleRegistry::new(
            Arc::clone(&store) as Arc<dyn ModelStore>,
            ModelSettings::default(),
        );

        assert_eq!(registry.snapshot("V1").unwrap().unwrap().len(), 12);
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
        registry.snapshot("V1").unwrap();
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);

        assert!(registry.snapshot("ghost").unwrap().is_none());
        assert_eq!(store.gets.load(Ordering::SeqCst), 2);
        assert_eq!(registry.loaded_vehicles(), 1);
    }

    #[tokio::test]
    async fn test_evicted_vehicle_reloads_from_store() {
        let registry = registry();
        submit_n(&registry, "V1", 12, 9.0).await;
        submit_n(&registry, "V2", 3, 8.0).await;
        assert_eq!(registry.loaded_vehicles(), 2);

        assert_eq!(registry.evict_idle(), 2);
        assert_eq!(registry.loaded_vehicles(), 0);

        assert_eq!(registry.stage("V1").unwrap(), DetectionStage::StatisticalOnly);
        let state = registry
            .submit_reading("V1", EfficiencyReading::new("V1", 9.0, 0))
            .await
            .unwrap();
        assert_eq!(state.len(), 13);
        assert_eq!(state.history[12].sequence_index, 12);
        assert_eq!(registry.loaded_vehicles(), 1);
    }
}
