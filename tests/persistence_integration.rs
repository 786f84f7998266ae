//! Persistence Integration Tests
//!
//! Vehicle state written through the registry must survive a process
//! restart: the reopened sled store yields the same history, limits and
//! forest, and classification picks up where it left off.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio_test::assert_ok;

use fuelwatch::{
    AnomalyVerdict, DetectionStage, EfficiencyPipeline, LogAlertEmitter, ModelSettings, ModelStore,
    RefuelEvent, Severity, SledStore, VehicleRegistry,
};

fn events(vehicle: &str, count: u64) -> Vec<RefuelEvent> {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 7, 30, 0).unwrap();
    (0..count)
        .map(|i| {
            let liters = Decimal::new(if i % 3 == 0 { 480 } else { 500 }, 1);
            RefuelEvent::new(vehicle, 5000 + i * 500, liters, true, t0 + Duration::days(i as i64))
        })
        .collect()
}

fn open_registry(path: &std::path::Path) -> (Arc<SledStore>, Arc<VehicleRegistry>) {
    let store = Arc::new(assert_ok!(SledStore::open(path, ModelSettings::default())));
    let registry = Arc::new(VehicleRegistry::new(
        Arc::clone(&store) as Arc<dyn ModelStore>,
        ModelSettings::default(),
    ));
    (store, registry)
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let before = {
        let (store, registry) = open_registry(dir.path());
        let pipeline =
            EfficiencyPipeline::new(Arc::clone(&registry), Arc::new(LogAlertEmitter), Severity::Medium);
        let (summary, _) = assert_ok!(pipeline.replay(events("PERSIST-1", 33)).await);
        assert_eq!(summary.readings, 32);
        assert_eq!(store.vehicle_count(), 1);

        assert_ok!(registry.snapshot("PERSIST-1")).expect("vehicle state")
    };

    let (_store, registry) = open_registry(dir.path());
    let after = assert_ok!(registry.snapshot("PERSIST-1")).expect("state reloaded from disk");

    assert_eq!(after.history, before.history);
    assert_eq!(after.statistical, before.statistical);
    assert_eq!(after.trained_at, before.trained_at);
    assert_eq!(
        assert_ok!(registry.stage("PERSIST-1")),
        DetectionStage::RobustModel
    );

    let (Some(old), Some(new)) = (&before.robust, &after.robust) else {
        panic!("forest should be persisted");
    };
    assert_eq!(new.trained_on, old.trained_on);
    for value in [9.6, 10.0, 10.4, 4.0] {
        assert!((new.score(value) - old.score(value)).abs() < 1e-9);
    }

    let result = assert_ok!(registry.classify("PERSIST-1", 4.0));
    assert!(matches!(
        result.verdict,
        AnomalyVerdict::Anomalous {
            severity: Severity::High,
            ..
        }
    ));
}

#[tokio::test]
async fn removed_vehicle_stays_removed_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let (store, registry) = open_registry(dir.path());
        let pipeline =
            EfficiencyPipeline::new(Arc::clone(&registry), Arc::new(LogAlertEmitter), Severity::Medium);
        assert_ok!(pipeline.replay(events("GONE-1", 5)).await);
        assert_ok!(pipeline.replay(events("KEEP-1", 5)).await);
        assert_ok!(registry.remove_vehicle("GONE-1").await);
        assert_eq!(store.vehicle_count(), 1);
    }

    let (_store, registry) = open_registry(dir.path());
    assert!(assert_ok!(registry.snapshot("GONE-1")).is_none());
    let kept = assert_ok!(registry.snapshot("KEEP-1")).expect("kept vehicle");
    assert_eq!(kept.len(), 4);
}
