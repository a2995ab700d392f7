use super::*;
use crate::directory::SensorDirectory;
use tokio::sync::broadcast::error::TryRecvError;

const TAG: &str = "StallSense";

fn engine() -> ReconcileEngine {
    let directory = Arc::new(SensorDirectory::open_in_memory().unwrap());
    ReconcileEngine::new(directory, TAG)
}

fn registered_engine(location: &str) -> ReconcileEngine {
    let engine = engine();
    engine
        .apply(&format!("{location}/id"), b"dev42.StallSense.infrared")
        .unwrap();
    engine
}

#[test]
fn state_report_for_unregistered_location_creates_nothing() {
    let engine = engine();
    let mut rx = engine.subscribe();

    engine.apply("a/b/s1", b"1").unwrap();

    assert!(engine.directory.find_by_location("a/b/s1").unwrap().is_none());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn address_report_for_unregistered_location_creates_nothing() {
    let engine = engine();

    engine.apply("a/b/s1/ip", b"10.0.0.1").unwrap();

    assert!(engine.directory.find_by_location("a/b/s1").unwrap().is_none());
}

#[test]
fn identity_broadcast_registers_unknown_sensor() {
    let engine = engine();
    let mut rx = engine.subscribe();

    engine.apply("a/b/s1/id", b"dev42.StallSense.infrared").unwrap();

    let record = engine.directory.find_by_location("a/b/s1").unwrap().unwrap();
    assert_eq!(record.status, SensorStatus::Unknown);
    assert_eq!(record.sensor_type, "infrared");
    assert_eq!(record.ip, None);
    // Registration is not a status transition and emits nothing.
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn identity_broadcast_is_idempotent() {
    let engine = registered_engine("a/b/s1");

    engine.apply("a/b/s1/id", b"dev99.StallSense.ultrasonic").unwrap();

    assert_eq!(engine.directory.count_by_location("a/b/s1").unwrap(), 1);
    let record = engine.directory.find_by_location("a/b/s1").unwrap().unwrap();
    assert_eq!(record.sensor_type, "infrared");
}

#[test]
fn concurrent_identity_broadcasts_register_exactly_once() {
    let engine = engine();

    // A fleet of restarting sensors can announce the same never-before-seen
    // location at once; the conditional insert must admit exactly one.
    std::thread::scope(|s| {
        for _ in 0..32 {
            s.spawn(|| {
                engine
                    .apply("a/b/s1/id", b"dev42.StallSense.infrared")
                    .unwrap();
            });
        }
    });

    assert_eq!(engine.directory.count_by_location("a/b/s1").unwrap(), 1);
}

#[test]
fn identity_broadcast_with_foreign_tag_is_ignored() {
    let engine = engine();

    engine.apply("a/b/s1/id", b"dev42.OtherVendor.infrared").unwrap();

    assert!(engine.directory.find_by_location("a/b/s1").unwrap().is_none());
}

#[test]
fn repeated_state_report_emits_exactly_one_notification() {
    let engine = registered_engine("a/b/s1");
    let mut rx = engine.subscribe();

    engine.apply("a/b/s1", b"1").unwrap();
    engine.apply("a/b/s1", b"1").unwrap();

    let change = rx.try_recv().unwrap();
    assert_eq!(change.location, "a/b/s1");
    assert_eq!(change.status, SensorStatus::Occupied);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn state_transition_back_and_forth_emits_each_change() {
    let engine = registered_engine("a/b/s1");
    let mut rx = engine.subscribe();

    engine.apply("a/b/s1", b"1").unwrap();
    engine.apply("a/b/s1", b"0").unwrap();
    engine.apply("a/b/s1", b"0").unwrap();

    assert_eq!(rx.try_recv().unwrap().status, SensorStatus::Occupied);
    assert_eq!(rx.try_recv().unwrap().status, SensorStatus::Empty);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn address_reports_overwrite_silently() {
    let engine = registered_engine("a/b/s1");
    let mut rx = engine.subscribe();

    engine.apply("a/b/s1/ip", b"10.0.4.17").unwrap();
    engine.apply("a/b/s1/ip", b"10.0.4.99").unwrap();

    let record = engine.directory.find_by_location("a/b/s1").unwrap().unwrap();
    assert_eq!(record.ip.as_deref(), Some("10.0.4.99"));
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn notification_carries_persisted_timestamp() {
    let engine = registered_engine("a/b/s1");
    let mut rx = engine.subscribe();

    engine.apply("a/b/s1", b"1").unwrap();

    let change = rx.try_recv().unwrap();
    let record = engine.directory.find_by_location("a/b/s1").unwrap().unwrap();
    assert_eq!(change.id, record.id);
    assert_eq!(change.updated_at, record.updated_at);
}

/// The end-to-end scenario: orphan report, registration, first report,
/// duplicate report.
#[test]
fn ingest_scenario() {
    let engine = engine();
    let mut rx = engine.subscribe();

    // Orphan report: no record, no notification.
    engine.apply("a/b/s1", b"1").unwrap();
    assert!(engine.directory.find_by_location("a/b/s1").unwrap().is_none());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    // Identity broadcast registers the sensor.
    engine.apply("a/b/s1/id", b"dev42.StallSense.infrared").unwrap();
    let record = engine.directory.find_by_location("a/b/s1").unwrap().unwrap();
    assert_eq!(record.status, SensorStatus::Unknown);
    assert_eq!(record.sensor_type, "infrared");

    // First occupancy report transitions Unknown -> Occupied and notifies.
    engine.apply("a/b/s1", b"1").unwrap();
    let change = rx.try_recv().unwrap();
    assert_eq!(change.status, SensorStatus::Occupied);
    assert_eq!(
        serde_json::to_value(change.status).unwrap(),
        serde_json::json!("OCCUPIED")
    );

    // Repeating the identical report emits nothing further.
    engine.apply("a/b/s1", b"1").unwrap();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn run_drains_mqtt_channel() {
    let directory = Arc::new(SensorDirectory::open_in_memory().unwrap());
    let engine = Arc::new(ReconcileEngine::new(Arc::clone(&directory), TAG));
    let mut rx = engine.subscribe();

    let (tx, msg_rx) = mpsc::channel(16);
    let handle = tokio::spawn(Arc::clone(&engine).run(msg_rx));

    tx.send(MqttMessage {
        topic: "a/b/s1/id".to_string(),
        payload: b"dev42.StallSense.infrared".to_vec(),
    })
    .await
    .unwrap();
    tx.send(MqttMessage {
        topic: "a/b/s1".to_string(),
        payload: b"1".to_vec(),
    })
    .await
    .unwrap();
    drop(tx);
    handle.await.unwrap();

    let record = directory.find_by_location("a/b/s1").unwrap().unwrap();
    assert_eq!(record.status, SensorStatus::Occupied);
    assert_eq!(rx.try_recv().unwrap().status, SensorStatus::Occupied);
}
