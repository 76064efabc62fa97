//! End-to-end tests: queue -> pipeline -> store -> hub, driven by a mock radio.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sensorpush_core::{MockRadio, SensorAdvertisement, encode_manufacturer_data};
use sensorpush_service::{
    AppState, Config, ProcessOutcome, ResolutionState, SamplePipeline, SensorQueries, queue,
};
use sensorpush_store::Store;
use sensorpush_types::{DeviceNumber, DeviceType, RawAdvertisement, Severity};
use tokio_util::sync::CancellationToken;

fn reading(address: &str, temperature_c: f64, humidity_percent: f64) -> RawAdvertisement {
    let (company_id, data) = encode_manufacturer_data(&SensorAdvertisement {
        device_type: DeviceType::HtW,
        temperature_c: Some(temperature_c),
        humidity_percent: Some(humidity_percent),
        pressure_hpa: None,
    })
    .unwrap();
    RawAdvertisement::new(address).with_manufacturer_data(company_id, data)
}

/// Remove the samples table behind the store's back, so every sample read
/// or write fails while device lookups keep working.
fn break_samples_table(path: &Path) {
    rusqlite::Connection::open(path)
        .unwrap()
        .execute_batch("DROP TABLE samples")
        .unwrap();
}

fn setup(store: Store, radio: &Arc<MockRadio>) -> Arc<SamplePipeline> {
    let mut config = Config::default();
    config.broadcast.feed_level = "debug".to_string();
    let state = AppState::new(store, config);
    Arc::new(SamplePipeline::new(state, radio.clone()))
}

#[tokio::test]
async fn test_new_device_then_sample_is_persisted_and_broadcast() {
    let radio = Arc::new(MockRadio::new());
    radio
        .set_identity_bytes("AA:BB", vec![0x01, 0x00, 0x00, 0x00])
        .await;
    let pipeline = setup(Store::open_in_memory().unwrap(), &radio);
    let mut samples = pipeline.state().hub.subscribe_samples();

    let first = pipeline.process(reading("AA:BB", 23.5, 45.2)).await;
    assert_eq!(first, ProcessOutcome::Registered(DeviceNumber::new(1)));
    assert_eq!(radio.read_count(), 1);
    assert_eq!(radio.resume_count(), 1);

    pipeline.process(reading("AA:BB", 23.5, 45.2)).await;

    let record = samples.recv().await.unwrap();
    assert_eq!(record.device_number, DeviceNumber::new(1));
    assert_eq!(record.radio_address, "AA:BB");
    assert_eq!(record.friendly_name, "");
    assert_eq!(record.temperature_c, 23.5);
    assert_eq!(record.humidity_percent, 45.2);

    let store = pipeline.state().store.lock().await;
    let latest = store.latest_sample_per_device().unwrap();
    assert_eq!(latest[&DeviceNumber::new(1)].temperature_c, 23.5);
    assert_eq!(store.count_samples(None).unwrap(), 1);
}

#[tokio::test]
async fn test_repeated_advertisements_read_identity_once() {
    let radio = Arc::new(MockRadio::new());
    radio.set_identity("AA:BB", DeviceNumber::new(7)).await;
    let pipeline = setup(Store::open_in_memory().unwrap(), &radio);

    for i in 0..10 {
        pipeline
            .process(reading("AA:BB", 20.0 + i as f64, 50.0))
            .await;
    }

    assert_eq!(radio.pause_count(), 1);
    assert_eq!(radio.read_count(), 1);
    assert_eq!(radio.resume_count(), 1);
    assert!(radio.is_scanning());

    let store = pipeline.state().store.lock().await;
    assert_eq!(store.count_samples(Some(DeviceNumber::new(7))).unwrap(), 9);
}

#[tokio::test]
async fn test_every_failed_attempt_resumes_once() {
    let radio = Arc::new(MockRadio::new());
    radio.set_identity("AA:BB", DeviceNumber::new(1)).await;
    radio.fail_next_reads(3);
    let pipeline = setup(Store::open_in_memory().unwrap(), &radio);

    for _ in 0..3 {
        assert_eq!(
            pipeline.process(reading("AA:BB", 20.0, 50.0)).await,
            ProcessOutcome::ResolutionFailed
        );
    }
    assert_eq!(radio.resume_count(), 3);
    assert_eq!(
        pipeline.resolver().state("AA:BB"),
        ResolutionState::Unknown
    );

    assert_eq!(
        pipeline.process(reading("AA:BB", 20.0, 50.0)).await,
        ProcessOutcome::Registered(DeviceNumber::new(1))
    );
    assert_eq!(radio.read_count(), 4);
    assert_eq!(radio.resume_count(), 4);
    assert_eq!(radio.pause_count(), 4);
}

#[tokio::test]
async fn test_devices_from_previous_run_need_no_radio() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sensor_data.db");
    {
        let store = Store::open(&path).unwrap();
        store.add_device(DeviceNumber::new(42), "CC:DD").unwrap();
        store.close().unwrap();
    }

    let radio = Arc::new(MockRadio::new());
    let pipeline = setup(Store::open(&path).unwrap(), &radio);

    let outcome = pipeline.process(reading("CC:DD", 18.25, 61.0)).await;

    assert!(matches!(outcome, ProcessOutcome::Persisted(ref r) if r.device_number == DeviceNumber::new(42)));
    assert_eq!(radio.pause_count(), 0);
    assert_eq!(radio.read_count(), 0);
}

#[tokio::test]
async fn test_run_processes_queue_in_order() {
    let radio = Arc::new(MockRadio::new());
    radio.set_identity("AA:BB", DeviceNumber::new(1)).await;
    radio.set_identity("CC:DD", DeviceNumber::new(2)).await;
    let pipeline = setup(Store::open_in_memory().unwrap(), &radio);
    let mut samples = pipeline.state().hub.subscribe_samples();

    let (ingest, receiver) = queue::channel();
    let events = [
        reading("AA:BB", 20.0, 40.0),
        reading("CC:DD", 21.0, 41.0),
        reading("AA:BB", 22.0, 42.0),
        reading("CC:DD", 23.0, 43.0),
        reading("AA:BB", 24.0, 44.0),
    ];
    for event in events {
        ingest.enqueue(event).unwrap();
    }
    drop(ingest);

    // The consumer stops on its own once the closed queue is drained.
    Arc::clone(&pipeline)
        .start(receiver, CancellationToken::new())
        .await
        .unwrap();

    let temperatures: Vec<f64> = std::iter::from_fn(|| samples.try_recv())
        .map(|r| r.temperature_c)
        .collect();
    assert_eq!(temperatures, vec![22.0, 23.0, 24.0]);
    assert_eq!(radio.max_concurrent_reads(), 1);

    let stats = pipeline.state().stats.snapshot();
    assert_eq!(stats.received, 5);
    assert_eq!(stats.resolutions, 2);
    assert_eq!(stats.persisted, 3);
    assert!(!stats.running);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_waits_for_in_flight_resolution() {
    let radio = Arc::new(MockRadio::new());
    radio.set_identity("AA:BB", DeviceNumber::new(1)).await;
    radio.set_read_latency(Duration::from_secs(2));
    let pipeline = setup(Store::open_in_memory().unwrap(), &radio);

    let (ingest, receiver) = queue::channel();
    ingest.enqueue(reading("AA:BB", 20.0, 40.0)).unwrap();
    ingest.enqueue(reading("AA:BB", 21.0, 41.0)).unwrap();

    let cancel = CancellationToken::new();
    let handle = Arc::clone(&pipeline).start(receiver, cancel.clone());

    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(radio.read_count(), 1);
    assert_eq!(radio.resume_count(), 1);
    assert!(radio.is_scanning());
    assert_eq!(
        pipeline.resolver().state("AA:BB"),
        ResolutionState::Known(DeviceNumber::new(1))
    );
    let store = pipeline.state().store.lock().await;
    assert_eq!(store.count_samples(None).unwrap(), 0);
}

#[tokio::test]
async fn test_late_subscriber_and_concurrent_subscribers() {
    let radio = Arc::new(MockRadio::new());
    radio.set_identity("AA:BB", DeviceNumber::new(1)).await;
    let pipeline = setup(Store::open_in_memory().unwrap(), &radio);
    let hub = Arc::clone(&pipeline.state().hub);

    pipeline.process(reading("AA:BB", 20.0, 40.0)).await;
    let mut early = hub.subscribe_samples();
    pipeline.process(reading("AA:BB", 21.0, 41.0)).await;
    let mut late = hub.subscribe_samples();
    pipeline.process(reading("AA:BB", 22.0, 42.0)).await;
    pipeline.process(reading("AA:BB", 23.0, 43.0)).await;

    let early_seen: Vec<f64> = std::iter::from_fn(|| early.try_recv())
        .map(|r| r.temperature_c)
        .collect();
    let late_seen: Vec<f64> = std::iter::from_fn(|| late.try_recv())
        .map(|r| r.temperature_c)
        .collect();

    assert_eq!(early_seen, vec![21.0, 22.0, 23.0]);
    assert_eq!(late_seen, vec![22.0, 23.0]);

    drop(early);
    assert_eq!(hub.sample_subscriber_count(), 1);
}

#[tokio::test]
async fn test_resolution_events_reach_log_feed() {
    let radio = Arc::new(MockRadio::new());
    radio.set_identity("AA:BB", DeviceNumber::new(1)).await;
    radio.fail_next_reads(1);
    let pipeline = setup(Store::open_in_memory().unwrap(), &radio);
    let mut logs = pipeline.state().hub.subscribe_logs();

    pipeline.process(reading("AA:BB", 20.0, 40.0)).await;

    let events: Vec<_> = std::iter::from_fn(|| logs.try_recv()).collect();
    assert!(events.iter().any(|e| e.severity == Severity::Warn));
    assert!(events.iter().any(|e| e.text.contains("AA:BB")));
}

#[tokio::test]
async fn test_rename_after_ingestion() {
    let radio = Arc::new(MockRadio::new());
    radio.set_identity("AA:BB", DeviceNumber::new(1)).await;
    let pipeline = setup(Store::open_in_memory().unwrap(), &radio);
    let queries = SensorQueries::new(Arc::clone(pipeline.state()));
    let mut samples = pipeline.state().hub.subscribe_samples();

    pipeline.process(reading("AA:BB", 20.0, 40.0)).await;
    queries
        .rename_sensor(DeviceNumber::new(1), "Garden")
        .await
        .unwrap();
    queries
        .rename_sensor(DeviceNumber::new(1), "Garden Shed")
        .await
        .unwrap();
    pipeline.process(reading("AA:BB", 21.0, 41.0)).await;

    assert_eq!(samples.recv().await.unwrap().friendly_name, "Garden Shed");

    let sensors = queries.sensors().await;
    assert_eq!(sensors.len(), 1);
    assert_eq!(sensors[0].friendly_name, "Garden Shed");
    assert_eq!(sensors[0].latest.as_ref().unwrap().temperature_c, 21.0);
}

#[tokio::test]
async fn test_read_queries_degrade_to_empty_on_storage_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sensor_data.db");
    let store = Store::open(&path).unwrap();
    store.add_device(DeviceNumber::new(1), "AA:BB").unwrap();
    store.add_sample(DeviceNumber::new(1), 20.0, 40.0).unwrap();

    let radio = Arc::new(MockRadio::new());
    let pipeline = setup(store, &radio);
    let queries = SensorQueries::new(Arc::clone(pipeline.state()));
    assert_eq!(queries.sensors().await.len(), 1);

    let mut logs = pipeline.state().hub.subscribe_logs();
    break_samples_table(&path);

    assert!(queries.sensors().await.is_empty());
    let now = time::OffsetDateTime::now_utc();
    assert!(
        queries
            .samples(now - time::Duration::days(1), now + time::Duration::days(1))
            .await
            .is_empty()
    );

    let errors: Vec<_> = std::iter::from_fn(|| logs.try_recv())
        .filter(|e| e.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].text.contains("sensors"));
    assert!(errors[1].text.contains("samples"));
}

#[tokio::test]
async fn test_failed_write_is_logged_and_not_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sensor_data.db");
    let store = Store::open(&path).unwrap();
    store.add_device(DeviceNumber::new(5), "AA:BB").unwrap();

    let radio = Arc::new(MockRadio::new());
    let pipeline = setup(store, &radio);
    let mut samples = pipeline.state().hub.subscribe_samples();
    let mut logs = pipeline.state().hub.subscribe_logs();
    break_samples_table(&path);

    let outcome = pipeline.process(reading("AA:BB", 20.0, 40.0)).await;

    assert_eq!(outcome, ProcessOutcome::PersistFailed(DeviceNumber::new(5)));
    assert!(samples.try_recv().is_none());
    assert!(
        std::iter::from_fn(|| logs.try_recv())
            .any(|e| e.severity == Severity::Error && e.text.contains("device 5"))
    );

    let stats = pipeline.state().stats.snapshot();
    assert_eq!(stats.persisted, 0);
    assert_eq!(radio.read_count(), 0);
}
