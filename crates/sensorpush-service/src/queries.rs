//! Read and rename operations for an API layer.
//!
//! Read queries degrade to empty results when the store fails; the cause is
//! logged. Renames report failures as [`QueryError`].

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use sensorpush_store::{Error as StoreError, NamedSample, StoredSample};
use sensorpush_types::DeviceNumber;

use crate::log::PipelineLog;
use crate::state::AppState;

/// Errors from [`SensorQueries`] operations that report failures.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// No device with this number is registered.
    #[error("Unknown device: {0}")]
    UnknownDevice(DeviceNumber),
    /// The change collided with an existing record.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The store failed.
    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownDevice(number) => QueryError::UnknownDevice(number),
            err @ StoreError::Conflict { .. } => QueryError::Conflict(err.to_string()),
            other => QueryError::Storage(other),
        }
    }
}

/// A device with its name and most recent sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSummary {
    pub device_number: DeviceNumber,
    pub radio_address: String,
    /// Empty when the device was never renamed.
    pub friendly_name: String,
    /// Most recent sample, if any.
    pub latest: Option<StoredSample>,
}

/// Query facade over the shared store.
#[derive(Debug, Clone)]
pub struct SensorQueries {
    state: Arc<AppState>,
    log: PipelineLog,
}

impl SensorQueries {
    pub fn new(state: Arc<AppState>) -> Self {
        let log = state.log();
        Self { state, log }
    }

    /// Every registered device, ascending by number, with its latest sample.
    pub async fn sensors(&self) -> Vec<SensorSummary> {
        let store = self.state.store.lock().await;
        let result: sensorpush_store::Result<Vec<SensorSummary>> =
            store.list_devices_with_names().and_then(|devices| {
                let mut latest = store.latest_sample_per_device()?;
                Ok(devices
                    .into_iter()
                    .map(|device| SensorSummary {
                        latest: latest.remove(&device.device_number),
                        device_number: device.device_number,
                        radio_address: device.radio_address,
                        friendly_name: device.friendly_name,
                    })
                    .collect())
            });

        result.unwrap_or_else(|e| {
            self.log.error(format!("Failed to list sensors: {}", e));
            Vec::new()
        })
    }

    /// Samples recorded between `begin` and `end` inclusive, oldest first.
    pub async fn samples(&self, begin: OffsetDateTime, end: OffsetDateTime) -> Vec<NamedSample> {
        let result = self.state.store.lock().await.samples_in_range(begin, end);
        result.unwrap_or_else(|e| {
            self.log.error(format!("Failed to query samples: {}", e));
            Vec::new()
        })
    }

    /// Give a device a friendly name and return its updated summary.
    pub async fn rename_sensor(
        &self,
        device_number: DeviceNumber,
        name: &str,
    ) -> Result<SensorSummary, QueryError> {
        let store = self.state.store.lock().await;
        store.rename_device(device_number, name)?;

        let device = store
            .device_by_number(device_number)?
            .ok_or(QueryError::UnknownDevice(device_number))?;
        let latest = store.latest_sample(device_number)?;

        self.log.info(format!(
            "Device {} renamed to \"{}\"",
            device_number, device.friendly_name
        ));

        Ok(SensorSummary {
            device_number: device.device_number,
            radio_address: device.radio_address,
            friendly_name: device.friendly_name,
            latest,
        })
    }

    /// Write samples between `begin` and `end` as CSV. Returns the row count.
    pub async fn export_csv<W: Write>(
        &self,
        begin: OffsetDateTime,
        end: OffsetDateTime,
        writer: W,
    ) -> Result<usize, QueryError> {
        let store = self.state.store.lock().await;
        Ok(store.export_samples_csv(begin, end, writer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use sensorpush_store::Store;
    use time::macros::datetime;

    async fn queries() -> SensorQueries {
        let store = Store::open_in_memory().unwrap();
        store.add_device(DeviceNumber::new(2), "CC:DD").unwrap();
        store.add_device(DeviceNumber::new(1), "AA:BB").unwrap();
        store
            .add_sample_at(
                DeviceNumber::new(1),
                21.0,
                40.0,
                datetime!(2024-05-01 12:00 UTC),
            )
            .unwrap();
        store
            .add_sample_at(
                DeviceNumber::new(1),
                22.0,
                41.0,
                datetime!(2024-05-01 13:00 UTC),
            )
            .unwrap();
        SensorQueries::new(AppState::new(store, Config::default()))
    }

    #[tokio::test]
    async fn test_sensors_with_latest() {
        let queries = queries().await;
        let sensors = queries.sensors().await;

        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].device_number, DeviceNumber::new(1));
        assert_eq!(sensors[0].latest.as_ref().unwrap().temperature_c, 22.0);
        assert_eq!(sensors[1].device_number, DeviceNumber::new(2));
        assert!(sensors[1].latest.is_none());
        assert_eq!(sensors[1].friendly_name, "");
    }

    #[tokio::test]
    async fn test_samples_in_range() {
        let queries = queries().await;

        let all = queries
            .samples(
                datetime!(2024-05-01 00:00 UTC),
                datetime!(2024-05-02 00:00 UTC),
            )
            .await;
        assert_eq!(all.len(), 2);
        assert!(all[0].recorded_at < all[1].recorded_at);

        let none = queries
            .samples(
                datetime!(2023-01-01 00:00 UTC),
                datetime!(2023-01-02 00:00 UTC),
            )
            .await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_rename_sensor() {
        let queries = queries().await;

        queries
            .rename_sensor(DeviceNumber::new(1), "Garden")
            .await
            .unwrap();
        let summary = queries
            .rename_sensor(DeviceNumber::new(1), "Garden Shed")
            .await
            .unwrap();

        assert_eq!(summary.friendly_name, "Garden Shed");
        assert_eq!(summary.latest.unwrap().temperature_c, 22.0);

        let sensors = queries.sensors().await;
        assert_eq!(sensors[0].friendly_name, "Garden Shed");
    }

    #[tokio::test]
    async fn test_rename_unknown_sensor() {
        let queries = queries().await;
        let result = queries.rename_sensor(DeviceNumber::new(99), "Ghost").await;
        assert!(matches!(
            result,
            Err(QueryError::UnknownDevice(n)) if n == DeviceNumber::new(99)
        ));
    }

    #[tokio::test]
    async fn test_export_csv() {
        let queries = queries().await;
        let mut out = Vec::new();

        let rows = queries
            .export_csv(
                datetime!(2024-05-01 00:00 UTC),
                datetime!(2024-05-02 00:00 UTC),
                &mut out,
            )
            .await
            .unwrap();

        assert_eq!(rows, 2);
        assert!(String::from_utf8(out).unwrap().contains("2024-05-01T13:00:00Z"));
    }

    #[test]
    fn test_query_error_from_store() {
        let err = QueryError::from(StoreError::Conflict {
            device_number: DeviceNumber::new(1),
            radio_address: "AA:BB".to_string(),
        });
        assert!(matches!(err, QueryError::Conflict(_)));

        let err = QueryError::from(StoreError::UnknownDevice(DeviceNumber::new(4)));
        assert!(matches!(err, QueryError::UnknownDevice(_)));
    }

    #[test]
    fn test_sensor_summary_serialization() {
        let summary = SensorSummary {
            device_number: DeviceNumber::new(1),
            radio_address: "AA:BB".to_string(),
            friendly_name: "Garden".to_string(),
            latest: None,
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"friendly_name\":\"Garden\""));
        assert!(json.contains("\"latest\":null"));
    }
}
