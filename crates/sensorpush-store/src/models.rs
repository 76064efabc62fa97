//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use sensorpush_types::DeviceNumber;

/// A registered device together with its friendly name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedDevice {
    /// Permanent device number read from the sensor.
    pub device_number: DeviceNumber,
    /// Radio address the device advertises from.
    pub radio_address: String,
    /// Friendly name, empty when never renamed.
    pub friendly_name: String,
}

/// A sample stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSample {
    /// Database row ID.
    pub id: i64,
    /// Device the sample belongs to.
    pub device_number: DeviceNumber,
    /// Temperature in degrees Celsius.
    pub temperature_c: f64,
    /// Relative humidity percentage.
    pub humidity_percent: f64,
    /// When the sample was recorded (millisecond precision).
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

/// A sample joined with its device's current friendly name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSample {
    /// Database row ID.
    pub id: i64,
    /// Device the sample belongs to.
    pub device_number: DeviceNumber,
    /// Radio address of the device.
    pub radio_address: String,
    /// Friendly name, empty when never renamed.
    pub friendly_name: String,
    /// Temperature in degrees Celsius.
    pub temperature_c: f64,
    /// Relative humidity percentage.
    pub humidity_percent: f64,
    /// When the sample was recorded (millisecond precision).
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl From<NamedSample> for StoredSample {
    fn from(sample: NamedSample) -> Self {
        Self {
            id: sample.id,
            device_number: sample.device_number,
            temperature_c: sample.temperature_c,
            humidity_percent: sample.humidity_percent,
            recorded_at: sample.recorded_at,
        }
    }
}

/// One row of a CSV export.
#[derive(Debug, Serialize)]
pub(crate) struct CsvRow<'a> {
    pub device_number: u32,
    pub name: &'a str,
    pub recorded_at: String,
    pub temperature_c: f64,
    pub humidity_percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_named_sample_into_stored() {
        let named = NamedSample {
            id: 7,
            device_number: DeviceNumber::new(3),
            radio_address: "AA:BB".to_string(),
            friendly_name: "Garden".to_string(),
            temperature_c: 21.5,
            humidity_percent: 40.0,
            recorded_at: datetime!(2024-05-01 12:00:00 UTC),
        };

        let stored: StoredSample = named.into();
        assert_eq!(stored.id, 7);
        assert_eq!(stored.device_number, DeviceNumber::new(3));
        assert_eq!(stored.recorded_at, datetime!(2024-05-01 12:00:00 UTC));
    }

    #[test]
    fn test_named_device_serializes_number_transparently() {
        let device = NamedDevice {
            device_number: DeviceNumber::new(42),
            radio_address: "AA:BB".to_string(),
            friendly_name: String::new(),
        };
        let json = serde_json::to_string(&device).unwrap();
        assert!(json.contains("\"device_number\":42"));
    }
}
