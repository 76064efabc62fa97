//! Core types for SensorPush telemetry.

use core::fmt;
use std::collections::HashMap;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Number of bytes in the identity characteristic payload.
pub const DEVICE_NUMBER_BYTES: usize = 4;

/// Permanent numeric identity of a sensor, read once from the device itself.
///
/// # Examples
///
/// ```
/// use sensorpush_types::DeviceNumber;
///
/// let number = DeviceNumber::from_identity_bytes(&[0x01, 0x00, 0x00, 0x00]).unwrap();
/// assert_eq!(number.get(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeviceNumber(u32);

impl DeviceNumber {
    /// Wrap a raw device number.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The raw numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Decode the identity characteristic payload.
    ///
    /// The first four bytes are an unsigned little-endian integer; any
    /// trailing bytes are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if fewer than four bytes
    /// are supplied.
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_identity_bytes(data: &[u8]) -> Result<Self, ParseError> {
        use bytes::Buf;

        if data.len() < DEVICE_NUMBER_BYTES {
            return Err(ParseError::InsufficientBytes {
                expected: DEVICE_NUMBER_BYTES,
                actual: data.len(),
            });
        }

        let mut buf = data;
        Ok(Self(buf.get_u32_le()))
    }
}

impl From<u32> for DeviceNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<DeviceNumber> for u32 {
    fn from(value: DeviceNumber) -> Self {
        value.0
    }
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SensorPush hardware model.
///
/// The numeric value is the type id carried in page 0 of the manufacturer
/// advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum DeviceType {
    /// Original HT1 temperature and humidity sensor.
    Ht1 = 64,
    /// HT.w water-resistant temperature and humidity sensor.
    HtW = 65,
    /// HTP.xw temperature, humidity and barometric pressure sensor.
    HtpXw = 66,
}

impl DeviceType {
    /// Detect the model from an advertised local name.
    ///
    /// Sensors advertise names such as `SensorPush HT.w 0CA1`, so the model
    /// tag is matched anywhere in the name. A name carrying only the brand is
    /// taken as an HT1.
    ///
    /// # Examples
    ///
    /// ```
    /// use sensorpush_types::DeviceType;
    ///
    /// assert_eq!(DeviceType::from_name("SensorPush HTP.xw F4D"), Some(DeviceType::HtpXw));
    /// assert_eq!(DeviceType::from_name("SensorPush HT.w 0CA1"), Some(DeviceType::HtW));
    /// assert_eq!(DeviceType::from_name("SensorPush HT1"), Some(DeviceType::Ht1));
    /// assert_eq!(DeviceType::from_name("Headphones"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        if name.contains("HTP.xw") {
            Some(DeviceType::HtpXw)
        } else if name.contains("HT.w") {
            Some(DeviceType::HtW)
        } else if name.contains("SensorPush") {
            Some(DeviceType::Ht1)
        } else {
            None
        }
    }

    /// Type id as carried in the advertisement.
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Whether this model reports barometric pressure.
    #[must_use]
    pub fn has_pressure(&self) -> bool {
        matches!(self, DeviceType::HtpXw)
    }
}

impl TryFrom<u8> for DeviceType {
    type Error = ParseError;

    /// Convert an advertisement type id to a `DeviceType`.
    ///
    /// # Examples
    ///
    /// ```
    /// use sensorpush_types::DeviceType;
    ///
    /// assert_eq!(DeviceType::try_from(64), Ok(DeviceType::Ht1));
    /// assert!(DeviceType::try_from(0x00).is_err());
    /// ```
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            64 => Ok(DeviceType::Ht1),
            65 => Ok(DeviceType::HtW),
            66 => Ok(DeviceType::HtpXw),
            _ => Err(ParseError::UnknownDeviceType(value)),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Ht1 => write!(f, "HT1"),
            DeviceType::HtW => write!(f, "HT.w"),
            DeviceType::HtpXw => write!(f, "HTP.xw"),
        }
    }
}

/// Severity of a [`LogEvent`].
///
/// Ordered from least to most severe so level filters can use comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl Severity {
    /// Upper-case label, as shown to observers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(ParseError::UnknownSeverity(s.to_string())),
        }
    }
}

/// An ephemeral diagnostic event delivered to log-feed observers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LogEvent {
    /// When the event was raised.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Severity level.
    pub severity: Severity,
    /// Human-readable message.
    pub text: String,
}

impl LogEvent {
    /// Create an event stamped with the current time.
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            severity,
            text: text.into(),
        }
    }
}

/// A newly persisted sample, as distributed to live observers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleRecord {
    /// Permanent device number.
    pub device_number: DeviceNumber,
    /// Radio address the sample was received from.
    pub radio_address: String,
    /// Friendly name, empty when the device was never renamed.
    pub friendly_name: String,
    /// Temperature in degrees Celsius.
    pub temperature_c: f64,
    /// Relative humidity percentage.
    pub humidity_percent: f64,
    /// Signal strength of the advertisement in dBm.
    pub rssi: Option<i16>,
    /// When the sample was recorded.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub recorded_at: OffsetDateTime,
}

/// A raw advertisement as delivered by the radio transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAdvertisement {
    /// Stable hardware address (MAC, or platform identifier on macOS).
    pub radio_address: String,
    /// Advertised local name, if any.
    pub display_name: Option<String>,
    /// Received signal strength in dBm.
    pub signal_strength: Option<i16>,
    /// Manufacturer-specific data keyed by company id.
    pub manufacturer_payload: HashMap<u16, Vec<u8>>,
    /// Service data keyed by service UUID.
    pub service_payload: HashMap<uuid::Uuid, Vec<u8>>,
}

impl RawAdvertisement {
    /// Create an advertisement carrying only an address.
    pub fn new(radio_address: impl Into<String>) -> Self {
        Self {
            radio_address: radio_address.into(),
            ..Default::default()
        }
    }

    /// Set the advertised local name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the signal strength.
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.signal_strength = Some(rssi);
        self
    }

    /// Add a manufacturer data entry.
    pub fn with_manufacturer_data(mut self, company_id: u16, data: Vec<u8>) -> Self {
        self.manufacturer_payload.insert(company_id, data);
        self
    }
}
