//! Error types for sensorpush-core.
//!
//! Every variant here describes a failure of the radio layer: scanning,
//! connecting, or reading the identity characteristic. Callers that drive the
//! identity protocol treat all of them as transient: the scanner is resumed
//! and the read is retried on the device's next advertisement.
//!
//! ## Recommended Timeouts
//!
//! | Operation | Recommended Timeout | Notes |
//! |-----------|---------------------|-------|
//! | Connection | 10-15 seconds | May take longer if the sensor is busy |
//! | Service discovery | 5-10 seconds | |
//! | Identity read | 5 seconds | Usually completes in <1s |

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to SensorPush devices.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found on the adapter.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Required BLE characteristic not found on device.
    #[error("Characteristic not found: {uuid} (searched in {service_count} services)")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
        /// Number of services that were searched.
        service_count: usize,
    },

    /// Failed to parse data received from device.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Payload shorter than the format requires.
    #[error("Invalid reading format: expected {expected} bytes, got {actual}")]
    InvalidReadingFormat {
        /// Expected data size.
        expected: usize,
        /// Actual data size received.
        actual: usize,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },
}

/// Reason why a device was not found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with the given address is not known to the adapter.
    NotFound { identifier: String },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    /// Whether the error came from the timeout guard rather than the radio.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether a later attempt may succeed.
    ///
    /// Everything except a missing adapter is transient.
    pub fn is_transient_radio(&self) -> bool {
        !matches!(self, Self::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
    }
}

impl From<sensorpush_types::ParseError> for Error {
    fn from(err: sensorpush_types::ParseError) -> Self {
        match err {
            sensorpush_types::ParseError::InsufficientBytes { expected, actual } => {
                Error::InvalidReadingFormat { expected, actual }
            }
            sensorpush_types::ParseError::InvalidData(msg) => Error::InvalidData(msg),
            sensorpush_types::ParseError::UnknownDeviceType(id) => {
                Error::InvalidData(format!("Unknown device type id: {}", id))
            }
            // Handle future ParseError variants (non_exhaustive)
            _ => Error::InvalidData(format!("Parse error: {}", err)),
        }
    }
}

/// Result type alias using sensorpush-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("AA:BB:CC:DD:EE:FF");
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));

        let err = Error::characteristic_not_found("ef090001", 3);
        assert!(err.to_string().contains("ef090001"));
        assert!(err.to_string().contains("3 services"));

        let err = Error::timeout("read identity", Duration::from_secs(10));
        assert!(err.to_string().contains("read identity"));
        assert!(err.to_string().contains("10s"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_no_adapter_reason() {
        let err = Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter);
        assert!(err.to_string().contains("no Bluetooth adapter"));
        assert!(!err.is_timeout());
        assert!(!err.is_transient_radio());
        assert!(Error::device_not_found("AA:BB").is_transient_radio());
        assert!(Error::timeout("connect to device", Duration::from_secs(1)).is_transient_radio());
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = sensorpush_types::ParseError::InsufficientBytes {
            expected: 4,
            actual: 2,
        }
        .into();
        assert!(matches!(
            err,
            Error::InvalidReadingFormat {
                expected: 4,
                actual: 2
            }
        ));

        let err: Error = sensorpush_types::ParseError::UnknownDeviceType(70).into();
        assert!(err.to_string().contains("70"));
    }

    #[test]
    fn test_btleplug_error_conversion() {
        // btleplug::Error has no public constructors for most variants,
        // so only check that the From impl exists.
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }
}
