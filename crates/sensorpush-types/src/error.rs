//! Error types for data parsing in sensorpush-types.

use thiserror::Error;

/// Errors that can occur when parsing SensorPush data.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in sensorpush-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Failed to parse data due to malformed content.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Not enough bytes to decode the value.
    #[error("Insufficient bytes: expected at least {expected}, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// Device type id is not a known SensorPush model.
    #[error("Unknown device type id: {0}")]
    UnknownDeviceType(u8),

    /// Severity label is not recognised.
    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),
}

/// Result type alias using sensorpush-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
