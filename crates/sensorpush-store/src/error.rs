//! Error types for sensorpush-store.

use std::path::PathBuf;

use sensorpush_types::DeviceNumber;

/// Result type for sensorpush-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sensorpush-store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Registration collided with an existing device number or radio address.
    #[error("Device {device_number} at {radio_address} conflicts with an existing device")]
    Conflict {
        device_number: DeviceNumber,
        radio_address: String,
    },

    /// The referenced device number is not registered.
    #[error("Unknown device: {0}")]
    UnknownDevice(DeviceNumber),

    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// CSV export error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the storage medium itself failed, as opposed to the request
    /// being rejected.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Error::Conflict { .. } | Error::UnknownDevice(_))
    }
}
