//! Platform-agnostic types for SensorPush telemetry.
//!
//! This crate provides the shared data model used by the radio layer
//! (sensorpush-core), the storage engine (sensorpush-store), and the
//! ingestion service (sensorpush-service).
//!
//! # Features
//!
//! - Device identity ([`DeviceNumber`]) and model detection ([`DeviceType`])
//! - Raw advertisements as delivered by the radio transport
//! - Distribution records for live observers ([`SampleRecord`], [`LogEvent`])
//! - UUID constants for BLE characteristics
//!
//! # Example
//!
//! ```
//! use sensorpush_types::{DeviceNumber, Severity};
//!
//! let number = DeviceNumber::from_identity_bytes(&[0x2A, 0x00, 0x00, 0x00]).unwrap();
//! assert_eq!(number.get(), 42);
//! assert!(Severity::Error > Severity::Warn);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    DEVICE_NUMBER_BYTES, DeviceNumber, DeviceType, LogEvent, RawAdvertisement, SampleRecord,
    Severity,
};
pub use uuid as uuids;
