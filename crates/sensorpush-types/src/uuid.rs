//! Bluetooth UUIDs for SensorPush devices.
//!
//! This module contains the UUIDs needed to identify SensorPush sensors and
//! read their permanent identity over Bluetooth Low Energy.

use uuid::{Uuid, uuid};

/// Device id characteristic: a little-endian `u32` that never changes for the
/// lifetime of the sensor.
pub const DEVICE_ID: Uuid = uuid!("ef090001-11d6-42ba-93b8-9dd7ec090aa9");
