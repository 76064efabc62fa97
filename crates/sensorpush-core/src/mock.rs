//! Mock radio implementation for testing.
//!
//! This module provides a mock radio that can be used for unit testing
//! without requiring actual BLE hardware.
//!
//! The [`MockRadio`] implements the [`Radio`] trait, allowing it to be
//! used interchangeably with the real adapter in generic code.
//!
//! # Features
//!
//! - **Call accounting**: Counts pauses, resumes and identity reads, and
//!   records the highest number of reads ever in flight at once
//! - **Failure injection**: Fail pauses, or the next N identity reads
//! - **Latency simulation**: Add artificial delays to identity reads

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::traits::Radio;
use sensorpush_types::DeviceNumber;

/// A mock radio for testing.
///
/// # Example
///
/// ```
/// use sensorpush_core::{MockRadio, Radio};
/// use sensorpush_types::DeviceNumber;
///
/// #[tokio::main]
/// async fn main() {
///     let radio = MockRadio::new();
///     radio.set_identity("AA:BB", DeviceNumber::new(1)).await;
///
///     radio.pause_scan().await.unwrap();
///     let bytes = radio.read_identity("AA:BB").await.unwrap();
///     radio.resume_scan().await.unwrap();
///
///     assert_eq!(bytes, vec![1, 0, 0, 0]);
///     assert_eq!(radio.read_count(), 1);
/// }
/// ```
#[derive(Debug)]
pub struct MockRadio {
    identities: RwLock<HashMap<String, Vec<u8>>>,
    scanning: AtomicBool,
    pause_count: AtomicU32,
    resume_count: AtomicU32,
    read_count: AtomicU32,
    reads_in_flight: AtomicU32,
    max_reads_in_flight: AtomicU32,
    fail_pause: AtomicBool,
    /// Number of identity reads to fail before succeeding.
    remaining_read_failures: AtomicU32,
    /// Simulated read latency in milliseconds (0 = no delay).
    read_latency_ms: AtomicU64,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRadio {
    /// Create a mock radio that is scanning and knows no devices.
    pub fn new() -> Self {
        Self {
            identities: RwLock::new(HashMap::new()),
            scanning: AtomicBool::new(true),
            pause_count: AtomicU32::new(0),
            resume_count: AtomicU32::new(0),
            read_count: AtomicU32::new(0),
            reads_in_flight: AtomicU32::new(0),
            max_reads_in_flight: AtomicU32::new(0),
            fail_pause: AtomicBool::new(false),
            remaining_read_failures: AtomicU32::new(0),
            read_latency_ms: AtomicU64::new(0),
        }
    }

    /// Make `radio_address` answer identity reads with `number`.
    pub async fn set_identity(&self, radio_address: &str, number: DeviceNumber) {
        self.set_identity_bytes(radio_address, number.get().to_le_bytes().to_vec())
            .await;
    }

    /// Make `radio_address` answer identity reads with raw bytes.
    pub async fn set_identity_bytes(&self, radio_address: &str, bytes: Vec<u8>) {
        self.identities
            .write()
            .await
            .insert(radio_address.to_string(), bytes);
    }

    /// Fail every subsequent `pause_scan` call.
    pub fn set_fail_pause(&self, fail: bool) {
        self.fail_pause.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` identity reads.
    pub fn fail_next_reads(&self, count: u32) {
        self.remaining_read_failures.store(count, Ordering::Relaxed);
    }

    /// Delay every identity read by `latency`.
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Whether the scanner is currently running.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Relaxed)
    }

    /// Number of `pause_scan` calls.
    pub fn pause_count(&self) -> u32 {
        self.pause_count.load(Ordering::Relaxed)
    }

    /// Number of `resume_scan` calls.
    pub fn resume_count(&self) -> u32 {
        self.resume_count.load(Ordering::Relaxed)
    }

    /// Number of `read_identity` calls.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// Highest number of identity reads observed running at once.
    pub fn max_concurrent_reads(&self) -> u32 {
        self.max_reads_in_flight.load(Ordering::Relaxed)
    }

    fn take_read_failure(&self) -> bool {
        self.remaining_read_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Radio for MockRadio {
    async fn pause_scan(&self) -> Result<()> {
        self.pause_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_pause.load(Ordering::Relaxed) {
            return Err(Error::InvalidData("Mock pause failure".to_string()));
        }
        self.scanning.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn resume_scan(&self) -> Result<()> {
        self.resume_count.fetch_add(1, Ordering::Relaxed);
        self.scanning.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn read_identity(&self, radio_address: &str) -> Result<Vec<u8>> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        let _in_flight = InFlight::enter(&self.reads_in_flight, &self.max_reads_in_flight);

        let latency = self.read_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.take_read_failure() {
            Err(Error::InvalidData("Mock read failure".to_string()))
        } else {
            self.identities
                .read()
                .await
                .get(radio_address)
                .cloned()
                .ok_or_else(|| Error::device_not_found(radio_address))
        }
    }
}

/// Tracks a read in flight, including reads abandoned by a caller's timeout.
struct InFlight<'a>(&'a AtomicU32);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicU32, max: &AtomicU32) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
