//! Device identity resolution.
//!
//! An advertisement only carries a radio address. The permanent device
//! number has to be read over a point-to-point connection, which requires
//! the scanner to be stopped for the duration of the read:
//!
//! 1. pause scanning
//! 2. read the identity characteristic (bounded by a timeout)
//! 3. register the device in the store
//! 4. resume scanning, whatever happened in 1-3
//!
//! Each address is resolved at most once per process. A failed attempt
//! returns the address to [`ResolutionState::Unknown`] so its next
//! advertisement retries.

use std::collections::HashMap;
use std::sync::{Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use sensorpush_core::SharedRadio;
use sensorpush_store::{Error as StoreError, Store};
use sensorpush_types::DeviceNumber;

use crate::log::PipelineLog;

/// Where an address is in its resolution lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Never resolved, or the last attempt failed.
    Unknown,
    /// An identity read is in progress.
    Resolving,
    /// Registered; terminal for the process lifetime.
    Known(DeviceNumber),
}

/// Result of a [`DeviceResolver::resolve`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Already known; no radio interaction took place.
    Known(DeviceNumber),
    /// Resolved by this call's identity read.
    Registered(DeviceNumber),
    /// Another call is resolving this address.
    InProgress,
    /// The attempt failed; the address may be retried.
    Failed,
}

impl Resolution {
    /// The device number, if the address is now known.
    pub fn device_number(&self) -> Option<DeviceNumber> {
        match self {
            Resolution::Known(n) | Resolution::Registered(n) => Some(*n),
            Resolution::InProgress | Resolution::Failed => None,
        }
    }
}

type StateMap = HashMap<String, ResolutionState>;

/// Resolves radio addresses to device numbers.
pub struct DeviceResolver {
    radio: SharedRadio,
    read_timeout: Duration,
    states: StdMutex<StateMap>,
    scan_lock: Mutex<()>,
    log: PipelineLog,
}

impl std::fmt::Debug for DeviceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceResolver")
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl DeviceResolver {
    /// Create a resolver driving `radio`.
    pub fn new(radio: SharedRadio, read_timeout: Duration, log: PipelineLog) -> Self {
        Self {
            radio,
            read_timeout,
            states: StdMutex::new(HashMap::new()),
            scan_lock: Mutex::new(()),
            log,
        }
    }

    fn states(&self) -> MutexGuard<'_, StateMap> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state of `radio_address`.
    pub fn state(&self, radio_address: &str) -> ResolutionState {
        self.states()
            .get(radio_address)
            .copied()
            .unwrap_or(ResolutionState::Unknown)
    }

    /// Number of addresses in the `Known` state.
    pub fn known_count(&self) -> usize {
        self.states()
            .values()
            .filter(|s| matches!(s, ResolutionState::Known(_)))
            .count()
    }

    /// Mark every device registered by a previous run as known.
    pub fn preload(&self, store: &Store) -> sensorpush_store::Result<usize> {
        let devices = store.list_devices_with_names()?;
        let mut states = self.states();
        for device in &devices {
            states.insert(
                device.radio_address.clone(),
                ResolutionState::Known(device.device_number),
            );
        }
        Ok(devices.len())
    }

    /// Resolve `radio_address`, reading its identity if necessary.
    ///
    /// The store lock is taken only around store calls, never while the
    /// radio is in use.
    pub async fn resolve(&self, radio_address: &str, store: &Mutex<Store>) -> Resolution {
        let claim = match self.claim(radio_address) {
            Ok(claim) => claim,
            Err(resolution) => return resolution,
        };

        let stored = store.lock().await.resolve_number(radio_address);
        match stored {
            Ok(Some(number)) => {
                debug!(radio_address, %number, "Address registered by a previous run");
                claim.finish(ResolutionState::Known(number));
                return Resolution::Known(number);
            }
            Ok(None) => {}
            Err(e) => {
                self.log
                    .error(format!("Failed to look up {}: {}", radio_address, e));
                claim.finish(ResolutionState::Unknown);
                return Resolution::Failed;
            }
        }

        let resolution = self.identify(radio_address, store).await;
        let state = match resolution.device_number() {
            Some(number) => ResolutionState::Known(number),
            None => ResolutionState::Unknown,
        };
        claim.finish(state);
        resolution
    }

    /// Move `radio_address` to `Resolving`, or report why that is not needed.
    fn claim<'a>(&'a self, radio_address: &str) -> Result<Claim<'a>, Resolution> {
        let mut states = self.states();
        match states.get(radio_address) {
            Some(ResolutionState::Known(number)) => Err(Resolution::Known(*number)),
            Some(ResolutionState::Resolving) => {
                debug!(radio_address, "Resolution already in progress, ignoring");
                Err(Resolution::InProgress)
            }
            Some(ResolutionState::Unknown) | None => {
                states.insert(radio_address.to_string(), ResolutionState::Resolving);
                Ok(Claim {
                    resolver: self,
                    radio_address: radio_address.to_string(),
                    done: false,
                })
            }
        }
    }

    /// Run the pause / read / register / resume protocol.
    async fn identify(&self, radio_address: &str, store: &Mutex<Store>) -> Resolution {
        let _scan = self.scan_lock.lock().await;

        if let Err(e) = self.radio.pause_scan().await {
            self.log.error(format!(
                "Failed to pause scanning before reading {}: {}",
                radio_address, e
            ));
            self.resume_scan().await;
            return Resolution::Failed;
        }

        let resolution = match self.read_number(radio_address).await {
            Some(number) => self.register(radio_address, number, store).await,
            None => Resolution::Failed,
        };

        self.resume_scan().await;
        resolution
    }

    async fn read_number(&self, radio_address: &str) -> Option<DeviceNumber> {
        self.log
            .info(format!("Reading device number from {}", radio_address));

        let bytes = match tokio::time::timeout(
            self.read_timeout,
            self.radio.read_identity(radio_address),
        )
        .await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) if e.is_transient_radio() => {
                self.log.warn(format!(
                    "Identity read from {} failed, will retry: {}",
                    radio_address, e
                ));
                return None;
            }
            Ok(Err(e)) => {
                self.log
                    .error(format!("Identity read from {} failed: {}", radio_address, e));
                return None;
            }
            Err(_) => {
                self.log.warn(format!(
                    "Identity read from {} timed out after {:?}, will retry",
                    radio_address, self.read_timeout
                ));
                return None;
            }
        };

        match DeviceNumber::from_identity_bytes(&bytes) {
            Ok(number) => Some(number),
            Err(e) => {
                self.log.warn(format!(
                    "Malformed identity from {}: {}",
                    radio_address, e
                ));
                None
            }
        }
    }

    async fn register(
        &self,
        radio_address: &str,
        number: DeviceNumber,
        store: &Mutex<Store>,
    ) -> Resolution {
        let store = store.lock().await;
        match store.add_device(number, radio_address) {
            Ok(_) => {
                self.log.info(format!(
                    "Registered device {} at {}",
                    number, radio_address
                ));
                Resolution::Registered(number)
            }
            Err(StoreError::Conflict { .. }) => match store.resolve_number(radio_address) {
                Ok(Some(stored)) => {
                    self.log.info(format!(
                        "Address {} already registered as device {}",
                        radio_address, stored
                    ));
                    Resolution::Registered(stored)
                }
                Ok(None) => {
                    self.log.error(format!(
                        "Device {} read from {} is registered at another address",
                        number, radio_address
                    ));
                    Resolution::Failed
                }
                Err(e) => {
                    self.log
                        .error(format!("Failed to look up {}: {}", radio_address, e));
                    Resolution::Failed
                }
            },
            Err(e) => {
                self.log.error(format!(
                    "Failed to register device {} at {}: {}",
                    number, radio_address, e
                ));
                Resolution::Failed
            }
        }
    }

    async fn resume_scan(&self) {
        if let Err(e) = self.radio.resume_scan().await {
            self.log
                .critical(format!("Failed to resume scanning: {}", e));
        }
    }
}

/// Ownership of an address's `Resolving` state.
///
/// Dropped without [`finish`](Claim::finish), the address reverts to `Unknown`.
struct Claim<'a> {
    resolver: &'a DeviceResolver,
    radio_address: String,
    done: bool,
}

impl Claim<'_> {
    fn finish(mut self, state: ResolutionState) {
        self.set(state);
        self.done = true;
    }

    fn set(&self, state: ResolutionState) {
        self.resolver
            .states()
            .insert(self.radio_address.clone(), state);
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.set(ResolutionState::Unknown);
        }
    }
}
