//! The ingestion consumer.
//!
//! Takes advertisements off the [`IngestReceiver`] one at a time, filters out
//! anything that is not a SensorPush, resolves the sender's identity,
//! persists the reading and finally publishes it to the hub. An event is
//! processed to completion before the next one is dequeued.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use sensorpush_core::{SharedRadio, parse_advertisement};
use sensorpush_types::{DeviceNumber, RawAdvertisement, SampleRecord};

use crate::log::PipelineLog;
use crate::queue::IngestReceiver;
use crate::resolver::{DeviceResolver, Resolution};
use crate::state::AppState;

/// What processing one advertisement led to.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Not a SensorPush advertisement; dropped.
    Unsupported,
    /// The address is being resolved by another task.
    InProgress,
    /// The advertisement triggered a successful identity read.
    Registered(DeviceNumber),
    /// The identity read failed; the next advertisement retries.
    ResolutionFailed,
    /// Known device, but the payload carried no complete reading.
    NoReading(DeviceNumber),
    /// Sample stored and published.
    Persisted(SampleRecord),
    /// The store rejected the sample.
    PersistFailed(DeviceNumber),
}

/// Turns queued advertisements into stored, broadcast samples.
#[derive(Debug)]
pub struct SamplePipeline {
    state: Arc<AppState>,
    resolver: DeviceResolver,
    log: PipelineLog,
}

impl SamplePipeline {
    /// Create a pipeline over `state` that resolves identities with `radio`.
    pub fn new(state: Arc<AppState>, radio: SharedRadio) -> Self {
        let log = state.log();
        let resolver = DeviceResolver::new(
            radio,
            state.config.radio.identity_read_timeout(),
            log.clone(),
        );
        Self {
            state,
            resolver,
            log,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn resolver(&self) -> &DeviceResolver {
        &self.resolver
    }

    /// Process one advertisement to completion.
    pub async fn process(&self, advertisement: RawAdvertisement) -> ProcessOutcome {
        let stats = &self.state.stats;
        stats.record_received();

        let Some(decoded) = parse_advertisement(&advertisement) else {
            debug!(
                radio_address = %advertisement.radio_address,
                "Ignoring unsupported advertisement"
            );
            stats.record_unsupported();
            return ProcessOutcome::Unsupported;
        };

        let address = advertisement.radio_address.as_str();
        let number = match self.resolver.resolve(address, &self.state.store).await {
            Resolution::Known(number) => number,
            Resolution::Registered(number) => {
                stats.record_resolution(true);
                return ProcessOutcome::Registered(number);
            }
            Resolution::InProgress => return ProcessOutcome::InProgress,
            Resolution::Failed => {
                stats.record_resolution(false);
                return ProcessOutcome::ResolutionFailed;
            }
        };

        let Some((temperature_c, humidity_percent)) = decoded.climate() else {
            debug!(%number, "Advertisement carried no reading");
            return ProcessOutcome::NoReading(number);
        };

        self.persist(number, &advertisement, temperature_c, humidity_percent)
            .await
    }

    /// Store a sample, then publish it. Publishing only happens once the
    /// sample is durable.
    async fn persist(
        &self,
        number: DeviceNumber,
        advertisement: &RawAdvertisement,
        temperature_c: f64,
        humidity_percent: f64,
    ) -> ProcessOutcome {
        let recorded_at = now_millis();

        let (written, name) = {
            let store = self.state.store.lock().await;
            let written = store.add_sample_at(number, temperature_c, humidity_percent, recorded_at);
            let name = if written.is_ok() {
                store.friendly_name(number)
            } else {
                Ok(String::new())
            };
            (written, name)
        };

        if let Err(e) = written {
            self.state.stats.record_persist(false);
            self.log
                .error(format!("Failed to store sample for device {}: {}", number, e));
            return ProcessOutcome::PersistFailed(number);
        }
        self.state.stats.record_persist(true);

        let friendly_name = name.unwrap_or_else(|e| {
            self.log
                .warn(format!("Failed to look up name of device {}: {}", number, e));
            String::new()
        });

        let record = SampleRecord {
            device_number: number,
            radio_address: advertisement.radio_address.clone(),
            friendly_name,
            temperature_c,
            humidity_percent,
            rssi: advertisement.signal_strength,
            recorded_at,
        };

        let recipients = self.state.hub.publish_sample(record.clone());
        debug!(%number, temperature_c, humidity_percent, recipients, "Sample published");

        ProcessOutcome::Persisted(record)
    }

    /// Consume `receiver` until it is exhausted or `cancel` fires.
    ///
    /// Cancellation is observed only between events, so an in-flight
    /// resolution always finishes with the scanner resumed.
    pub async fn run(&self, mut receiver: IngestReceiver, cancel: CancellationToken) {
        self.state.stats.set_running(true);
        info!("Sample pipeline started");

        loop {
            let advertisement = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Sample pipeline cancelled");
                    break;
                }
                next = receiver.next() => match next {
                    Some(advertisement) => advertisement,
                    None => {
                        info!("Ingestion queue closed");
                        break;
                    }
                },
            };

            self.process(advertisement).await;
        }

        self.state.stats.set_running(false);
        info!(
            pending = receiver.len(),
            "Sample pipeline stopped"
        );
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn start(
        self: Arc<Self>,
        receiver: IngestReceiver,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(receiver, cancel).await })
    }
}

/// The current time truncated to the store's millisecond resolution, so the
/// published record matches the stored row.
fn now_millis() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_millisecond(now.millisecond()).unwrap_or(now)
}
