//! Ingestion pipeline and live broadcast hub for SensorPush sensors.
//!
//! This crate provides a service that:
//! - Queues every advertisement the radio reports, in arrival order
//! - Reads the permanent device number of each newly seen sensor
//! - Stores temperature and humidity samples in the local database
//! - Fans out new samples and pipeline log events to live subscribers
//! - Answers sensor, sample-range and rename queries for an API layer
//!
//! # Data Flow
//!
//! ```text
//! radio -> IngestQueue -> SamplePipeline -> DeviceResolver (new devices)
//!                                        -> Store (samples)
//!                                        -> BroadcastHub (live feeds)
//! ```
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/sensorpush/service.toml`:
//!
//! ```toml
//! [storage]
//! path = "~/.local/share/sensorpush/sensor_data.db"
//!
//! [radio]
//! identity_read_timeout_secs = 15
//! adapter_index = 0
//!
//! [broadcast]
//! subscriber_buffer = 256
//! feed_level = "info"
//! ```

pub mod config;
pub mod hub;
pub mod log;
pub mod pipeline;
pub mod queries;
pub mod queue;
pub mod resolver;
pub mod state;

pub use config::{BroadcastConfig, Config, ConfigError, RadioConfig, StorageConfig};
pub use hub::{BroadcastHub, Feed, Subscription};
pub use log::{LogSink, NullSink, PipelineLog};
pub use pipeline::{ProcessOutcome, SamplePipeline};
pub use queries::{QueryError, SensorQueries, SensorSummary};
pub use queue::{IngestQueue, IngestReceiver, QueueError};
pub use resolver::{DeviceResolver, Resolution, ResolutionState};
pub use state::{AppState, PipelineStats, StatsSnapshot};
