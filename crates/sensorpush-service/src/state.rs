//! State shared by the pipeline components.
//!
//! The store connection lives here behind a `tokio::sync::Mutex`; it is only
//! ever reached through [`Store`] methods and never held across a radio call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use sensorpush_store::Store;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::hub::BroadcastHub;
use crate::log::PipelineLog;

/// Shared application state.
pub struct AppState {
    /// The data store.
    pub store: Mutex<Store>,
    /// Configuration the service was started with.
    pub config: Config,
    /// Live feeds.
    pub hub: Arc<BroadcastHub>,
    /// Pipeline counters.
    pub stats: PipelineStats,
}

impl AppState {
    /// Create new application state.
    ///
    /// The hub's per-subscriber buffer and log feed level come from
    /// `config.broadcast`.
    pub fn new(store: Store, config: Config) -> Arc<Self> {
        let hub = Arc::new(BroadcastHub::from_config(&config.broadcast));
        Arc::new(Self {
            store: Mutex::new(store),
            config,
            hub,
            stats: PipelineStats::new(),
        })
    }

    /// A log handle that feeds the hub's log feed.
    pub fn log(&self) -> PipelineLog {
        PipelineLog::new(self.hub.clone())
    }

    /// Take back the store, e.g. to close it on shutdown.
    pub fn into_store(self) -> Store {
        self.store.into_inner()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

/// Counters describing what the pipeline has done so far.
#[derive(Debug, Default)]
pub struct PipelineStats {
    running: AtomicBool,
    started_at: AtomicU64,
    received: AtomicU64,
    unsupported: AtomicU64,
    resolutions: AtomicU64,
    resolution_failures: AtomicU64,
    persisted: AtomicU64,
    persist_failures: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the consumer is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the consumer as started or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        if running {
            let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
            self.started_at.store(now, Ordering::SeqCst);
        }
    }

    /// When the consumer was last started.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        let ts = self.started_at.load(Ordering::SeqCst);
        if ts == 0 {
            None
        } else {
            OffsetDateTime::from_unix_timestamp(ts as i64).ok()
        }
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unsupported(&self) {
        self.unsupported.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_resolution(&self, succeeded: bool) {
        if succeeded {
            self.resolutions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.resolution_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_persist(&self, succeeded: bool) {
        if succeeded {
            self.persisted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.persist_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            running: self.is_running(),
            started_at: self.started_at(),
            received: self.received.load(Ordering::Relaxed),
            unsupported: self.unsupported.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
            resolution_failures: self.resolution_failures.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of [`PipelineStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub running: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// Advertisements dequeued.
    pub received: u64,
    /// Advertisements dropped as not SensorPush.
    pub unsupported: u64,
    /// Devices registered by identity reads.
    pub resolutions: u64,
    /// Identity reads that failed or timed out.
    pub resolution_failures: u64,
    /// Samples written.
    pub persisted: u64,
    /// Samples the store rejected.
    pub persist_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorpush_types::{DeviceNumber, LogEvent, Severity};

    #[tokio::test]
    async fn test_app_state_new() {
        let store = Store::open_in_memory().unwrap();
        let mut config = Config::default();
        config.broadcast.feed_level = "error".to_string();
        let state = AppState::new(store, config);

        assert_eq!(state.hub.feed_level(), Severity::Error);
        assert_eq!(state.config.broadcast.subscriber_buffer, 256);
        assert!(!state.stats.is_running());
    }

    #[tokio::test]
    async fn test_app_state_store_access() {
        let state = AppState::new(Store::open_in_memory().unwrap(), Config::default());

        {
            let store = state.store.lock().await;
            store.add_device(DeviceNumber::new(1), "AA:BB").unwrap();
        }

        let store = state.store.lock().await;
        assert!(store.device_known("AA:BB").unwrap());
    }

    #[tokio::test]
    async fn test_log_reaches_hub() {
        let state = AppState::new(Store::open_in_memory().unwrap(), Config::default());
        let mut logs = state.hub.subscribe_logs();

        state.log().warn("scanner paused");

        let event: LogEvent = logs.recv().await.unwrap();
        assert_eq!(event.severity, Severity::Warn);
        assert_eq!(event.text, "scanner paused");
    }

    #[tokio::test]
    async fn test_into_store() {
        let state = AppState::new(Store::open_in_memory().unwrap(), Config::default());
        let state = Arc::try_unwrap(state).unwrap();
        state.into_store().close().unwrap();
    }

    #[test]
    fn test_stats_running_toggle() {
        let stats = PipelineStats::new();
        assert!(!stats.is_running());
        assert!(stats.started_at().is_none());

        stats.set_running(true);
        assert!(stats.is_running());
        assert!(stats.started_at().is_some());

        stats.set_running(false);
        assert!(!stats.is_running());
    }

    #[test]
    fn test_stats_counters() {
        let stats = PipelineStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_unsupported();
        stats.record_resolution(true);
        stats.record_resolution(false);
        stats.record_persist(true);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.received, 2);
        assert_eq!(snapshot.unsupported, 1);
        assert_eq!(snapshot.resolutions, 1);
        assert_eq!(snapshot.resolution_failures, 1);
        assert_eq!(snapshot.persisted, 1);
        assert_eq!(snapshot.persist_failures, 0);
    }

    #[test]
    fn test_stats_snapshot_serialization() {
        let stats = PipelineStats::new();
        stats.record_persist(false);

        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        assert!(json.contains("\"persist_failures\":1"));
        assert!(json.contains("\"started_at\":null"));
    }
}
