//! Pipeline diagnostics.
//!
//! Components report through a [`PipelineLog`] handle rather than a global
//! logger. Every event is mirrored to `tracing` and handed to a [`LogSink`],
//! normally the [`BroadcastHub`](crate::hub::BroadcastHub) log feed.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use sensorpush_types::{LogEvent, Severity};

/// Receives pipeline log events.
pub trait LogSink: Send + Sync {
    /// Accept one event. Must not block.
    fn emit(&self, event: LogEvent);
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn emit(&self, _event: LogEvent) {}
}

/// Cloneable logging handle shared by the pipeline components.
#[derive(Clone)]
pub struct PipelineLog {
    sink: Arc<dyn LogSink>,
}

impl std::fmt::Debug for PipelineLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineLog").finish_non_exhaustive()
    }
}

impl PipelineLog {
    /// Create a handle emitting into `sink`.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// A handle that only writes to `tracing`.
    pub fn tracing_only() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Record `text` at `severity`.
    pub fn log(&self, severity: Severity, text: impl Into<String>) {
        let event = LogEvent::new(severity, text);
        match event.severity {
            Severity::Debug => debug!(target: "sensorpush_service::pipeline", "{}", event.text),
            Severity::Info => info!(target: "sensorpush_service::pipeline", "{}", event.text),
            Severity::Warn => warn!(target: "sensorpush_service::pipeline", "{}", event.text),
            Severity::Error | Severity::Critical => {
                error!(target: "sensorpush_service::pipeline", severity = %event.severity, "{}", event.text)
            }
        }
        self.sink.emit(event);
    }

    pub fn debug(&self, text: impl Into<String>) {
        self.log(Severity::Debug, text);
    }

    pub fn info(&self, text: impl Into<String>) {
        self.log(Severity::Info, text);
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.log(Severity::Warn, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.log(Severity::Error, text);
    }

    pub fn critical(&self, text: impl Into<String>) {
        self.log(Severity::Critical, text);
    }
}
