//! Ingestion queue between the radio and the pipeline.
//!
//! The queue is unbounded so the radio event producer never waits on
//! resolution or storage. Events are delivered strictly in arrival order to
//! a single consumer.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use sensorpush_types::RawAdvertisement;

/// Errors returned when enqueueing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The consumer has stopped.
    #[error("Ingestion queue is closed")]
    Closed,
}

/// Create a connected producer/consumer pair.
pub fn channel() -> (IngestQueue, IngestReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (IngestQueue { sender }, IngestReceiver { receiver })
}

/// Producer side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IngestQueue {
    sender: UnboundedSender<RawAdvertisement>,
}

impl IngestQueue {
    /// Append an advertisement. Never blocks.
    pub fn enqueue(&self, advertisement: RawAdvertisement) -> Result<(), QueueError> {
        self.sender
            .send(advertisement)
            .map_err(|_| QueueError::Closed)
    }

    /// Raw sender, for producers that take a channel directly.
    pub fn sender(&self) -> UnboundedSender<RawAdvertisement> {
        self.sender.clone()
    }

    /// Whether the consumer is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Consumer side.
#[derive(Debug)]
pub struct IngestReceiver {
    receiver: UnboundedReceiver<RawAdvertisement>,
}

impl IngestReceiver {
    /// Wait for the next advertisement. `None` once every producer is gone
    /// and the queue is drained.
    pub async fn next(&mut self) -> Option<RawAdvertisement> {
        self.receiver.recv().await
    }

    /// Number of advertisements waiting.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Stop accepting new advertisements; queued ones can still be received.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}
