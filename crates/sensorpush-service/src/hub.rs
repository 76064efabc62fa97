//! Live distribution of samples and log events.
//!
//! # Delivery Behavior
//!
//! Each subscriber owns a private bounded channel (a `tokio::sync::broadcast`
//! channel with a single receiver) registered in its feed's registry:
//!
//! - **Join time**: A subscriber receives only items published after it registered
//! - **Ordering**: Every subscriber sees the items of a feed in publish order
//! - **Overflow**: A subscriber that falls `subscriber_buffer` items behind loses
//!   its oldest items; other subscribers are unaffected
//! - **No blocking**: Publishing never waits on a subscriber
//! - **Lifetime**: Dropping a [`Subscription`] removes it from the registry
//!
//! ## Example Configuration
//!
//! ```toml
//! [broadcast]
//! subscriber_buffer = 256
//! feed_level = "info"
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

use sensorpush_types::{LogEvent, SampleRecord, Severity};

use crate::config::BroadcastConfig;
use crate::log::LogSink;

type Registry<T> = Mutex<HashMap<u64, broadcast::Sender<T>>>;

fn lock<T>(registry: &Registry<T>) -> MutexGuard<'_, HashMap<u64, broadcast::Sender<T>>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A registry of subscribers for one kind of item.
pub struct Feed<T> {
    name: &'static str,
    capacity: usize,
    next_id: AtomicU64,
    closed: AtomicBool,
    subscribers: Arc<Registry<T>>,
}

impl<T: Clone> Feed<T> {
    /// Create an empty feed whose subscribers buffer `capacity` items each.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a new subscriber.
    ///
    /// After [`close`](Self::close) the returned subscription is already ended.
    pub fn subscribe(&self) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = broadcast::channel(self.capacity);

        let mut subscribers = lock(&self.subscribers);
        if self.closed.load(Ordering::SeqCst) {
            drop(sender);
        } else {
            subscribers.insert(id, sender);
            debug!(feed = self.name, id, "Subscriber registered");
        }
        drop(subscribers);

        Subscription {
            id,
            feed: self.name,
            receiver,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Deliver `item` to every current subscriber.
    ///
    /// Returns the number of subscribers the item was queued for.
    pub fn publish(&self, item: T) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|_, sender| sender.send(item.clone()).is_ok());
        subscribers.len()
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// End every subscription and refuse new ones.
    ///
    /// Subscribers still receive items queued before the close.
    pub fn close(&self) {
        let mut subscribers = lock(&self.subscribers);
        self.closed.store(true, Ordering::SeqCst);
        subscribers.clear();
    }
}

impl<T> std::fmt::Debug for Feed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// One subscriber's view of a [`Feed`].
pub struct Subscription<T> {
    id: u64,
    feed: &'static str,
    receiver: broadcast::Receiver<T>,
    registry: Weak<Registry<T>>,
}

impl<T: Clone> Subscription<T> {
    /// Wait for the next item.
    ///
    /// Items lost to overflow are skipped. Returns `None` once the feed has
    /// been closed and everything queued has been received.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(item) => return Some(item),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(feed = self.feed, id = self.id, skipped, "Subscriber lagging, dropped oldest items");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next item if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.try_recv() {
                Ok(item) => return Some(item),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(feed = self.feed, id = self.id, skipped, "Subscriber lagging, dropped oldest items");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Registry id of this subscription.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Convert into a stream of items. Dropping the stream unsubscribes.
    pub fn into_stream(self) -> impl Stream<Item = T>
    where
        T: Send + 'static,
    {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription.recv().await.map(|item| (item, subscription))
        })
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(&self.id);
            debug!(feed = self.feed, id = self.id, "Subscriber removed");
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("feed", &self.feed)
            .finish_non_exhaustive()
    }
}

/// Fans out persisted samples and pipeline log events to live observers.
#[derive(Debug)]
pub struct BroadcastHub {
    samples: Feed<SampleRecord>,
    logs: Feed<LogEvent>,
    feed_level: Severity,
}

impl BroadcastHub {
    /// Create a hub with `subscriber_buffer` items of slack per subscriber.
    pub fn new(subscriber_buffer: usize, feed_level: Severity) -> Self {
        Self {
            samples: Feed::new("samples", subscriber_buffer),
            logs: Feed::new("logs", subscriber_buffer),
            feed_level,
        }
    }

    /// Create a hub from the `[broadcast]` configuration.
    pub fn from_config(config: &BroadcastConfig) -> Self {
        Self::new(config.subscriber_buffer, config.feed_severity())
    }

    /// Publish a persisted sample. Returns the number of recipients.
    pub fn publish_sample(&self, record: SampleRecord) -> usize {
        self.samples.publish(record)
    }

    /// Publish a log event unless it is below the feed level.
    pub fn publish_log(&self, event: LogEvent) -> usize {
        if event.severity < self.feed_level {
            return 0;
        }
        self.logs.publish(event)
    }

    pub fn subscribe_samples(&self) -> Subscription<SampleRecord> {
        self.samples.subscribe()
    }

    pub fn subscribe_logs(&self) -> Subscription<LogEvent> {
        self.logs.subscribe()
    }

    pub fn sample_subscriber_count(&self) -> usize {
        self.samples.subscriber_count()
    }

    pub fn log_subscriber_count(&self) -> usize {
        self.logs.subscriber_count()
    }

    /// Lowest severity forwarded to the log feed.
    pub fn feed_level(&self) -> Severity {
        self.feed_level
    }

    /// End every live subscription.
    pub fn shutdown(&self) {
        self.samples.close();
        self.logs.close();
    }
}

impl LogSink for BroadcastHub {
    fn emit(&self, event: LogEvent) {
        self.publish_log(event);
    }
}
