//! Committed-event sink trait and implementations.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use super::EventRecord;

/// Trait for receiving committed event records.
///
/// The command service publishes every record through this trait once the
/// append has been accepted by the store. Downstream consumers (projector,
/// valuation engine, snapshotting) subscribe to a sink implementation.
///
/// # Design Rules
///
/// - `publish()` must be fast and non-blocking (no network calls, no DB writes)
/// - Delivery is best-effort; consumers reconcile missed records from the
///   event store using their checkpoints
/// - Failure to publish must not affect the append itself
pub trait CommittedEventSink: Send + Sync {
    /// Publish a single committed record.
    fn publish(&self, record: &EventRecord);

    /// Publish a batch of committed records in stream order.
    ///
    /// Default implementation calls `publish()` for each record.
    fn publish_batch(&self, records: &[EventRecord]) {
        for record in records {
            self.publish(record);
        }
    }
}

/// No-op implementation for tests or contexts with no live consumers.
#[derive(Clone, Default)]
pub struct NoOpEventSink;

impl CommittedEventSink for NoOpEventSink {
    fn publish(&self, _record: &EventRecord) {
        // Intentionally empty - records are discarded
    }
}

/// Fan-out sink backed by a tokio broadcast channel.
///
/// A lagging subscriber observes `RecvError::Lagged` and is expected to
/// catch up from the event store; publishing never waits on subscribers.
pub struct BroadcastEventSink {
    tx: broadcast::Sender<EventRecord>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.tx.subscribe()
    }
}

impl CommittedEventSink for BroadcastEventSink {
    fn publish(&self, record: &EventRecord) {
        // send fails only when no subscriber exists, which is fine
        let _ = self.tx.send(record.clone());
    }
}

/// Mock sink for testing - collects published records.
#[derive(Clone, Default)]
pub struct MockEventSink {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl MockEventSink {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns all collected records.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Clears collected records.
    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }

    /// Returns the number of collected records.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Returns true if no records have been collected.
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

impl CommittedEventSink for MockEventSink {
    fn publish(&self, record: &EventRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}
