//! In-process event bus.
//!
//! Topic-free fan-out: every subscriber sees every event. Each subscriber
//! owns a bounded queue; publishing never blocks, and events are dropped for
//! subscribers whose queue is full. The bus keeps no history — it is a
//! notification layer, not a log. Authoritative state lives in the
//! repositories, so a dropped event is recoverable on the next sync tick.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Per-subscriber queue capacity.
const SUBSCRIBER_QUEUE: usize = 64;

/// A published event.
#[derive(Debug, Clone)]
pub struct Event {
    pub topic: String,
    pub payload: serde_json::Value,
}

struct BusInner {
    next_id: u64,
    subs: HashMap<u64, mpsc::Sender<Event>>,
    alive: bool,
}

/// Process-local best-effort event bus.
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                subs: HashMap::new(),
                alive: true,
            })),
        }
    }

    /// Hand the event to every attached subscriber. Slow subscribers never
    /// backpressure the publisher: a full queue drops the event for that
    /// subscriber only.
    pub fn publish(&self, topic: impl Into<String>, payload: serde_json::Value) {
        let event = Event {
            topic: topic.into(),
            payload,
        };

        let inner = self.inner.lock();
        if !inner.alive {
            return;
        }
        for (id, tx) in &inner.subs {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event.clone()) {
                debug!(subscriber = id, topic = %event.topic, "slow subscriber, dropping event");
            }
        }
    }

    /// Attach a new subscriber. On a closed bus the returned subscription is
    /// already terminated and yields no events.
    pub fn subscribe(&self) -> BusSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);

        let mut inner = self.inner.lock();
        if !inner.alive {
            // The sender is dropped here, so `recv` returns None immediately.
            return BusSubscription {
                id: 0,
                rx,
                inner: Arc::clone(&self.inner),
            };
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.subs.insert(id, tx);

        BusSubscription {
            id,
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Close the bus: detach every subscriber and reject new subscriptions.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.alive = false;
        inner.subs.clear();
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.inner.lock().subs.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live attachment to the bus. Dropping it detaches the subscriber.
pub struct BusSubscription {
    id: u64,
    rx: mpsc::Receiver<Event>,
    inner: Arc<Mutex<BusInner>>,
}

impl BusSubscription {
    /// Receive the next event; `None` once the bus is closed and the queue
    /// is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.inner.lock().subs.remove(&self.id);
    }
}
