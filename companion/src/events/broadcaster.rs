//! Publish/subscribe fan-out of domain events
//!
//! Every subscriber owns a bounded queue. Publishing never waits: an event is
//! handed to each matching queue with `try_send`, and a subscriber whose queue
//! is full is disconnected instead of stalling the publisher. Publishing is
//! serialized so each subscriber observes events in publish order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::events::event::{Event, EventFilter};

/// Default number of events buffered per subscriber
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 100;

struct SubscriberSlot {
    id: u64,
    filter: EventFilter,
    tx: mpsc::Sender<Event>,
}

struct Inner {
    subscribers: Mutex<Vec<SubscriberSlot>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Inner {
    fn remove(&self, id: u64) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|s| s.id != id);
    }
}

/// Event broadcaster
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<Inner>,
}

impl EventBroadcaster {
    /// Create a broadcaster buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Subscribe to events matching `filter`. Only events published after this
    /// call are delivered.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.inner.capacity);

        let mut subscribers = self.inner.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.push(SubscriberSlot { id, filter, tx });
        debug!("Event subscriber {} connected ({} active)", id, subscribers.len());

        Subscription {
            id,
            rx,
            inner: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Deliver `event` to every matching subscriber. Returns the number of
    /// subscribers that accepted it.
    pub fn publish(&self, event: Event) -> usize {
        let kind = event.kind();
        let mut delivered = 0;

        let mut subscribers = self.inner.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|slot| {
            if !slot.filter.matches(kind) {
                return true;
            }
            match slot.tx.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Event subscriber {} is not keeping up, disconnecting it",
                        slot.id
                    );
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Event subscriber {} went away", slot.id);
                    false
                }
            }
        });

        debug!("Published {} to {} subscribers", kind, delivered);
        delivered
    }

    /// Number of connected subscribers
    pub fn subscriber_count(&self) -> usize {
        let subscribers = self.inner.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

/// Handle to a live subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Event>,
    inner: Weak<Inner>,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. `None` once the subscription has ended,
    /// either by unsubscribing or by being disconnected as a slow consumer.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take the next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving events. Calling this more than once is harmless.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(inner) = self.inner.upgrade() {
            inner.remove(self.id);
        }
        self.rx.close();
        debug!("Event subscriber {} unsubscribed", self.id);
    }

    /// Turn the subscription into a stream of events
    pub fn into_stream(self) -> impl Stream<Item = Event> + Send {
        stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
