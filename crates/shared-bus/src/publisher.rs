//! # Bus
//!
//! The publishing side: subscriber registry, non-blocking fan-out, close.

use crate::subscriber::{Subscription, SubscriptionId};
use crate::DEFAULT_CHANNEL_CAPACITY;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Errors from bus operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus was closed; no new subscriptions are accepted.
    #[error("Event bus closed")]
    Closed,
}

/// Server-side predicate, fixed for the life of a subscription.
pub(crate) type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// A registered subscriber as the bus sees it.
struct SubscriberSlot<T> {
    predicate: Predicate<T>,
    sender: mpsc::Sender<T>,
    dropped: Arc<AtomicU64>,
}

/// State shared between a bus and the cancel handles of its subscriptions.
pub(crate) struct BusShared<T> {
    name: &'static str,
    subscribers: RwLock<HashMap<SubscriptionId, SubscriberSlot<T>>>,
    closed: AtomicBool,
    next_id: AtomicU64,
    events_published: AtomicU64,
    events_dropped: AtomicU64,
    capacity: usize,
}

impl<T> BusShared<T> {
    /// Unregister a subscriber. Returns `true` if it was still registered.
    ///
    /// Dropping the slot drops the sender, which closes the subscriber queue.
    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.write().remove(&id).is_some();
        if removed {
            debug!(bus = self.name, subscription_id = id, "Subscription cancelled");
        }
        removed
    }
}

/// In-memory typed broadcast bus.
///
/// Producers keep it behind an `Arc` and call [`Bus::publish`] for every
/// domain event; consumers call [`Bus::subscribe_filtered`]. Subscriptions
/// only hold a weak reference, so dropping the last `Arc<Bus<T>>` also closes
/// every queue.
pub struct Bus<T> {
    shared: Arc<BusShared<T>>,
}

impl<T> Bus<T>
where
    T: Clone + Send + 'static,
{
    /// Create a bus with the default per-subscriber capacity.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self::with_capacity(name, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus whose subscriber queues hold `capacity` events each.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn with_capacity(name: &'static str, capacity: usize) -> Self {
        Self {
            shared: Arc::new(BusShared {
                name,
                subscribers: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                events_published: AtomicU64::new(0),
                events_dropped: AtomicU64::new(0),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> Result<Subscription<T>, BusError> {
        self.subscribe_filtered(|_| true)
    }

    /// Subscribe to events for which `predicate` returns `true`.
    ///
    /// The predicate is evaluated once per published event, on the publisher's
    /// thread, and cannot be changed afterwards.
    pub fn subscribe_filtered<F>(&self, predicate: F) -> Result<Subscription<T>, BusError>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        // Check under the write lock so a concurrent close cannot miss us
        let mut subscribers = self.shared.subscribers.write();
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.shared.capacity);
        let dropped = Arc::new(AtomicU64::new(0));

        subscribers.insert(
            id,
            SubscriberSlot {
                predicate: Box::new(predicate),
                sender,
                dropped: Arc::clone(&dropped),
            },
        );
        let count = subscribers.len();
        drop(subscribers);

        debug!(
            bus = self.shared.name,
            subscription_id = id,
            subscribers = count,
            "New subscription created"
        );

        Ok(Subscription::new(
            id,
            receiver,
            Arc::downgrade(&self.shared),
            dropped,
        ))
    }

    /// Publish an event to every matching subscriber.
    ///
    /// Never blocks. Returns the number of subscribers the event was queued
    /// for; subscribers whose queue is full miss this event. A no-op once the
    /// bus is closed.
    pub fn publish(&self, event: T) -> usize {
        if self.shared.closed.load(Ordering::Acquire) {
            trace!(bus = self.shared.name, "Publish on closed bus ignored");
            return 0;
        }

        self.shared.events_published.fetch_add(1, Ordering::Relaxed);

        let subscribers = self.shared.subscribers.read();
        let mut delivered = 0;

        for (id, slot) in subscribers.iter() {
            if !(slot.predicate)(&event) {
                continue;
            }

            match slot.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    slot.dropped.fetch_add(1, Ordering::Relaxed);
                    self.shared.events_dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(
                        bus = self.shared.name,
                        subscription_id = *id,
                        "Subscriber queue full, event dropped"
                    );
                }
                // Receiver already gone; its cancel is on the way
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        delivered
    }

    /// Close the bus: every subscriber queue is closed and further publishes
    /// are ignored. Only the first call has any effect.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            debug!(bus = self.shared.name, "Bus already closed");
            return;
        }

        let released = std::mem::take(&mut *self.shared.subscribers.write());
        debug!(
            bus = self.shared.name,
            subscribers = released.len(),
            "Bus closed"
        );
        // Dropping the slots drops every sender
        drop(released);
    }

    /// Whether [`Bus::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Current number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }

    /// Bus name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Per-subscriber queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Total publish calls accepted while open.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.shared.events_published.load(Ordering::Relaxed)
    }

    /// Total per-subscriber drops caused by full queues.
    #[must_use]
    pub fn events_dropped(&self) -> u64 {
        self.shared.events_dropped.load(Ordering::Relaxed)
    }
}
