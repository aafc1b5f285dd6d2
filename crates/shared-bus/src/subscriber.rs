//! # Subscriptions
//!
//! The consuming side of the bus. A [`Subscription`] owns the receiving end of
//! one bounded queue; a [`SubscriptionCanceller`] lets another task (the read
//! loop of a session, for instance) unregister it.

use crate::publisher::{BusError, BusShared};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// Identifier of a subscription, unique within its bus.
pub type SubscriptionId = u64;

/// A subscription handle for receiving events.
///
/// When dropped, the subscription is cancelled.
pub struct Subscription<T> {
    id: SubscriptionId,
    receiver: mpsc::Receiver<T>,
    canceller: SubscriptionCanceller<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        id: SubscriptionId,
        receiver: mpsc::Receiver<T>,
        bus: Weak<BusShared<T>>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            id,
            receiver,
            canceller: SubscriptionCanceller {
                id,
                bus,
                cancelled: Arc::new(AtomicBool::new(false)),
            },
            dropped,
        }
    }

    /// Receive the next event.
    ///
    /// # Returns
    ///
    /// - `Some(event)` - The next queued event
    /// - `None` - The subscription was cancelled or the bus closed, and the
    ///   queue is drained
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Try to receive the next event without waiting.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(event))` - An event was queued
    /// - `Ok(None)` - Nothing queued right now
    /// - `Err(BusError::Closed)` - The queue is closed and drained
    pub fn try_recv(&mut self) -> Result<Option<T>, BusError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(BusError::Closed),
        }
    }

    /// Unregister from the bus. Idempotent.
    ///
    /// Events already queued can still be drained with [`Subscription::recv`].
    pub fn cancel(&mut self) {
        self.canceller.cancel();
        self.receiver.close();
    }

    /// A cloneable handle that cancels this subscription from elsewhere.
    #[must_use]
    pub fn canceller(&self) -> SubscriptionCanceller<T> {
        self.canceller.clone()
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Events this subscription missed because its queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.canceller.cancel();
    }
}

/// Cancels one subscription. Safe to call any number of times, from any task,
/// concurrently with publishes.
pub struct SubscriptionCanceller<T> {
    id: SubscriptionId,
    bus: Weak<BusShared<T>>,
    cancelled: Arc<AtomicBool>,
}

impl<T> SubscriptionCanceller<T> {
    /// Unregister the subscription.
    ///
    /// Returns `true` only for the call that actually removed it; later calls,
    /// and calls after the bus closed, return `false`.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.bus.upgrade() {
            Some(bus) => bus.remove(self.id),
            None => false,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl<T> Clone for SubscriptionCanceller<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            bus: Weak::clone(&self.bus),
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}
