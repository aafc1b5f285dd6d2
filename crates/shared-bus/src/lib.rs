//! # Shared Bus - Typed Publish/Subscribe for Event Producers
//!
//! Decouples producers (file watcher, workflow engine, terminal manager, ...)
//! from the streaming sessions that consume their events.
//!
//! ## Model
//!
//! ```text
//! ┌──────────────┐                       ┌──────────────────┐
//! │   Producer   │   publish(event)      │  Subscription A  │ ← predicate A
//! │              │ ──────┐               │  [bounded FIFO]  │
//! └──────────────┘       │          ┌───▶└──────────────────┘
//!                        ▼          │
//!                  ┌──────────────┐ │    ┌──────────────────┐
//!                  │    Bus<T>    │─┴───▶│  Subscription B  │ ← predicate B
//!                  └──────────────┘      │  [bounded FIFO]  │
//!                                        └──────────────────┘
//! ```
//!
//! - One monomorphized `Bus<T>` per payload type; no downcasting.
//! - `publish` never blocks: a full subscriber queue drops the event for that
//!   subscriber only, so one stalled reader cannot slow producers or peers.
//! - Delivery is at-most-once and FIFO per subscriber.
//! - `close` happens at most once and closes every subscriber queue.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use publisher::{Bus, BusError};
pub use subscriber::{Subscription, SubscriptionCanceller, SubscriptionId};

/// Events buffered per subscriber before the bus starts dropping for it.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
