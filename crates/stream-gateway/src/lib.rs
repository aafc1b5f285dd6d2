// Allow missing docs for internal items in development
#![allow(missing_docs)]
#![deny(unsafe_code)]

//! Stream Gateway - real-time event distribution over WebSocket and SSE.
//!
//! Turns in-process [`shared_bus::Bus`] subscriptions into per-connection
//! wire streams with client-side type filtering, per-connection rate
//! limiting and leak-free teardown.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          STREAM GATEWAY                              │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  Trace → CORS → Auth ─┬─ /ws/{bus}   one bus, read + write loops     │
//! │                       ├─ /events     SSE, five buses merged          │
//! │                       └─ /stats      bus counters, live sessions     │
//! │                                                                      │
//! │  per session:  TypeFilter → RateLimiter → payload (stamped) → write  │
//! │  per server:   SessionTracker (root cancel token, drain on shutdown) │
//! └──────────────────────────────┬───────────────────────────────────────┘
//!                                │ subscribe_filtered
//!          ┌──────────┬──────────┼──────────┬──────────┬──────────┐
//!          ▼          ▼          ▼          ▼          ▼          ▼
//!       watcher    config    workflow     agent    terminal     index
//! ```
//!
//! # Delivery
//!
//! Best-effort and at-most-once. Events are dropped silently when a
//! subscriber queue is full, when the client's type filter excludes them, or
//! when the connection is over its rate. Order is FIFO per bus; merged
//! streams interleave buses in delivery order.
//!
//! # Usage
//!
//! ```ignore
//! use stream_gateway::{EventBuses, GatewayConfig, GatewayService};
//!
//! let buses = EventBuses::with_capacity(256);
//! let service = GatewayService::with_config_token(GatewayConfig::default(), buses.clone())?;
//! let listener = service.bind().await?;
//! service.serve(listener).await?;
//! ```

pub mod buses;
pub mod domain;
pub mod middleware;
pub mod service;
pub mod session;
pub mod sse;
pub mod ws;

// Re-exports
pub use buses::{BusStats, EventBuses};
pub use domain::{
    build_payload, ConfigError, Envelope, GatewayConfig, GatewayError, SessionError, SetupError,
};
pub use middleware::{StaticTokenValidator, TokenValidator};
pub use service::GatewayService;
pub use session::{CancelToken, RateLimiter, SessionState, SessionTracker, TypeFilter};
pub use sse::{FanIn, SseFrame};
pub use ws::ControlMessage;
