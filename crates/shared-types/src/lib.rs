//! # Shared Types Crate
//!
//! Domain event payloads that producers publish onto their buses, and the
//! [`StreamEvent`] contract the streaming layer needs from every payload.
//!
//! ## Design Principles
//!
//! - **One payload type per bus**: each producer owns a `Bus<T>` of exactly one
//!   of the payloads below, so consumers never downcast.
//! - **Stable discriminators**: the `type` field is a snake_case string that
//!   clients filter on; it never changes once published.
//! - **Lazy timestamps**: producers may leave `timestamp` unset; the session
//!   stamps it at write time.

pub mod entities;
pub mod errors;
pub mod stream_event;

pub use entities::*;
pub use errors::*;
pub use stream_event::StreamEvent;
