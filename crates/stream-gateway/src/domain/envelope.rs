//! Wire payload construction.
//!
//! Events leave the gateway stamped: a producer that left `timestamp` unset
//! gets the write-time clock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_types::StreamEvent;

trait ErasedEvent: Send {
    fn into_payload(self: Box<Self>, now: DateTime<Utc>) -> Result<String, serde_json::Error>;
}

impl<T> ErasedEvent for T
where
    T: StreamEvent + Serialize,
{
    fn into_payload(self: Box<Self>, now: DateTime<Utc>) -> Result<String, serde_json::Error> {
        build_payload(*self, now)
    }
}

/// Type-erased event on its way to a merged stream.
///
/// Carries the event untouched; stamping and serialization happen in
/// [`Envelope::into_payload`], on the writer side.
pub struct Envelope {
    pub event_type: &'static str,
    event: Box<dyn ErasedEvent>,
}

impl Envelope {
    pub fn new<T>(event: T) -> Self
    where
        T: StreamEvent + Serialize,
    {
        Self {
            event_type: event.event_type(),
            event: Box::new(event),
        }
    }

    /// Stamp with `now` if needed and serialize.
    pub fn into_payload(self, now: DateTime<Utc>) -> Result<String, serde_json::Error> {
        self.event.into_payload(now)
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}

/// Stamp `event` if needed and serialize it as a JSON text frame.
pub fn build_payload<T>(mut event: T, now: DateTime<Utc>) -> Result<String, serde_json::Error>
where
    T: StreamEvent + Serialize,
{
    event.stamp_if_unset(now);
    serde_json::to_string(&event)
}
