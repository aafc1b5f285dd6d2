//! SSE frames.

use crate::domain::envelope::Envelope;
use crate::domain::error::SetupError;
use axum::response::sse::Event;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Event name of the setup error frame.
pub const ERROR_EVENT: &str = "error";

/// One `text/event-stream` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub retry: Option<Duration>,
}

impl SseFrame {
    /// `event: <type>` with the payload JSON, stamped at `now`, as data.
    pub fn from_envelope(envelope: Envelope, now: DateTime<Utc>) -> Result<Self, serde_json::Error> {
        let event = Some(envelope.event_type.to_string());
        Ok(Self {
            event,
            data: envelope.into_payload(now)?,
            retry: None,
        })
    }

    /// The single frame sent before refusing a session.
    pub fn error(error: &SetupError, retry: Duration) -> Self {
        let data = serde_json::to_string(&error.body())
            .unwrap_or_else(|_| format!(r#"{{"error":{{"code":"{}"}}}}"#, error.code()));
        Self {
            event: Some(ERROR_EVENT.to_string()),
            data,
            retry: Some(retry),
        }
    }

    /// Wire form, terminated by the blank line.
    #[cfg(test)]
    pub(crate) fn encode(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        if let Some(retry) = self.retry {
            let _ = writeln!(out, "retry: {}", retry.as_millis());
        }
        if let Some(event) = &self.event {
            let _ = writeln!(out, "event: {event}");
        }
        for line in self.data.split('\n') {
            let _ = writeln!(out, "data: {line}");
        }
        out.push('\n');
        out
    }
}

impl From<SseFrame> for Event {
    fn from(frame: SseFrame) -> Self {
        let mut event = Event::default().data(frame.data);
        if let Some(name) = frame.event {
            event = event.event(name);
        }
        if let Some(retry) = frame.retry {
            event = event.retry(retry);
        }
        event
    }
}
