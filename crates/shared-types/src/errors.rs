//! # Error Types
//!
//! Errors raised while interpreting event payloads.

use thiserror::Error;

/// A string did not name any known event type for the payload it was parsed into.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown event type: {0}")]
pub struct UnknownEventType(pub String);
