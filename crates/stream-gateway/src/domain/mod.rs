//! Domain types for the streaming gateway.
//!
//! Configuration, error taxonomy and wire payload construction.

pub mod config;
pub mod envelope;
pub mod error;

// Re-exports for convenience
pub use config::{ConfigError, GatewayConfig};
pub use envelope::{build_payload, Envelope};
pub use error::{GatewayError, SessionError, SetupError};
