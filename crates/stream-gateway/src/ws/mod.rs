//! WebSocket streaming, one bus per connection.

pub mod handler;

pub use handler::{ControlMessage, WsRoute};
