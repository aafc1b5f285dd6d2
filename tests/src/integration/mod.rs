//! End-to-end scenarios against a loopback gateway.

pub mod harness;
pub mod sse;
pub mod websocket;
