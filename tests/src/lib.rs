//! # Relay Test Suite
//!
//! End-to-end tests that run the real gateway on a loopback port and talk
//! to it the way clients do.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs    # Server spawn, polling helpers
//!     ├── websocket.rs  # Single-bus WebSocket sessions
//!     └── sse.rs        # Combined SSE feed
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p relay-tests
//! cargo test -p relay-tests integration::websocket::
//! ```

pub mod integration;
