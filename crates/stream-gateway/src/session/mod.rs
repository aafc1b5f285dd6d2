//! Per-connection machinery shared by the WebSocket and SSE sessions.

pub mod cancel;
pub mod lifecycle;
pub mod rate_limit;
pub mod type_filter;

pub use cancel::{CancelOnDrop, CancelToken};
pub use lifecycle::{SessionGuard, SessionInfo, SessionKind, SessionState, SessionTracker};
pub use rate_limit::RateLimiter;
pub use type_filter::{allowed_types, AllowedTypes, TypeFilter};
