//! HTTP-level guards in front of the streaming routes.
//!
//! Layer order: Request → Trace → CORS → Auth (streaming routes only) → Handler.
//! Origin checks run inside the WebSocket handler, before the upgrade.

pub mod auth;
pub mod cors;
pub mod origin;

pub use auth::{constant_time_compare, extract_token, AuthLayer, StaticTokenValidator, TokenValidator};
pub use cors::create_cors_layer;
pub use origin::OriginPolicy;
