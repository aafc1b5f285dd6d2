//! Gateway error types.
//!
//! Three families, matching how each is reported:
//! - [`SetupError`]: refuses a session before it streams; reported once as an
//!   HTTP status or a single error frame.
//! - [`SessionError`]: ends a live session; never reported to the peer.
//! - [`GatewayError`]: process-level failures of the service itself.

use crate::domain::config::ConfigError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

/// Machine-readable error codes carried in error bodies and frames
pub mod codes {
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const ORIGIN_REJECTED: &str = "origin_rejected";
    pub const UPSTREAM_UNAVAILABLE: &str = "upstream_unavailable";
}

/// A session could not be established.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    /// Missing or invalid token
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Browser origin not on the allow-list
    #[error("origin not allowed: {0}")]
    OriginRejected(String),

    /// A required bus is missing or closed
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl SetupError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => codes::UNAUTHORIZED,
            Self::OriginRejected(_) => codes::ORIGIN_REJECTED,
            Self::UpstreamUnavailable(_) => codes::UPSTREAM_UNAVAILABLE,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::OriginRejected(_) => StatusCode::FORBIDDEN,
            Self::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Structured body shared by HTTP responses and SSE error frames.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        }
    }
}

impl IntoResponse for SetupError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self.body())).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

/// `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// A live session ended because of an I/O failure.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A frame write exceeded its deadline
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The transport failed or the peer went away
    #[error("transport error: {0}")]
    Transport(String),

    /// An event could not be serialized
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Service-level errors (not reported to clients)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Listener socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// The HTTP server stopped with an error
    #[error("server error: {0}")]
    Serve(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_status() {
        assert_eq!(
            SetupError::Unauthorized("missing token".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            SetupError::OriginRejected("https://evil.test".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            SetupError::UpstreamUnavailable("watcher".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_body_serialization() {
        let err = SetupError::UpstreamUnavailable("config bus".into());
        let json = serde_json::to_value(err.body()).unwrap();
        assert_eq!(json["error"]["code"], "upstream_unavailable");
        assert_eq!(json["error"]["message"], "upstream unavailable: config bus");
    }

    #[test]
    fn test_unauthorized_response_headers() {
        let response = SetupError::Unauthorized("bad token".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn test_session_error_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SessionError = json_err.into();
        assert!(matches!(err, SessionError::Serialize(_)));
    }
}
