//! Token authentication for streaming endpoints.
//!
//! Runs as a tower layer in front of the WebSocket and SSE routes, so a
//! rejected client gets a 401 before any upgrade or stream starts.

use crate::domain::error::SetupError;
use axum::{body::Body, http::Request, response::IntoResponse, response::Response};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Decides whether a request may open a stream.
///
/// `token` is whatever the client presented (bearer header, `X-API-Key`, or
/// `token` query parameter), if anything.
pub trait TokenValidator: Send + Sync {
    fn validate_token(&self, req: &Request<Body>, token: Option<&str>) -> bool;
}

/// Compares against one configured token.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenValidator {
    token: Option<String>,
}

impl StaticTokenValidator {
    /// `None` accepts every request.
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl TokenValidator for StaticTokenValidator {
    fn validate_token(&self, _req: &Request<Body>, token: Option<&str>) -> bool {
        match (&self.token, token) {
            (None, _) => true, // No token configured = always valid
            (Some(expected), Some(presented)) => constant_time_compare(presented, expected),
            (Some(_), None) => false,
        }
    }
}

/// Authentication layer
#[derive(Clone)]
pub struct AuthLayer {
    validator: Arc<dyn TokenValidator>,
}

impl AuthLayer {
    pub fn new(validator: Arc<dyn TokenValidator>) -> Self {
        Self { validator }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            validator: Arc::clone(&self.validator),
        }
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    validator: Arc<dyn TokenValidator>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let validator = Arc::clone(&self.validator);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let token = extract_token(&req);
            if !validator.validate_token(&req, token.as_deref()) {
                warn!(
                    path = %req.uri().path(),
                    token_present = token.is_some(),
                    "Stream connection rejected - invalid token"
                );
                let reason = if token.is_some() {
                    "invalid token"
                } else {
                    "missing token"
                };
                return Ok(SetupError::Unauthorized(reason.to_string()).into_response());
            }

            debug!(path = %req.uri().path(), "Stream connection authenticated");
            inner.call(req).await
        })
    }
}

/// Pull the client's token from the request.
///
/// Checked in order: `Authorization: Bearer`, `X-API-Key`, `?token=`.
/// Browsers cannot set headers on WebSocket or EventSource requests, hence
/// the query parameter.
pub fn extract_token<B>(req: &Request<B>) -> Option<String> {
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(api_key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = api_key.to_str() {
            return Some(key_str.to_string());
        }
    }

    req.uri().query().and_then(|query| {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("token="))
            .map(str::to_string)
    })
}

/// Constant-time string comparison to prevent timing attacks
///
/// Both inputs are padded to the longer length with different bytes so that
/// a length mismatch can never compare equal.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;

    let max_len = std::cmp::max(a.len(), b.len());

    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];

    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & contents_equal).into()
}
