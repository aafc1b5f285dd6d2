//! Streaming gateway service: routes, middleware and graceful shutdown.

use crate::buses::EventBuses;
use crate::domain::config::GatewayConfig;
use crate::domain::error::{GatewayError, SetupError};
use crate::middleware::{create_cors_layer, AuthLayer, StaticTokenValidator, TokenValidator};
use crate::session::{allowed_types, SessionTracker};
use crate::sse::SseRoute;
use crate::ws::WsRoute;
use axum::response::IntoResponse;
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use serde::Serialize;
use shared_bus::Bus;
use shared_types::StreamEvent;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Streaming gateway service
pub struct GatewayService {
    config: GatewayConfig,
    buses: EventBuses,
    validator: Arc<dyn TokenValidator>,
    tracker: Arc<SessionTracker>,
}

impl GatewayService {
    /// Create a service with a custom token validator
    pub fn new(
        config: GatewayConfig,
        buses: EventBuses,
        validator: Arc<dyn TokenValidator>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;

        Ok(Self {
            config,
            buses,
            validator,
            tracker: SessionTracker::new(),
        })
    }

    /// Create a service checking `auth.token` from the config
    pub fn with_config_token(config: GatewayConfig, buses: EventBuses) -> Result<Self, GatewayError> {
        let validator = Arc::new(StaticTokenValidator::new(config.auth.token.clone()));
        Self::new(config, buses, validator)
    }

    pub fn tracker(&self) -> Arc<SessionTracker> {
        Arc::clone(&self.tracker)
    }

    /// Ask every live session to stop and the server to return from `serve`.
    pub fn shutdown(&self) {
        self.tracker.shutdown();
    }

    /// Bind the configured listener address
    pub async fn bind(&self) -> Result<TcpListener, GatewayError> {
        let addr = self.config.bind_addr();
        TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{addr}: {e}")))
    }

    /// Serve until [`GatewayService::shutdown`], then wait (bounded) for
    /// sessions to drain.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        let addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Bind(e.to_string()))?;
        info!(%addr, "Streaming gateway listening");

        let shutdown = self.tracker.shutdown_token();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| GatewayError::Serve(e.to_string()))?;

        let grace = self.config.server.shutdown_grace;
        if !self.tracker.wait_for_drain(grace).await {
            warn!(
                live = self.tracker.live_sessions(),
                ?grace,
                "Sessions still open after shutdown grace"
            );
        }
        info!("Streaming gateway stopped");
        Ok(())
    }

    /// Build the full router
    pub fn router(&self) -> Router {
        let streams = Router::new()
            .route("/ws/watcher", self.ws_route("watcher", &self.buses.watcher))
            .route("/ws/config", self.ws_route("config", &self.buses.config))
            .route("/ws/workflow", self.ws_route("workflow", &self.buses.workflow))
            .route("/ws/agent", self.ws_route("agent", &self.buses.agent))
            .route("/ws/terminal", self.ws_route("terminal", &self.buses.terminal))
            .route("/ws/index", self.ws_route("index", &self.buses.index))
            .route("/events", self.sse_route())
            .route("/stats", self.stats_route())
            .route_layer(AuthLayer::new(Arc::clone(&self.validator)));

        Router::new()
            .route("/health", get(health_check))
            .merge(streams)
            .layer(create_cors_layer(&self.config.cors))
            .layer(TraceLayer::new_for_http())
    }

    fn ws_route<T>(&self, name: &'static str, bus: &Option<Arc<Bus<T>>>) -> MethodRouter
    where
        T: StreamEvent + Serialize,
    {
        match bus {
            Some(bus) => WsRoute::new(
                Arc::clone(bus),
                allowed_types(T::TYPES, &self.config.streams.disabled_types),
                self.config.websocket.clone(),
                self.config.rate_limit.clone(),
                Arc::clone(&self.tracker),
            )
            .into_method_router(),
            None => get(move || async move {
                SetupError::UpstreamUnavailable(format!("{name} bus not configured"))
                    .into_response()
            }),
        }
    }

    fn sse_route(&self) -> MethodRouter {
        SseRoute::new(
            self.buses.clone(),
            &self.config.streams.disabled_types,
            self.config.sse.clone(),
            self.config.rate_limit.clone(),
            Arc::clone(&self.tracker),
        )
        .into_method_router()
    }

    fn stats_route(&self) -> MethodRouter {
        let buses = self.buses.clone();
        let tracker = Arc::clone(&self.tracker);
        get(move || {
            let buses = buses.clone();
            let tracker = Arc::clone(&tracker);
            async move {
                Json(serde_json::json!({
                    "live_sessions": tracker.live_sessions(),
                    "sessions": tracker.sessions(),
                    "buses": buses.stats(),
                }))
            }
        })
    }
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "stream-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
