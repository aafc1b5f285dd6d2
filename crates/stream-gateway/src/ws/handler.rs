//! Single-bus WebSocket sessions.
//!
//! One connection streams one bus. After the upgrade two loops run side by
//! side on the session's cancel token:
//! - the write loop drains the bus subscription, applies the client's type
//!   filter and the rate limiter, and writes JSON text frames under a
//!   deadline, pinging on a timer;
//! - the read loop accepts `{"subscribe": [...]}` control frames.
//!
//! Whichever loop ends first fires the token, the other follows, and the
//! subscription is cancelled before the socket is closed.

use crate::domain::config::{RateLimitConfig, WebSocketConfig};
use crate::domain::envelope::build_payload;
use crate::domain::error::{SessionError, SetupError};
use crate::middleware::origin::OriginPolicy;
use crate::session::{
    AllowedTypes, CancelToken, RateLimiter, SessionGuard, SessionKind, SessionState,
    SessionTracker, TypeFilter,
};
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use chrono::Utc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use shared_bus::{Bus, Subscription};
use shared_types::StreamEvent;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval_at, timeout, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Inbound control frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlMessage {
    pub subscribe: Vec<String>,
}

impl ControlMessage {
    /// `None` for anything that is not a well-formed control frame.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Everything a WebSocket route needs to accept sessions on one bus.
pub struct WsRoute<T> {
    bus: Arc<Bus<T>>,
    allowed: Arc<AllowedTypes>,
    websocket: WebSocketConfig,
    rate_limit: RateLimitConfig,
    origins: OriginPolicy,
    tracker: Arc<SessionTracker>,
}

impl<T> WsRoute<T>
where
    T: StreamEvent + Serialize,
{
    pub fn new(
        bus: Arc<Bus<T>>,
        allowed: AllowedTypes,
        websocket: WebSocketConfig,
        rate_limit: RateLimitConfig,
        tracker: Arc<SessionTracker>,
    ) -> Self {
        let origins = OriginPolicy::new(&websocket.allowed_origins);
        Self {
            bus,
            allowed: Arc::new(allowed),
            websocket,
            rate_limit,
            origins,
            tracker,
        }
    }

    /// `GET` handler performing origin check, subscription and upgrade.
    pub fn into_method_router(self) -> MethodRouter {
        let route = Arc::new(self);
        get(move |ws: WebSocketUpgrade, headers: HeaderMap| {
            let route = Arc::clone(&route);
            async move { route.accept(ws, &headers) }
        })
    }

    fn accept(self: Arc<Self>, ws: WebSocketUpgrade, headers: &HeaderMap) -> Response {
        let (subscription, guard) = match self.admit(headers) {
            Ok(admitted) => admitted,
            Err(e) => {
                warn!(bus = self.bus.name(), error = %e, "WebSocket upgrade rejected");
                return e.into_response();
            }
        };

        ws.max_message_size(self.websocket.max_message_size)
            .on_upgrade(move |socket| async move {
                let (sink, stream) = socket.split();
                self.run(sink, stream, subscription, guard).await;
            })
    }

    /// Register the session and run the pre-upgrade checks. The bus is
    /// subscribed here so a closed bus is refused with a status.
    fn admit(&self, headers: &HeaderMap) -> Result<(Subscription<T>, SessionGuard), SetupError> {
        let guard = self.tracker.open(SessionKind::WebSocket(self.bus.name()));
        self.origins.check(headers)?;
        guard.set_state(SessionState::Authenticated);
        let subscription = self.subscribe()?;
        Ok((subscription, guard))
    }

    fn subscribe(&self) -> Result<Subscription<T>, SetupError> {
        let allowed = Arc::clone(&self.allowed);
        self.bus
            .subscribe_filtered(move |event: &T| allowed.contains(event.event_type()))
            .map_err(|e| SetupError::UpstreamUnavailable(format!("{} bus: {}", self.bus.name(), e)))
    }

    /// Drive one session to completion.
    pub async fn run<W, R, E>(
        &self,
        mut sink: W,
        stream: R,
        mut subscription: Subscription<T>,
        guard: SessionGuard,
    ) where
        W: Sink<Message> + Unpin,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let session_id = guard.id();
        let token = guard.token().clone();
        let filter = TypeFilter::new(&self.allowed);
        let limiter = RateLimiter::from_config(&self.rate_limit);

        guard.set_state(SessionState::Streaming);
        info!(
            %session_id,
            bus = self.bus.name(),
            subscription_id = subscription.id(),
            rate_limit = limiter.limit(),
            "WebSocket session streaming"
        );

        let writer = async {
            let result = write_loop(
                &mut sink,
                &mut subscription,
                &filter,
                &limiter,
                &self.websocket,
                &token,
            )
            .await;
            token.cancel();
            result
        };
        let reader = async {
            read_loop(stream, &filter, &self.allowed, &token, session_id).await;
            token.cancel();
        };
        let (written, ()) = tokio::join!(writer, reader);

        guard.set_state(SessionState::Closing);
        subscription.cancel();
        match written {
            Ok(()) => debug!(%session_id, "Write loop finished"),
            Err(e) => warn!(%session_id, error = %e, "WebSocket session ended by write failure"),
        }

        let _ = timeout(self.websocket.write_timeout, sink.close()).await;
        guard.set_state(SessionState::Closed);
        info!(
            %session_id,
            bus = self.bus.name(),
            dropped_by_bus = subscription.dropped(),
            "WebSocket session closed"
        );
    }
}

async fn write_loop<T, W>(
    sink: &mut W,
    subscription: &mut Subscription<T>,
    filter: &TypeFilter,
    limiter: &RateLimiter,
    config: &WebSocketConfig,
    token: &CancelToken,
) -> Result<(), SessionError>
where
    T: StreamEvent + Serialize,
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut ping = interval_at(
        tokio::time::Instant::now() + config.ping_interval,
        config.ping_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            next = subscription.recv() => {
                let Some(event) = next else {
                    debug!(subscription_id = subscription.id(), "Bus closed, ending session");
                    return Ok(());
                };
                let event_type = event.event_type();
                if !filter.allows(event_type) {
                    trace!(event_type, "Dropped by type filter");
                    continue;
                }
                if !limiter.allow(Instant::now()) {
                    trace!(event_type, "Dropped by rate limiter");
                    continue;
                }
                let text = build_payload(event, Utc::now())?;
                send_with_deadline(sink, Message::Text(text), config.write_timeout).await?;
            }
            _ = ping.tick() => {
                send_with_deadline(sink, Message::Ping(Vec::new()), config.write_timeout).await?;
            }
        }
    }
}

async fn send_with_deadline<W>(
    sink: &mut W,
    message: Message,
    deadline: Duration,
) -> Result<(), SessionError>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    match timeout(deadline, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SessionError::Transport(e.to_string())),
        Err(_) => Err(SessionError::WriteTimeout(deadline)),
    }
}

async fn read_loop<R, E>(
    mut stream: R,
    filter: &TypeFilter,
    allowed: &AllowedTypes,
    token: &CancelToken,
    session_id: Uuid,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            frame = stream.next() => frame,
        };

        match frame {
            None => {
                debug!(%session_id, "Peer went away");
                return;
            }
            Some(Err(e)) => {
                debug!(%session_id, error = %e, "WebSocket read failed");
                return;
            }
            Some(Ok(Message::Close(_))) => {
                debug!(%session_id, "Peer closed");
                return;
            }
            Some(Ok(Message::Text(text))) => match ControlMessage::parse(&text) {
                Some(control) => {
                    let active = filter.set(&control.subscribe, allowed);
                    debug!(
                        %session_id,
                        requested = control.subscribe.len(),
                        active,
                        types = ?filter.snapshot(),
                        "Subscription updated"
                    );
                }
                None => trace!(%session_id, "Ignoring malformed control frame"),
            },
            // Binary frames, pings and pongs
            Some(Ok(_)) => {}
        }
    }
}
