//! Combined SSE feed over the watcher, config, workflow, agent and terminal
//! buses.
//!
//! Setup is all-or-nothing: if any of the five buses is missing or closed
//! the client gets exactly one `error` frame carrying a `retry:` hint, and
//! the stream ends. Otherwise each bus is subscribed with
//! `type ∈ server-allowed ∩ ?types=` and merged through a [`FanIn`].

use crate::buses::EventBuses;
use crate::domain::config::{RateLimitConfig, SseConfig};
use crate::domain::error::SetupError;
use crate::session::{
    allowed_types, AllowedTypes, RateLimiter, SessionGuard, SessionKind, SessionState,
    SessionTracker, TypeFilter,
};
use crate::sse::fan_in::{FanIn, MergedStream};
use crate::sse::frame::SseFrame;
use axum::extract::Query;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, MethodRouter};
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use shared_bus::{Bus, Subscription};
use shared_types::{AgentEvent, ConfigEvent, StreamEvent, TerminalEvent, WatcherEvent, WorkflowEvent};
use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Parse repeated `types=a,b,c` parameters.
///
/// `None` when no type was named, which means no client-side narrowing.
pub fn parse_types(params: &[(String, String)]) -> Option<HashSet<String>> {
    let types: HashSet<String> = params
        .iter()
        .filter(|(key, _)| key == "types")
        .flat_map(|(_, value)| value.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    (!types.is_empty()).then_some(types)
}

/// Server-allowed sets of the five merged buses.
#[derive(Debug, Clone)]
struct SourceTypes {
    watcher: AllowedTypes,
    config: AllowedTypes,
    workflow: AllowedTypes,
    agent: AllowedTypes,
    terminal: AllowedTypes,
}

/// Accepts SSE sessions over the combined feed.
pub struct SseRoute {
    buses: EventBuses,
    allowed: SourceTypes,
    sse: SseConfig,
    rate_limit: RateLimitConfig,
    tracker: Arc<SessionTracker>,
}

impl SseRoute {
    pub fn new(
        buses: EventBuses,
        disabled_types: &[String],
        sse: SseConfig,
        rate_limit: RateLimitConfig,
        tracker: Arc<SessionTracker>,
    ) -> Self {
        let allowed = SourceTypes {
            watcher: allowed_types(WatcherEvent::TYPES, disabled_types),
            config: allowed_types(ConfigEvent::TYPES, disabled_types),
            workflow: allowed_types(WorkflowEvent::TYPES, disabled_types),
            agent: allowed_types(AgentEvent::TYPES, disabled_types),
            terminal: allowed_types(TerminalEvent::TYPES, disabled_types),
        };
        Self {
            buses,
            allowed,
            sse,
            rate_limit,
            tracker,
        }
    }

    pub fn into_method_router(self) -> MethodRouter {
        let route = Arc::new(self);
        get(move |Query(params): Query<Vec<(String, String)>>| {
            let route = Arc::clone(&route);
            async move {
                let keep_alive = KeepAlive::new().interval(route.sse.keep_alive);
                let events = route
                    .open(parse_types(&params))
                    .map(|frame| Ok::<Event, Infallible>(frame.into()));
                Sse::new(events).keep_alive(keep_alive)
            }
        })
    }

    /// Open a session and return its frames.
    ///
    /// Ends after a single error frame if the feed cannot start.
    pub fn open(&self, requested: Option<HashSet<String>>) -> BoxStream<'static, SseFrame> {
        match self.start(requested.as_ref()) {
            Ok(session) => session.into_frames(),
            Err(e) => {
                warn!(error = %e, "SSE session refused");
                let frame = SseFrame::error(&e, self.sse.retry);
                stream::once(async move { frame }).boxed()
            }
        }
    }

    fn start(&self, requested: Option<&HashSet<String>>) -> Result<SseSession, SetupError> {
        let watcher = required(&self.buses.watcher, "watcher")?;
        let config = required(&self.buses.config, "config")?;
        let workflow = required(&self.buses.workflow, "workflow")?;
        let agent = required(&self.buses.agent, "agent")?;
        let terminal = required(&self.buses.terminal, "terminal")?;

        let watcher_types = narrow(&self.allowed.watcher, requested);
        let config_types = narrow(&self.allowed.config, requested);
        let workflow_types = narrow(&self.allowed.workflow, requested);
        let agent_types = narrow(&self.allowed.agent, requested);
        let terminal_types = narrow(&self.allowed.terminal, requested);

        let mut combined = AllowedTypes::new();
        for types in [
            &watcher_types,
            &config_types,
            &workflow_types,
            &agent_types,
            &terminal_types,
        ] {
            combined.extend(types.iter().cloned());
        }

        // Subscribe everything before spawning anything: a failure here
        // drops the subscriptions already made.
        let watcher_sub = subscribe(&watcher, watcher_types)?;
        let config_sub = subscribe(&config, config_types)?;
        let workflow_sub = subscribe(&workflow, workflow_types)?;
        let agent_sub = subscribe(&agent, agent_types)?;
        let terminal_sub = subscribe(&terminal, terminal_types)?;

        let guard = self.tracker.open(SessionKind::Sse);
        guard.set_state(SessionState::Authenticated);
        let mut fan_in = FanIn::new(self.sse.output_capacity, guard.token().clone());
        fan_in.add_source("watcher", watcher_sub);
        fan_in.add_source("config", config_sub);
        fan_in.add_source("workflow", workflow_sub);
        fan_in.add_source("agent", agent_sub);
        fan_in.add_source("terminal", terminal_sub);

        info!(
            session_id = %guard.id(),
            sources = fan_in.sources(),
            types = combined.len(),
            "SSE session streaming"
        );
        guard.set_state(SessionState::Streaming);

        Ok(SseSession {
            merged: fan_in.start(),
            filter: TypeFilter::new(&combined),
            limiter: RateLimiter::from_config(&self.rate_limit),
            guard,
        })
    }
}

fn required<T>(bus: &Option<Arc<Bus<T>>>, name: &str) -> Result<Arc<Bus<T>>, SetupError>
where
    T: Clone + Send + 'static,
{
    match bus {
        Some(bus) if !bus.is_closed() => Ok(Arc::clone(bus)),
        Some(_) => Err(SetupError::UpstreamUnavailable(format!("{name} bus closed"))),
        None => Err(SetupError::UpstreamUnavailable(format!(
            "{name} bus not configured"
        ))),
    }
}

fn narrow(allowed: &AllowedTypes, requested: Option<&HashSet<String>>) -> AllowedTypes {
    match requested {
        Some(requested) => allowed.intersection(requested).cloned().collect(),
        None => allowed.clone(),
    }
}

fn subscribe<T>(bus: &Bus<T>, types: AllowedTypes) -> Result<Subscription<T>, SetupError>
where
    T: StreamEvent,
{
    bus.subscribe_filtered(move |event: &T| types.contains(event.event_type()))
        .map_err(|e| SetupError::UpstreamUnavailable(format!("{} bus: {}", bus.name(), e)))
}

/// A running SSE session: the writer side of the fan-in.
struct SseSession {
    merged: MergedStream,
    filter: TypeFilter,
    limiter: RateLimiter,
    guard: SessionGuard,
}

impl SseSession {
    /// Frames until every source closes, the server shuts down, or the
    /// client goes away and the stream is dropped.
    fn into_frames(self) -> BoxStream<'static, SseFrame> {
        stream::unfold(self, |mut session| async move {
            loop {
                let envelope = tokio::select! {
                    biased;
                    _ = session.guard.token().cancelled() => None,
                    next = session.merged.recv() => next,
                };
                let Some(envelope) = envelope else {
                    session.guard.set_state(SessionState::Closing);
                    debug!(session_id = %session.guard.id(), "SSE session ending");
                    return None;
                };

                if !session.filter.allows(envelope.event_type) {
                    trace!(event_type = envelope.event_type, "Dropped by type filter");
                    continue;
                }
                if !session.limiter.allow(Instant::now()) {
                    trace!(event_type = envelope.event_type, "Dropped by rate limiter");
                    continue;
                }
                match SseFrame::from_envelope(envelope, Utc::now()) {
                    Ok(frame) => return Some((frame, session)),
                    Err(e) => warn!(error = %e, "Dropping unserializable envelope"),
                }
            }
        })
        .boxed()
    }
}
