//! Live-session registry and shutdown drain.
//!
//! Every accepted connection registers here and gets a [`SessionGuard`]. The
//! guard owns the session's cancel token, a child of the tracker's root, so
//! shutting the server down reaches every session. Dropping the guard
//! unregisters the session, which is what [`SessionTracker::wait_for_drain`]
//! waits for.

use crate::session::cancel::CancelToken;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

/// Session lifecycle. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    Authenticated,
    Streaming,
    Closing,
    Closed,
}

/// Transport and source of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "transport", content = "bus", rename_all = "snake_case")]
pub enum SessionKind {
    /// Single-bus WebSocket session on the named bus
    WebSocket(&'static str),
    /// Combined SSE feed
    Sse,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub kind: SessionKind,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
}

/// Registry of live sessions plus the root shutdown token.
#[derive(Debug)]
pub struct SessionTracker {
    root: CancelToken,
    sessions: DashMap<Uuid, SessionInfo>,
    drained: Notify,
}

impl SessionTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            root: CancelToken::new(),
            sessions: DashMap::new(),
            drained: Notify::new(),
        })
    }

    /// Register a connection that is still being admitted.
    pub fn open(self: &Arc<Self>, kind: SessionKind) -> SessionGuard {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            SessionInfo {
                id,
                kind,
                state: SessionState::Connecting,
                started_at: Utc::now(),
            },
        );
        info!(session_id = %id, ?kind, live = self.sessions.len(), "Session opened");

        SessionGuard {
            id,
            token: self.root.child(),
            tracker: Arc::clone(self),
        }
    }

    /// Root token; fires on server shutdown.
    pub fn shutdown_token(&self) -> CancelToken {
        self.root.clone()
    }

    /// Tell every session to stop.
    pub fn shutdown(&self) {
        if self.root.cancel() {
            info!(live = self.sessions.len(), "Shutting down streaming sessions");
        }
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Wait until no session is registered. Returns `false` on timeout.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.sessions.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.sessions.is_empty();
            }
        }
    }

    fn advance(&self, id: Uuid, next: SessionState) {
        if let Some(mut info) = self.sessions.get_mut(&id) {
            if next > info.state {
                debug!(session_id = %id, from = ?info.state, to = ?next, "Session state");
                info.state = next;
            }
        }
    }

    fn close(&self, id: Uuid) {
        if let Some((_, info)) = self.sessions.remove(&id) {
            let lived = Utc::now() - info.started_at;
            info!(
                session_id = %id,
                kind = ?info.kind,
                duration_ms = lived.num_milliseconds(),
                live = self.sessions.len(),
                "Session closed"
            );
        }
        self.drained.notify_waiters();
    }
}

/// Registration of one live session; unregisters on drop.
#[derive(Debug)]
pub struct SessionGuard {
    id: Uuid,
    token: CancelToken,
    tracker: Arc<SessionTracker>,
}

impl SessionGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// This session's cancel token.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn set_state(&self, next: SessionState) {
        self.tracker.advance(self.id, next);
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.token.cancel();
        self.tracker.close(self.id);
    }
}
