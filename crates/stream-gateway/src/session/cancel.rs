//! Cooperative cancellation for session tasks.
//!
//! A [`CancelToken`] fires at most once. Every task of a session holds a
//! clone and selects on [`CancelToken::cancelled`] next to each blocking
//! operation. Child tokens also fire when their parent does, which is how
//! server shutdown reaches every live session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

struct Inner {
    cancelled: AtomicBool,
    tx: watch::Sender<bool>,
    parent: Option<CancelToken>,
}

/// Close-once cancellation signal shared by the tasks of one session.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<CancelToken>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                tx,
                parent,
            }),
        }
    }

    /// A token that fires when this one does, and can also fire on its own.
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    /// Fire the token. Returns `true` for the call that actually fired it.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.tx.send_replace(true);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(CancelToken::is_cancelled)
    }

    /// Resolves once this token or any ancestor has fired.
    pub async fn cancelled(&self) {
        let mut receivers = Vec::new();
        let mut node = Some(self);
        while let Some(token) = node {
            receivers.push(token.inner.tx.subscribe());
            node = token.inner.parent.as_ref();
        }

        let waits = receivers.iter_mut().map(|rx| {
            Box::pin(async move {
                // The sender lives as long as the token, so this only ends on fire
                let _ = rx.wait_for(|fired| *fired).await;
            })
        });
        futures::future::select_all(waits).await;
    }

    /// Cancel this token when the returned guard is dropped.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            token: self.clone(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Fires its token on drop.
///
/// Held by response streams: when the HTTP layer drops a stream because the
/// client went away, the session's other tasks are told to stop.
#[derive(Debug)]
pub struct CancelOnDrop {
    token: CancelToken,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
