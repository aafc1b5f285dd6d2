//! N-way fan-in of typed subscriptions into one envelope queue.
//!
//! ```text
//! Subscription<WatcherEvent>  ──forwarder──┐
//! Subscription<WorkflowEvent> ──forwarder──┼──▶ mpsc<Envelope> (bounded) ──▶ writer
//! Subscription<AgentEvent>    ──forwarder──┘
//! ```
//!
//! Each forwarder owns one subscription and a clone of the output sender.
//! The output closes once every forwarder has exited and dropped its sender.
//! A forwarder exits when its source closes or the session token fires; a
//! push that is still waiting for room when the token fires is abandoned.

use crate::domain::envelope::Envelope;
use crate::session::cancel::{CancelOnDrop, CancelToken};
use serde::Serialize;
use shared_bus::Subscription;
use shared_types::StreamEvent;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

/// Why a forwarder stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwarderExit {
    /// Its bus closed
    SourceClosed,
    /// The session token fired
    Cancelled,
    /// Nobody reads the merged output any more
    OutputClosed,
}

/// Builder for a merged stream.
pub struct FanIn {
    sender: mpsc::Sender<Envelope>,
    receiver: mpsc::Receiver<Envelope>,
    forwarders: JoinSet<(&'static str, ForwarderExit)>,
    token: CancelToken,
}

impl FanIn {
    /// Merge into a queue of `capacity` envelopes, scoped to `token`.
    pub fn new(capacity: usize, token: CancelToken) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver,
            forwarders: JoinSet::new(),
            token,
        }
    }

    /// Spawn a forwarder for `subscription`.
    pub fn add_source<T>(&mut self, source: &'static str, subscription: Subscription<T>)
    where
        T: StreamEvent + Serialize,
    {
        let sender = self.sender.clone();
        let token = self.token.clone();
        self.forwarders.spawn(async move {
            let exit = forward(source, subscription, sender, token).await;
            (source, exit)
        });
    }

    pub fn sources(&self) -> usize {
        self.forwarders.len()
    }

    /// Stop adding sources and hand out the merged queue.
    pub fn start(self) -> MergedStream {
        let Self {
            sender,
            receiver,
            mut forwarders,
            token,
        } = self;
        drop(sender);

        let coordinator = tokio::spawn(async move {
            while let Some(joined) = forwarders.join_next().await {
                match joined {
                    Ok((source, exit)) => debug!(source, ?exit, "Forwarder exited"),
                    Err(e) => warn!(error = %e, "Forwarder task failed"),
                }
            }
            debug!("All forwarders exited");
        });

        MergedStream {
            receiver,
            coordinator,
            _cancel: token.drop_guard(),
        }
    }
}

/// Receiving end of a fan-in.
///
/// Dropping it fires the session token, which stops every forwarder.
pub struct MergedStream {
    receiver: mpsc::Receiver<Envelope>,
    coordinator: JoinHandle<()>,
    _cancel: CancelOnDrop,
}

impl MergedStream {
    /// Next envelope, or `None` once every source has stopped.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    /// Whether every forwarder has exited.
    #[cfg(test)]
    pub(crate) fn is_drained(&self) -> bool {
        self.coordinator.is_finished()
    }
}

async fn forward<T>(
    source: &'static str,
    mut subscription: Subscription<T>,
    sender: mpsc::Sender<Envelope>,
    token: CancelToken,
) -> ForwarderExit
where
    T: StreamEvent + Serialize,
{
    let exit = loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break ForwarderExit::Cancelled,
            next = subscription.recv() => match next {
                Some(event) => event,
                None => break ForwarderExit::SourceClosed,
            },
        };

        let envelope = Envelope::new(event);
        tokio::select! {
            biased;
            _ = token.cancelled() => break ForwarderExit::Cancelled,
            sent = sender.send(envelope) => {
                if sent.is_err() {
                    break ForwarderExit::OutputClosed;
                }
            }
        }
    };

    subscription.cancel();
    exit
}
