//! The set of producer buses the gateway streams from.
//!
//! Producers build their own `Bus<T>` and hand it over here; the gateway
//! never creates or closes a bus. A bus left as `None` is reported as
//! unavailable to clients that need it.

use serde::Serialize;
use shared_bus::Bus;
use shared_types::{AgentEvent, ConfigEvent, IndexEvent, TerminalEvent, WatcherEvent, WorkflowEvent};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct EventBuses {
    pub watcher: Option<Arc<Bus<WatcherEvent>>>,
    pub config: Option<Arc<Bus<ConfigEvent>>>,
    pub workflow: Option<Arc<Bus<WorkflowEvent>>>,
    pub agent: Option<Arc<Bus<AgentEvent>>>,
    pub terminal: Option<Arc<Bus<TerminalEvent>>>,
    pub index: Option<Arc<Bus<IndexEvent>>>,
}

/// Point-in-time counters of one bus.
#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    pub name: &'static str,
    pub closed: bool,
    pub subscribers: usize,
    pub events_published: u64,
    pub events_dropped: u64,
}

impl BusStats {
    fn of<T: Clone + Send + 'static>(bus: &Bus<T>) -> Self {
        Self {
            name: bus.name(),
            closed: bus.is_closed(),
            subscribers: bus.subscriber_count(),
            events_published: bus.events_published(),
            events_dropped: bus.events_dropped(),
        }
    }
}

impl EventBuses {
    /// Every bus created with the same subscriber queue capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            watcher: Some(Arc::new(Bus::with_capacity("watcher", capacity))),
            config: Some(Arc::new(Bus::with_capacity("config", capacity))),
            workflow: Some(Arc::new(Bus::with_capacity("workflow", capacity))),
            agent: Some(Arc::new(Bus::with_capacity("agent", capacity))),
            terminal: Some(Arc::new(Bus::with_capacity("terminal", capacity))),
            index: Some(Arc::new(Bus::with_capacity("index", capacity))),
        }
    }

    /// Counters of every configured bus.
    pub fn stats(&self) -> Vec<BusStats> {
        let mut stats = Vec::with_capacity(6);
        if let Some(bus) = &self.watcher {
            stats.push(BusStats::of(bus));
        }
        if let Some(bus) = &self.config {
            stats.push(BusStats::of(bus));
        }
        if let Some(bus) = &self.workflow {
            stats.push(BusStats::of(bus));
        }
        if let Some(bus) = &self.agent {
            stats.push(BusStats::of(bus));
        }
        if let Some(bus) = &self.terminal {
            stats.push(BusStats::of(bus));
        }
        if let Some(bus) = &self.index {
            stats.push(BusStats::of(bus));
        }
        stats
    }

    /// Close every configured bus. Already-closed buses are left alone.
    pub fn close_all(&self) {
        if let Some(bus) = &self.watcher {
            bus.close();
        }
        if let Some(bus) = &self.config {
            bus.close();
        }
        if let Some(bus) = &self.workflow {
            bus.close();
        }
        if let Some(bus) = &self.agent {
            bus.close();
        }
        if let Some(bus) = &self.terminal {
            bus.close();
        }
        if let Some(bus) = &self.index {
            bus.close();
        }
    }
}
