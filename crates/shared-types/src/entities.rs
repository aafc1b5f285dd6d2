//! # Event Payloads
//!
//! One payload per producer bus. The wire shape of each is
//! `{"type": "<kind>", ...fields, "timestamp": "<RFC3339>"}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stream_event::{event_kinds, impl_stream_event};

// =============================================================================
// FILE / GIT WATCHER
// =============================================================================

event_kinds! {
    /// File-system and git changes reported by the workspace watcher.
    WatcherEventKind {
        FileChanged => "file_changed",
        FileCreated => "file_created",
        FileDeleted => "file_deleted",
        FileRenamed => "file_renamed",
        GitStatusChanged => "git_status_changed",
        GitBranchChanged => "git_branch_changed",
    }
}

/// A change observed by the file/git watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherEvent {
    #[serde(rename = "type")]
    pub kind: WatcherEventKind,
    pub path: String,
    /// Previous path, for renames only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl WatcherEvent {
    pub fn new(kind: WatcherEventKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            old_path: None,
            timestamp: None,
        }
    }

    pub fn renamed(old_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: WatcherEventKind::FileRenamed,
            path: path.into(),
            old_path: Some(old_path.into()),
            timestamp: None,
        }
    }
}

impl_stream_event!(WatcherEvent, WatcherEventKind);

// =============================================================================
// CONFIGURATION
// =============================================================================

event_kinds! {
    /// Configuration lifecycle.
    ConfigEventKind {
        ConfigChanged => "config_changed",
        ConfigReloaded => "config_reloaded",
        ConfigError => "config_error",
    }
}

/// A configuration change or reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEvent {
    #[serde(rename = "type")]
    pub kind: ConfigEventKind,
    /// Dotted key that changed, if the change was scoped to one key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Config file the change came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConfigEvent {
    pub fn new(kind: ConfigEventKind) -> Self {
        Self {
            kind,
            key: None,
            path: None,
            message: None,
            timestamp: None,
        }
    }

    pub fn changed(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::new(ConfigEventKind::ConfigChanged)
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl_stream_event!(ConfigEvent, ConfigEventKind);

// =============================================================================
// WORKFLOW
// =============================================================================

event_kinds! {
    /// Workflow state machine transitions and signals.
    WorkflowEventKind {
        FlowStarted => "flow_started",
        FlowTransition => "flow_transition",
        FlowSignal => "flow_signal",
        FlowCompleted => "flow_completed",
        FlowFailed => "flow_failed",
    }
}

/// A workflow transition or signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    #[serde(rename = "type")]
    pub kind: WorkflowEventKind,
    pub flow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl WorkflowEvent {
    pub fn new(kind: WorkflowEventKind, flow_id: impl Into<String>) -> Self {
        Self {
            kind,
            flow_id: flow_id.into(),
            from_state: None,
            to_state: None,
            signal: None,
            timestamp: None,
        }
    }

    pub fn transition(
        flow_id: impl Into<String>,
        from_state: impl Into<String>,
        to_state: impl Into<String>,
    ) -> Self {
        Self {
            from_state: Some(from_state.into()),
            to_state: Some(to_state.into()),
            ..Self::new(WorkflowEventKind::FlowTransition, flow_id)
        }
    }

    pub fn signal(flow_id: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            signal: Some(signal.into()),
            ..Self::new(WorkflowEventKind::FlowSignal, flow_id)
        }
    }
}

impl_stream_event!(WorkflowEvent, WorkflowEventKind);

// =============================================================================
// AGENT
// =============================================================================

event_kinds! {
    /// Agent lifecycle.
    AgentEventKind {
        AgentStarted => "agent_started",
        AgentStatus => "agent_status",
        AgentOutput => "agent_output",
        AgentStopped => "agent_stopped",
    }
}

/// An agent lifecycle change or output line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub kind: AgentEventKind,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AgentEvent {
    pub fn new(kind: AgentEventKind, agent_id: impl Into<String>) -> Self {
        Self {
            kind,
            agent_id: agent_id.into(),
            status: None,
            message: None,
            timestamp: None,
        }
    }

    pub fn status(agent_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::new(AgentEventKind::AgentStatus, agent_id)
        }
    }
}

impl_stream_event!(AgentEvent, AgentEventKind);

// =============================================================================
// TERMINAL
// =============================================================================

event_kinds! {
    /// Terminal session lifecycle and output.
    TerminalEventKind {
        TerminalCreated => "terminal_created",
        TerminalOutput => "terminal_output",
        TerminalExited => "terminal_exited",
    }
}

/// Terminal output chunk or lifecycle change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalEvent {
    #[serde(rename = "type")]
    pub kind: TerminalEventKind,
    pub terminal_id: String,
    /// Output chunk, for `terminal_output`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TerminalEvent {
    pub fn new(kind: TerminalEventKind, terminal_id: impl Into<String>) -> Self {
        Self {
            kind,
            terminal_id: terminal_id.into(),
            data: None,
            exit_code: None,
            timestamp: None,
        }
    }

    pub fn output(terminal_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::new(TerminalEventKind::TerminalOutput, terminal_id)
        }
    }

    pub fn exited(terminal_id: impl Into<String>, exit_code: i32) -> Self {
        Self {
            exit_code: Some(exit_code),
            ..Self::new(TerminalEventKind::TerminalExited, terminal_id)
        }
    }
}

impl_stream_event!(TerminalEvent, TerminalEventKind);

// =============================================================================
// CODE INDEX
// =============================================================================

event_kinds! {
    /// Code-index build progress.
    IndexEventKind {
        IndexStarted => "index_started",
        IndexProgress => "index_progress",
        IndexCompleted => "index_completed",
        IndexFailed => "index_failed",
    }
}

/// Progress of a code-index build for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEvent {
    #[serde(rename = "type")]
    pub kind: IndexEventKind,
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl IndexEvent {
    pub fn new(kind: IndexEventKind, project: impl Into<String>) -> Self {
        Self {
            kind,
            project: project.into(),
            indexed: None,
            total: None,
            message: None,
            timestamp: None,
        }
    }

    pub fn progress(project: impl Into<String>, indexed: u64, total: u64) -> Self {
        Self {
            indexed: Some(indexed),
            total: Some(total),
            ..Self::new(IndexEventKind::IndexProgress, project)
        }
    }
}

impl_stream_event!(IndexEvent, IndexEventKind);
