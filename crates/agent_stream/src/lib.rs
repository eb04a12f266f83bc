//! Provider-neutral contract for message-scoped stream events.
//!
//! This crate intentionally defines only the event vocabulary consumed by the
//! parts reconciliation engine and the source contract that adapter crates
//! implement. It excludes provider transport details, reducer semantics, and
//! rendering concerns. Free-form provider strings (agent statuses, task
//! statuses) are carried verbatim; normalization belongs to the engine.

use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Shared cancellation flag for a driven event source.
pub type CancelSignal = Arc<AtomicBool>;

/// Question payload attached to a human-in-the-loop tool pause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitlQuestion {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl HitlQuestion {
    #[must_use]
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            options: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_options(question: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            question: question.into(),
            options,
        }
    }
}

/// Provider-reported snapshot of one concurrently running sub-agent.
///
/// `status` is the provider's free-form string; the engine normalizes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub name: String,
    pub task: String,
    pub status: String,
    #[serde(default)]
    pub background: bool,
    pub started_at: Option<String>,
    pub duration_ms: Option<i64>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub task_tool_call_id: Option<String>,
}

/// Provider-reported task-list row with a free-form status string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItemUpdate {
    pub id: String,
    pub content: String,
    pub status: String,
}

/// One reconciliation event, already attributed to a message by the
/// dispatch/correlation layer. `agent_id`, where present, scopes the event to
/// a sub-agent's private part branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamPartEvent {
    TextDelta {
        agent_id: Option<String>,
        delta: String,
    },
    ThinkingMeta {
        source_key: Option<String>,
        text: Option<String>,
        duration_ms: Option<i64>,
        #[serde(default)]
        include_reasoning_part: bool,
    },
    ToolStart {
        agent_id: Option<String>,
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        input: Value,
        started_at: Option<String>,
    },
    ToolComplete {
        agent_id: Option<String>,
        tool_call_id: String,
        success: bool,
        output: Option<Value>,
        error: Option<String>,
        completed_at: Option<String>,
        tool_name: Option<String>,
        input: Option<Value>,
    },
    ToolPartialResult {
        tool_call_id: String,
        chunk: String,
    },
    ToolHitlRequest {
        tool_call_id: String,
        question: HitlQuestion,
    },
    ToolHitlResponse {
        tool_call_id: String,
        answer_text: String,
    },
    ParallelAgents {
        agents: Vec<AgentSnapshot>,
        #[serde(default)]
        group_into_single_tree: bool,
    },
    WorkflowStepStart {
        node_id: String,
        node_name: String,
        started_at: Option<String>,
    },
    WorkflowStepComplete {
        node_id: String,
        status: String,
        completed_at: Option<String>,
    },
    TaskListUpdate {
        items: Vec<TaskItemUpdate>,
        expanded: Option<bool>,
    },
    SkillLoad {
        skill_name: String,
    },
    McpSnapshot {
        servers: Value,
    },
    Compaction {
        summary: String,
    },
}

impl StreamPartEvent {
    /// Returns the sub-agent scope for events that support per-agent routing.
    #[must_use]
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::TextDelta { agent_id, .. }
            | Self::ToolStart { agent_id, .. }
            | Self::ToolComplete { agent_id, .. } => agent_id.as_deref(),
            _ => None,
        }
    }

    /// Parses one newline-delimited JSON event line emitted by an adapter.
    pub fn from_json_line(line: &str) -> Result<Self, EventDecodeError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(EventDecodeError::EmptyLine);
        }

        serde_json::from_str(trimmed).map_err(|source| EventDecodeError::Json { source })
    }

    /// Serializes the event as one JSON line for transport between layers.
    pub fn to_json_line(&self) -> Result<String, EventDecodeError> {
        serde_json::to_string(self).map_err(|source| EventDecodeError::Json { source })
    }
}

/// Error produced while decoding adapter-emitted event lines.
#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("stream event line is empty")]
    EmptyLine,

    #[error("failed to parse stream event JSON: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },
}

/// Identity metadata for an event source adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceProfile {
    pub source_id: String,
    pub runtime_id: String,
}

/// One event paired with the message it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageScopedEvent {
    pub message_key: String,
    pub event: StreamPartEvent,
}

/// Adapter contract for anything that can feed reconciliation events.
///
/// Implementations translate raw provider activity (SDK callbacks, wire
/// events) into `StreamPartEvent`s and emit them in provider order. The
/// callback is serial from the caller perspective; sources never reorder.
pub trait EventSource: Send + Sync + 'static {
    /// Returns source/runtime identity metadata.
    fn profile(&self) -> SourceProfile;

    /// Drives the source to completion, emitting events as they occur.
    ///
    /// Sources must observe `cancel` between events and stop promptly once it
    /// is set. Emitting after returning is a contract violation.
    fn drive(
        &self,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(MessageScopedEvent),
    ) -> Result<(), String>;
}
