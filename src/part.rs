//! Renderable part vocabulary and the message value that owns it.
//!
//! Every part shares `{id, created_at}`. Parts are created once, updated in
//! place by id as events arrive, and never deleted; a finalized message stops
//! receiving events and its parts become effectively immutable.

use std::collections::HashMap;

use agent_stream::HitlQuestion;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::UnixMillis;
use crate::part_id::PartId;

/// One renderable unit of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text(TextPart),
    Reasoning(ReasoningPart),
    Tool(ToolPart),
    Agent(AgentPart),
    TaskList(TaskListPart),
    WorkflowStep(WorkflowStepPart),
    SkillLoad(SkillLoadPart),
    McpSnapshot(McpSnapshotPart),
    Compaction(CompactionPart),
}

impl Part {
    #[must_use]
    pub fn id(&self) -> &PartId {
        match self {
            Self::Text(part) => &part.id,
            Self::Reasoning(part) => &part.id,
            Self::Tool(part) => &part.id,
            Self::Agent(part) => &part.id,
            Self::TaskList(part) => &part.id,
            Self::WorkflowStep(part) => &part.id,
            Self::SkillLoad(part) => &part.id,
            Self::McpSnapshot(part) => &part.id,
            Self::Compaction(part) => &part.id,
        }
    }

    #[must_use]
    pub fn created_at(&self) -> UnixMillis {
        match self {
            Self::Text(part) => part.created_at,
            Self::Reasoning(part) => part.created_at,
            Self::Tool(part) => part.created_at,
            Self::Agent(part) => part.created_at,
            Self::TaskList(part) => part.created_at,
            Self::WorkflowStep(part) => part.created_at,
            Self::SkillLoad(part) => part.created_at,
            Self::McpSnapshot(part) => part.created_at,
            Self::Compaction(part) => part.created_at,
        }
    }
}

/// Accumulated assistant text. `is_streaming` is true only while the tail
/// segment is still receiving deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub id: PartId,
    pub created_at: UnixMillis,
    pub content: String,
    pub is_streaming: bool,
}

/// One reasoning block per distinct concurrent thinking source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningPart {
    pub id: PartId,
    pub created_at: UnixMillis,
    pub thinking_source_key: Option<String>,
    pub content: String,
    pub duration_ms: i64,
    pub is_streaming: bool,
}

/// One tool invocation tracked across its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPart {
    pub id: PartId,
    pub created_at: UnixMillis,
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
    pub partial_output: Option<String>,
    pub state: ToolState,
    pub pending_question: Option<HitlQuestion>,
    pub hitl_response: Option<HitlResponse>,
}

/// Recorded answer to a human-in-the-loop question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitlResponse {
    pub answer_text: String,
}

/// Tool lifecycle state machine. Transitions never move backward; terminal
/// states are absorbing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolState {
    Pending,
    Running {
        started_at: Option<String>,
    },
    Completed {
        output: Value,
        duration_ms: i64,
    },
    Error {
        error: String,
        output: Option<Value>,
    },
    Interrupted {
        partial_output: Option<String>,
        duration_ms: Option<i64>,
    },
}

impl ToolState {
    /// Position in the forward-only lifecycle; used to reject regressions.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running { .. } => 1,
            Self::Completed { .. } | Self::Error { .. } | Self::Interrupted { .. } => 2,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }
}

/// One or more concurrently tracked sub-agents, optionally anchored to the
/// tool call that spawned them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPart {
    pub id: PartId,
    pub created_at: UnixMillis,
    pub agents: Vec<ParallelAgent>,
    pub parent_tool_part_id: Option<PartId>,
}

/// Tracked state of one sub-agent. `inline_parts` is the agent's private,
/// fully isolated part sub-tree; agent-scoped events land there instead of
/// the top-level branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelAgent {
    pub id: String,
    pub name: String,
    pub task: String,
    pub status: AgentStatus,
    pub background: bool,
    pub started_at_ms: UnixMillis,
    pub duration_ms: Option<i64>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub task_tool_call_id: Option<String>,
    pub inline_parts: Vec<Part>,
}

/// Normalized sub-agent status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Running,
    Background,
    Completed,
    Error,
    Interrupted,
}

impl AgentStatus {
    /// Maps a free-form provider status string; unknown strings degrade to
    /// `Pending`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "running" | "in_progress" => Self::Running,
            "background" => Self::Background,
            "completed" | "complete" | "done" | "success" => Self::Completed,
            "error" | "failed" => Self::Error,
            "interrupted" | "cancelled" => Self::Interrupted,
            _ => Self::Pending,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Background => "background",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Interrupted => "interrupted",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Interrupted)
    }
}

/// Task checklist rendered as one collapsible part per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskListPart {
    pub id: PartId,
    pub created_at: UnixMillis,
    pub items: Vec<TaskItem>,
    pub expanded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: String,
    pub content: String,
    pub status: TaskStatus,
}

/// Normalized task-list item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl TaskStatus {
    /// Maps a free-form provider status string; unrecognized strings degrade
    /// to `Pending`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "in_progress" => Self::InProgress,
            "done" | "complete" | "completed" | "success" => Self::Completed,
            "failed" | "error" => Self::Error,
            _ => Self::Pending,
        }
    }
}

/// One workflow node's execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStepPart {
    pub id: PartId,
    pub created_at: UnixMillis,
    pub node_id: String,
    pub node_name: String,
    pub status: WorkflowStepStatus,
    pub started_at_ms: Option<UnixMillis>,
    pub completed_at_ms: Option<UnixMillis>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStepStatus {
    Running,
    Completed,
    Error,
}

/// Auxiliary detail part: a skill was loaded into the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillLoadPart {
    pub id: PartId,
    pub created_at: UnixMillis,
    pub skill_name: String,
}

/// Auxiliary detail part: MCP server inventory at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpSnapshotPart {
    pub id: PartId,
    pub created_at: UnixMillis,
    pub servers: Value,
}

/// Auxiliary detail part: the conversation was compacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionPart {
    pub id: PartId,
    pub created_at: UnixMillis,
    pub summary: String,
}

/// Legacy scalar mirror of one tool call, maintained alongside the part tree
/// during the migration window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
    pub completed: bool,
    pub is_error: bool,
    pub output: Option<Value>,
    pub hitl_answer: Option<String>,
}

/// One assistant message as assembled by the reducer.
///
/// `parts` is the single source of truth. `content`, `tool_calls`,
/// `parallel_agents`, and the thinking summary fields are legacy mirrors.
/// `reasoning_keys` maps thinking source keys to their reasoning part ids and
/// is rebuilt from `parts` whenever it goes stale. `agents_grouped` records
/// that the sub-agent tree has rendered in grouped mode, which is sticky for
/// the rest of the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Message {
    pub parts: Vec<Part>,
    pub content: String,
    pub tool_calls: Vec<MessageToolCall>,
    pub parallel_agents: Vec<ParallelAgent>,
    pub thinking_ms: i64,
    pub thinking_text: Option<String>,
    pub reasoning_keys: HashMap<String, PartId>,
    pub agents_grouped: bool,
}

impl Message {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
