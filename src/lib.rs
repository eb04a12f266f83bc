//! Parts reconciliation engine for multi-runtime coding-agent transcripts.
//!
//! Invariant: single reducer gate — only [`apply_stream_part_event`] mutates a
//! message's part tree; every other module is a pure merge primitive it
//! composes.
//!
//! # Public API Overview
//! - Feed provider activity through [`apply_stream_part_event`], one
//!   [`agent_stream::StreamPartEvent`] at a time.
//! - Read the reconciled transcript from [`Message::parts`]; the array is
//!   always strictly sorted by [`PartId`], so equal inputs render equal trees.
//! - Settle a finished turn with [`finalize_message`].
//! - Consult the [`lifecycle`] guards to decide when deferred streams close.

pub mod agents;
pub mod clock;
pub mod lifecycle;
pub mod part;
pub mod part_id;
pub mod reducer;
pub mod store;
pub mod text;
pub mod tool;

/// Part data model and the message container.
pub use crate::part::{
    AgentPart, AgentStatus, CompactionPart, HitlResponse, McpSnapshotPart, Message,
    MessageToolCall, ParallelAgent, Part, ReasoningPart, SkillLoadPart, TaskItem, TaskListPart,
    TaskStatus, TextPart, ToolPart, ToolState, WorkflowStepPart, WorkflowStepStatus,
};

/// Identifier generation for parts.
pub use crate::part_id::{create_anchored_part_id, create_part_id, PartId};

/// The reducer entry points.
pub use crate::reducer::{apply_stream_part_event, finalize_message, message_text};

/// Sorted part-store primitives.
pub use crate::store::{binary_search_by_id, upsert_part};

/// Sub-agent routing and grouping.
pub use crate::agents::{
    agents_previously_grouped, collect_parallel_agents, merge_parallel_agents_into_parts,
    route_to_agent_inline_parts, AgentRoute, TASK_TOOL_NAMES,
};

/// Stream-settlement guards.
pub use crate::lifecycle::{
    has_active_foreground_agents, has_running_tool, is_shadow_duplicate,
    should_finalize_deferred_stream, should_finalize_on_tool_complete,
};

/// Tool-name classification for human-in-the-loop exchanges.
pub use crate::tool::{is_hitl_tool, HITL_TOOL_NAMES};
