//! Policy guards deciding when sub-agent and stream work counts as settled.
//!
//! Background agents are fire-and-forget: their spawning tool call completing
//! says nothing about the background work itself, and they never hold a
//! stream open.

use crate::part::{AgentStatus, ParallelAgent, Part, ToolState};

/// Whether a completed spawning tool call may finalize this agent's display.
///
/// Returns false for background work: the `Task` tool returning only means
/// the hand-off happened, not that the agent finished.
#[must_use]
pub fn should_finalize_on_tool_complete(agent: &ParallelAgent) -> bool {
    !(agent.background || agent.status == AgentStatus::Background)
}

/// Whether `agent` is a shadow duplicate of another foreground entry.
///
/// Some providers report a spawned agent twice while the spawn settles: once
/// anchored to its tool call and once as an unanchored placeholder with the
/// same name and task. The placeholder must not keep a stream open.
#[must_use]
pub fn is_shadow_duplicate(agent: &ParallelAgent, agents: &[ParallelAgent]) -> bool {
    agent.task_tool_call_id.is_none()
        && agents.iter().any(|other| {
            other.id != agent.id
                && other.task_tool_call_id.is_some()
                && other.name == agent.name
                && other.task == agent.task
                && !other.background
                && other.status != AgentStatus::Background
        })
}

/// Whether any non-background agent is still pending or running.
#[must_use]
pub fn has_active_foreground_agents(agents: &[ParallelAgent]) -> bool {
    agents.iter().any(|agent| {
        !agent.background
            && matches!(agent.status, AgentStatus::Pending | AgentStatus::Running)
            && !is_shadow_duplicate(agent, agents)
    })
}

/// Whether a deferred stream may be marked settled: no running tool and no
/// active foreground agent. Background agents never block settlement.
#[must_use]
pub fn should_finalize_deferred_stream(agents: &[ParallelAgent], has_running_tool: bool) -> bool {
    !has_running_tool && !has_active_foreground_agents(agents)
}

/// Whether any tool part in the branch is still pending or running.
#[must_use]
pub fn has_running_tool(parts: &[Part]) -> bool {
    parts.iter().any(|part| {
        matches!(
            part,
            Part::Tool(tool) if matches!(tool.state, ToolState::Pending | ToolState::Running { .. })
        )
    })
}
