//! Sub-agent routing and grouping.
//!
//! Every tracked sub-agent owns a private `inline_parts` branch; agent-scoped
//! events are applied there with the same merge primitives as the top-level
//! branch. Events for an agent the message does not know yet are dropped by
//! the caller, never spilled into another branch — replay of such races is
//! the dispatcher's job, not the reducer's.

use agent_stream::AgentSnapshot;

use crate::clock::{now_ms, parse_timestamp_ms};
use crate::part::{AgentPart, AgentStatus, ParallelAgent, Part};
use crate::part_id::{create_anchored_part_id, create_part_id, PartId};
use crate::store::{find_last_part_index, upsert_part};
use crate::text::finalize_streaming_text;

/// Tool names that spawn sub-agents and therefore anchor their trees.
pub const TASK_TOOL_NAMES: [&str; 2] = ["Task", "task"];

/// Outcome of routing one event into an agent's inline branch.
#[derive(Debug)]
pub enum AgentRoute {
    /// The branch function was applied to the owning agent's `inline_parts`.
    Routed(Vec<Part>),
    /// No agent with that id exists yet; the event must be dropped.
    UnknownAgent(Vec<Part>),
}

impl AgentRoute {
    /// Unwraps the (possibly updated) top-level part array either way.
    #[must_use]
    pub fn into_parts(self) -> Vec<Part> {
        match self {
            Self::Routed(parts) | Self::UnknownAgent(parts) => parts,
        }
    }
}

/// Applies `apply` to the `inline_parts` of the agent with the given id,
/// searching nested agent trees as well.
pub fn route_to_agent_inline_parts<F>(mut parts: Vec<Part>, agent_id: &str, apply: F) -> AgentRoute
where
    F: FnOnce(Vec<Part>) -> Vec<Part>,
{
    let mut apply = Some(apply);
    if route_in_branch(&mut parts, agent_id, &mut apply) {
        AgentRoute::Routed(parts)
    } else {
        AgentRoute::UnknownAgent(parts)
    }
}

fn route_in_branch<F>(parts: &mut [Part], agent_id: &str, apply: &mut Option<F>) -> bool
where
    F: FnOnce(Vec<Part>) -> Vec<Part>,
{
    for part in parts.iter_mut() {
        let Part::Agent(agent_part) = part else {
            continue;
        };

        for agent in agent_part.agents.iter_mut() {
            if agent.id == agent_id {
                let branch = std::mem::take(&mut agent.inline_parts);
                let apply = apply.take().expect("branch function applied once");
                agent.inline_parts = apply(branch);
                return true;
            }

            if route_in_branch(&mut agent.inline_parts, agent_id, apply) {
                return true;
            }
        }
    }

    false
}

/// Whether this message's sub-agents have already rendered as one grouped
/// tree. Derivable from the parts alone: split mode never places an agent
/// that carries a spawning tool call id into a parentless tree.
#[must_use]
pub fn agents_previously_grouped(parts: &[Part]) -> bool {
    parts.iter().any(|part| {
        matches!(
            part,
            Part::Agent(agent_part)
                if agent_part.parent_tool_part_id.is_none()
                    && agent_part
                        .agents
                        .iter()
                        .any(|agent| agent.task_tool_call_id.is_some())
        )
    })
}

/// Merges reported sub-agent snapshots into the part tree.
///
/// Grouped mode collapses every agent into one parentless tree placed after
/// the last spawning tool; once a message has grouped, it stays grouped.
/// Split mode buckets agents by their spawning tool call and anchors one
/// tree per bucket, matching existing trees by anchor so parts never move.
#[must_use]
pub fn merge_parallel_agents_into_parts(
    mut parts: Vec<Part>,
    snapshots: &[AgentSnapshot],
    group_into_single_tree: bool,
) -> Vec<Part> {
    if snapshots.is_empty() {
        return parts;
    }

    let grouped = group_into_single_tree || agents_previously_grouped(&parts);
    if grouped {
        let incoming = snapshots.iter().map(snapshot_to_agent).collect();
        return merge_into_parentless_tree(parts, incoming);
    }

    let mut buckets: Vec<(Option<PartId>, Vec<ParallelAgent>)> = Vec::new();
    for snapshot in snapshots {
        let anchor = snapshot
            .task_tool_call_id
            .as_deref()
            .and_then(|call_id| find_tool_part_id(&parts, call_id))
            .cloned();
        let agent = snapshot_to_agent(snapshot);

        match buckets.iter_mut().find(|(key, _)| *key == anchor) {
            Some((_, bucket)) => bucket.push(agent),
            None => buckets.push((anchor, vec![agent])),
        }
    }

    for (anchor, incoming) in buckets {
        parts = match anchor {
            Some(parent_id) => merge_into_anchored_tree(parts, &parent_id, incoming),
            None => merge_into_parentless_tree(parts, incoming),
        };
    }

    parts
}

/// Clones every tracked agent across all agent parts, in part order. Feeds
/// the legacy `parallel_agents` mirror.
#[must_use]
pub fn collect_parallel_agents(parts: &[Part]) -> Vec<ParallelAgent> {
    let mut agents = Vec::new();
    for part in parts {
        if let Part::Agent(agent_part) = part {
            agents.extend(agent_part.agents.iter().cloned());
        }
    }

    agents
}

fn merge_into_anchored_tree(
    mut parts: Vec<Part>,
    parent_id: &PartId,
    incoming: Vec<ParallelAgent>,
) -> Vec<Part> {
    let existing = parts.iter_mut().find_map(|part| match part {
        Part::Agent(agent_part)
            if agent_part.parent_tool_part_id.as_ref() == Some(parent_id) =>
        {
            Some(agent_part)
        }
        _ => None,
    });

    if let Some(agent_part) = existing {
        merge_agents_into(&mut agent_part.agents, incoming);
        return parts;
    }

    let part = AgentPart {
        id: create_anchored_part_id(Some(parent_id)),
        created_at: now_ms(),
        agents: incoming,
        parent_tool_part_id: Some(parent_id.clone()),
    };
    upsert_part(parts, Part::Agent(part))
}

fn merge_into_parentless_tree(mut parts: Vec<Part>, incoming: Vec<ParallelAgent>) -> Vec<Part> {
    let existing = parts.iter_mut().find_map(|part| match part {
        Part::Agent(agent_part) if agent_part.parent_tool_part_id.is_none() => Some(agent_part),
        _ => None,
    });

    if let Some(agent_part) = existing {
        merge_agents_into(&mut agent_part.agents, incoming);
        return parts;
    }

    let anchor = grouped_anchor(&parts).cloned();
    if anchor.is_none() {
        // The new tree lands at the end of the branch; close any open text
        // first so the streaming part stays last.
        parts = finalize_streaming_text(parts);
    }
    let part = AgentPart {
        id: match &anchor {
            Some(anchor) => create_anchored_part_id(Some(anchor)),
            None => create_part_id(),
        },
        created_at: now_ms(),
        agents: incoming,
        parent_tool_part_id: None,
    };
    upsert_part(parts, Part::Agent(part))
}

/// Position for a new parentless tree: after the last spawning tool part,
/// else after the last tool part, else at the end of the branch.
fn grouped_anchor(parts: &[Part]) -> Option<&PartId> {
    let task_index = find_last_part_index(parts, |part| {
        matches!(
            part,
            Part::Tool(tool) if TASK_TOOL_NAMES.contains(&tool.tool_name.as_str())
        )
    });

    let anchor_index =
        task_index.or_else(|| find_last_part_index(parts, |part| matches!(part, Part::Tool(_))));

    anchor_index.map(|index| parts[index].id())
}

fn find_tool_part_id<'a>(parts: &'a [Part], tool_call_id: &str) -> Option<&'a PartId> {
    parts.iter().find_map(|part| match part {
        Part::Tool(tool) if tool.tool_call_id == tool_call_id => Some(&tool.id),
        _ => None,
    })
}

fn snapshot_to_agent(snapshot: &AgentSnapshot) -> ParallelAgent {
    ParallelAgent {
        id: snapshot.id.clone(),
        name: snapshot.name.clone(),
        task: snapshot.task.clone(),
        status: AgentStatus::parse(&snapshot.status),
        background: snapshot.background,
        started_at_ms: snapshot
            .started_at
            .as_deref()
            .and_then(parse_timestamp_ms)
            .unwrap_or_else(now_ms),
        duration_ms: snapshot.duration_ms,
        result: normalize_result(snapshot.result.as_deref()),
        error: snapshot.error.clone(),
        task_tool_call_id: snapshot.task_tool_call_id.clone(),
        inline_parts: Vec::new(),
    }
}

/// Strips the trailing whitespace/newline noise providers append to agent
/// result text; an all-noise result collapses to none.
fn normalize_result(result: Option<&str>) -> Option<String> {
    let trimmed = result?.trim_end_matches([' ', '\t', '\r', '\n']);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn merge_agents_into(agents: &mut Vec<ParallelAgent>, incoming: Vec<ParallelAgent>) {
    for agent in incoming {
        match agents.iter_mut().find(|existing| existing.id == agent.id) {
            Some(existing) => merge_agent(existing, agent),
            None => agents.push(agent),
        }
    }
}

/// Merges one reported agent into its tracked entry. The tracked entry keeps
/// its `inline_parts` and original start; a terminal entry is never demoted.
fn merge_agent(existing: &mut ParallelAgent, incoming: ParallelAgent) {
    if existing.status.is_terminal() && !incoming.status.is_terminal() {
        return;
    }

    existing.name = incoming.name;
    existing.task = incoming.task;
    existing.status = incoming.status;
    existing.background = incoming.background;
    if incoming.duration_ms.is_some() {
        existing.duration_ms = incoming.duration_ms;
    }
    if incoming.result.is_some() {
        existing.result = incoming.result;
    }
    if incoming.error.is_some() {
        existing.error = incoming.error;
    }
    if existing.task_tool_call_id.is_none() {
        existing.task_tool_call_id = incoming.task_tool_call_id;
    }
}
