//! The stream-event reducer: one event in, one updated message out.
//!
//! This is the single entry point the dispatch layer calls. It is a total,
//! synchronous function; "waiting" (a pending HITL question, a running
//! background agent) is represented as data, never as control flow. Events
//! targeting entities the message does not know yet are no-ops: those are
//! expected races between delivery and registration, and replay belongs to
//! the dispatcher.

use std::collections::HashMap;

use agent_stream::StreamPartEvent;
use serde_json::Value;

use crate::agents::{
    agents_previously_grouped, collect_parallel_agents, merge_parallel_agents_into_parts,
    route_to_agent_inline_parts,
};
use crate::clock::{now_ms, parse_timestamp_ms};
use crate::part::{
    CompactionPart, McpSnapshotPart, Message, MessageToolCall, Part, ReasoningPart, SkillLoadPart,
    TaskItem, TaskListPart, TaskStatus, WorkflowStepPart, WorkflowStepStatus,
};
use crate::part_id::{create_anchored_part_id, create_part_id, PartId};
use crate::store::{binary_search_by_id, upsert_part};
use crate::text::{branch_text, finalize_streaming_text, handle_text_delta};
use crate::tool::{
    append_tool_partial_result, apply_hitl_response, set_pending_question, upsert_tool_part_complete,
    upsert_tool_part_start, SYNTHESIZED_HITL_TOOL_NAME,
};

/// Applies one stream event to a message, returning the updated message.
#[must_use]
pub fn apply_stream_part_event(mut message: Message, event: &StreamPartEvent) -> Message {
    match event {
        StreamPartEvent::TextDelta { agent_id, delta } => {
            let parts = std::mem::take(&mut message.parts);
            match agent_id {
                Some(agent_id) => {
                    message.parts = route_to_agent_inline_parts(parts, agent_id, |branch| {
                        handle_text_delta(branch, delta)
                    })
                    .into_parts();
                }
                None => {
                    message.parts = handle_text_delta(parts, delta);
                    message.content = branch_text(&message.parts);
                }
            }
        }

        StreamPartEvent::ThinkingMeta {
            source_key,
            text,
            duration_ms,
            include_reasoning_part,
        } => {
            if let Some(ms) = duration_ms {
                message.thinking_ms = *ms;
            }
            if let Some(delta) = text {
                match &mut message.thinking_text {
                    Some(existing) => existing.push_str(delta),
                    None => message.thinking_text = Some(delta.clone()),
                }
            }

            if *include_reasoning_part {
                upsert_reasoning_part(
                    &mut message,
                    source_key.as_deref(),
                    text.as_deref(),
                    *duration_ms,
                );
            }
        }

        StreamPartEvent::ToolStart {
            agent_id,
            tool_call_id,
            tool_name,
            input,
            started_at,
        } => {
            let parts = std::mem::take(&mut message.parts);
            match agent_id {
                Some(agent_id) => {
                    message.parts = route_to_agent_inline_parts(parts, agent_id, |branch| {
                        upsert_tool_part_start(
                            branch,
                            tool_call_id,
                            tool_name,
                            input.clone(),
                            started_at.clone(),
                        )
                    })
                    .into_parts();
                }
                None => {
                    message.parts = upsert_tool_part_start(
                        parts,
                        tool_call_id,
                        tool_name,
                        input.clone(),
                        started_at.clone(),
                    );
                    mirror_tool_start(&mut message.tool_calls, tool_call_id, tool_name, input);
                }
            }
        }

        StreamPartEvent::ToolComplete {
            agent_id,
            tool_call_id,
            success,
            output,
            error,
            completed_at,
            tool_name,
            input,
        } => {
            let parts = std::mem::take(&mut message.parts);
            match agent_id {
                Some(agent_id) => {
                    message.parts = route_to_agent_inline_parts(parts, agent_id, |branch| {
                        upsert_tool_part_complete(
                            branch,
                            tool_call_id,
                            *success,
                            output.clone(),
                            error.clone(),
                            completed_at.as_deref(),
                            tool_name.as_deref(),
                            input.clone(),
                        )
                    })
                    .into_parts();
                }
                None => {
                    message.parts = upsert_tool_part_complete(
                        parts,
                        tool_call_id,
                        *success,
                        output.clone(),
                        error.clone(),
                        completed_at.as_deref(),
                        tool_name.as_deref(),
                        input.clone(),
                    );
                    mirror_tool_complete(
                        &mut message.tool_calls,
                        tool_call_id,
                        *success,
                        output.as_ref(),
                        tool_name.as_deref(),
                    );
                }
            }
        }

        StreamPartEvent::ToolPartialResult { tool_call_id, chunk } => {
            let parts = std::mem::take(&mut message.parts);
            message.parts = append_tool_partial_result(parts, tool_call_id, chunk);
        }

        StreamPartEvent::ToolHitlRequest {
            tool_call_id,
            question,
        } => {
            let parts = std::mem::take(&mut message.parts);
            message.parts = set_pending_question(parts, tool_call_id, question.clone());
        }

        StreamPartEvent::ToolHitlResponse {
            tool_call_id,
            answer_text,
        } => {
            let parts = std::mem::take(&mut message.parts);
            message.parts = apply_hitl_response(parts, tool_call_id, answer_text);
            mirror_hitl_answer(&mut message.tool_calls, tool_call_id, answer_text);
        }

        StreamPartEvent::ParallelAgents {
            agents,
            group_into_single_tree,
        } => {
            let grouped = *group_into_single_tree || message.agents_grouped;
            let parts = std::mem::take(&mut message.parts);
            message.parts = merge_parallel_agents_into_parts(parts, agents, grouped);
            message.agents_grouped = grouped || agents_previously_grouped(&message.parts);
            message.parallel_agents = collect_parallel_agents(&message.parts);
        }

        StreamPartEvent::WorkflowStepStart {
            node_id,
            node_name,
            started_at,
        } => {
            let started_at_ms = started_at
                .as_deref()
                .and_then(parse_timestamp_ms)
                .unwrap_or_else(now_ms);
            append_detail_part(
                &mut message,
                Part::WorkflowStep(WorkflowStepPart {
                    id: create_part_id(),
                    created_at: now_ms(),
                    node_id: node_id.clone(),
                    node_name: node_name.clone(),
                    status: WorkflowStepStatus::Running,
                    started_at_ms: Some(started_at_ms),
                    completed_at_ms: None,
                    duration_ms: None,
                }),
            );
        }

        StreamPartEvent::WorkflowStepComplete {
            node_id,
            status,
            completed_at,
        } => {
            complete_workflow_step(
                &mut message.parts,
                node_id,
                status,
                completed_at.as_deref(),
            );
        }

        StreamPartEvent::TaskListUpdate { items, expanded } => {
            upsert_task_list(&mut message.parts, items, *expanded);
        }

        StreamPartEvent::SkillLoad { skill_name } => {
            append_detail_part(
                &mut message,
                Part::SkillLoad(SkillLoadPart {
                    id: create_part_id(),
                    created_at: now_ms(),
                    skill_name: skill_name.clone(),
                }),
            );
        }

        StreamPartEvent::McpSnapshot { servers } => {
            append_detail_part(
                &mut message,
                Part::McpSnapshot(McpSnapshotPart {
                    id: create_part_id(),
                    created_at: now_ms(),
                    servers: servers.clone(),
                }),
            );
        }

        StreamPartEvent::Compaction { summary } => {
            append_detail_part(
                &mut message,
                Part::Compaction(CompactionPart {
                    id: create_part_id(),
                    created_at: now_ms(),
                    summary: summary.clone(),
                }),
            );
        }
    }

    message
}

/// Concatenation of all top-level text parts, ignoring other part types.
#[must_use]
pub fn message_text(message: &Message) -> String {
    branch_text(&message.parts)
}

/// Closes every streaming tail (top-level and inline) once the upstream
/// orchestrator marks the message settled.
#[must_use]
pub fn finalize_message(mut message: Message) -> Message {
    let parts = std::mem::take(&mut message.parts);
    message.parts = finalize_branch(parts);
    message.content = branch_text(&message.parts);
    message
}

fn finalize_branch(mut parts: Vec<Part>) -> Vec<Part> {
    // Closes every streaming text part, not just the tail, so settlement
    // recovers even from a branch that somehow holds more than one.
    for part in parts.iter_mut() {
        match part {
            Part::Text(text) => text.is_streaming = false,
            Part::Reasoning(reasoning) => reasoning.is_streaming = false,
            Part::Agent(agent_part) => {
                for agent in agent_part.agents.iter_mut() {
                    let branch = std::mem::take(&mut agent.inline_parts);
                    agent.inline_parts = finalize_branch(branch);
                }
            }
            _ => {}
        }
    }

    parts
}

/// Appends a detail part at the end of the top-level branch, closing any
/// streaming text tail first so the streaming part stays last in its branch.
fn append_detail_part(message: &mut Message, part: Part) {
    let parts = std::mem::take(&mut message.parts);
    let mut parts = finalize_streaming_text(parts);
    parts.push(part);
    message.parts = parts;
}

/// Upserts the reasoning part for one thinking source.
///
/// The source-key registry on the message is consulted first; if it is
/// missing or stale (its id no longer resolves, e.g. after the message was
/// rebuilt) it is reconstructed by scanning the parts. New reasoning parts
/// are placed immediately before the first text part: reasoning always
/// precedes visible text.
fn upsert_reasoning_part(
    message: &mut Message,
    source_key: Option<&str>,
    text: Option<&str>,
    duration_ms: Option<i64>,
) {
    let key = source_key.unwrap_or("default").to_string();

    let known = message
        .reasoning_keys
        .get(&key)
        .filter(|id| binary_search_by_id(&message.parts, id).is_ok())
        .cloned();

    let target = match known {
        Some(id) => Some(id),
        None => {
            message.reasoning_keys = rebuild_reasoning_keys(&message.parts);
            message.reasoning_keys.get(&key).cloned()
        }
    };

    if let Some(id) = target {
        if let Ok(index) = binary_search_by_id(&message.parts, &id) {
            if let Part::Reasoning(reasoning) = &mut message.parts[index] {
                if let Some(delta) = text {
                    reasoning.content.push_str(delta);
                }
                if let Some(ms) = duration_ms {
                    reasoning.duration_ms = ms;
                }
            }
        }
        return;
    }

    let first_text = message
        .parts
        .iter()
        .position(|part| matches!(part, Part::Text(_)));
    let id = match first_text {
        Some(0) => create_anchored_part_id(None),
        Some(index) => create_anchored_part_id(Some(message.parts[index - 1].id())),
        None => create_part_id(),
    };

    let part = ReasoningPart {
        id: id.clone(),
        created_at: now_ms(),
        thinking_source_key: source_key.map(str::to_string),
        content: text.unwrap_or_default().to_string(),
        duration_ms: duration_ms.unwrap_or(0),
        is_streaming: true,
    };

    message.reasoning_keys.insert(key, id);
    let parts = std::mem::take(&mut message.parts);
    message.parts = upsert_part(parts, Part::Reasoning(part));
}

fn rebuild_reasoning_keys(parts: &[Part]) -> HashMap<String, PartId> {
    let mut keys = HashMap::new();
    for part in parts {
        if let Part::Reasoning(reasoning) = part {
            let key = reasoning
                .thinking_source_key
                .clone()
                .unwrap_or_else(|| "default".to_string());
            keys.insert(key, reasoning.id.clone());
        }
    }

    keys
}

fn complete_workflow_step(
    parts: &mut [Part],
    node_id: &str,
    status: &str,
    completed_at: Option<&str>,
) {
    let step = parts.iter_mut().find_map(|part| match part {
        Part::WorkflowStep(step) if step.node_id == node_id => Some(step),
        _ => None,
    });

    // A completion for a step that never started is an expected race; drop it.
    let Some(step) = step else {
        return;
    };

    step.status = if status == "success" {
        WorkflowStepStatus::Completed
    } else {
        WorkflowStepStatus::Error
    };

    let completed_ms = completed_at
        .and_then(parse_timestamp_ms)
        .unwrap_or_else(now_ms);
    step.completed_at_ms = Some(completed_ms);
    step.duration_ms = Some(
        step.started_at_ms
            .map(|started| (completed_ms - started).max(0))
            .unwrap_or(0),
    );
}

fn upsert_task_list(
    parts: &mut Vec<Part>,
    items: &[agent_stream::TaskItemUpdate],
    expanded: Option<bool>,
) {
    let normalized: Vec<TaskItem> = items
        .iter()
        .map(|item| TaskItem {
            id: item.id.clone(),
            content: item.content.clone(),
            status: TaskStatus::parse(&item.status),
        })
        .collect();

    let existing = parts.iter_mut().find_map(|part| match part {
        Part::TaskList(list) => Some(list),
        _ => None,
    });

    match existing {
        Some(list) => {
            list.items = normalized;
            if let Some(expanded) = expanded {
                list.expanded = expanded;
            }
        }
        None => {
            *parts = finalize_streaming_text(std::mem::take(parts));
            parts.push(Part::TaskList(TaskListPart {
                id: create_part_id(),
                created_at: now_ms(),
                items: normalized,
                expanded: expanded.unwrap_or(true),
            }));
        }
    }
}

fn mirror_tool_start(
    tool_calls: &mut Vec<MessageToolCall>,
    tool_call_id: &str,
    tool_name: &str,
    input: &Value,
) {
    match tool_calls
        .iter_mut()
        .find(|call| call.tool_call_id == tool_call_id)
    {
        Some(existing) => {
            existing.tool_name = tool_name.to_string();
            if existing.input.is_null() {
                existing.input = input.clone();
            }
        }
        None => tool_calls.push(MessageToolCall {
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.to_string(),
            input: input.clone(),
            completed: false,
            is_error: false,
            output: None,
            hitl_answer: None,
        }),
    }
}

fn mirror_tool_complete(
    tool_calls: &mut Vec<MessageToolCall>,
    tool_call_id: &str,
    success: bool,
    output: Option<&Value>,
    tool_name: Option<&str>,
) {
    let call = match tool_calls
        .iter_mut()
        .position(|call| call.tool_call_id == tool_call_id)
    {
        Some(index) => &mut tool_calls[index],
        None => {
            tool_calls.push(MessageToolCall {
                tool_call_id: tool_call_id.to_string(),
                tool_name: tool_name.unwrap_or_default().to_string(),
                input: Value::Null,
                completed: false,
                is_error: false,
                output: None,
                hitl_answer: None,
            });
            tool_calls.last_mut().expect("record just pushed")
        }
    };

    call.completed = true;
    call.is_error = !success;
    call.output = output.cloned();
}

fn mirror_hitl_answer(tool_calls: &mut Vec<MessageToolCall>, tool_call_id: &str, answer: &str) {
    match tool_calls
        .iter_mut()
        .find(|call| call.tool_call_id == tool_call_id)
    {
        Some(existing) => existing.hitl_answer = Some(answer.to_string()),
        None => tool_calls.push(MessageToolCall {
            tool_call_id: tool_call_id.to_string(),
            tool_name: SYNTHESIZED_HITL_TOOL_NAME.to_string(),
            input: Value::Null,
            completed: false,
            is_error: false,
            output: None,
            hitl_answer: Some(answer.to_string()),
        }),
    }
}
