use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use agent_stream::{AgentSnapshot, EventSource, StreamPartEvent, TaskItemUpdate};
use agent_stream_mock::{ScriptedSource, MOCK_MESSAGE_KEY};
use pretty_assertions::assert_eq;
use serde_json::json;
use tandem::{
    apply_stream_part_event, finalize_message, message_text, AgentStatus, Message, Part,
    TaskStatus, ToolState,
};

fn apply_all(events: &[StreamPartEvent]) -> Message {
    events.iter().fold(Message::new(), apply_stream_part_event)
}

fn assert_sorted(parts: &[Part]) {
    for pair in parts.windows(2) {
        assert!(
            pair[0].id() < pair[1].id(),
            "parts out of order: {:?} >= {:?}",
            pair[0].id(),
            pair[1].id()
        );
    }
}

#[test]
fn default_mock_script_reconciles_into_a_complete_transcript() {
    let source = ScriptedSource::default();
    let cancel = Arc::new(AtomicBool::new(false));

    let mut message = Message::new();
    source
        .drive(cancel, &mut |scoped| {
            assert_eq!(scoped.message_key, MOCK_MESSAGE_KEY);
            let current = std::mem::take(&mut message);
            message = apply_stream_part_event(current, &scoped.event);
        })
        .expect("mock drive should succeed");

    let message = finalize_message(message);
    assert_sorted(&message.parts);

    // One reasoning part, ahead of all visible text.
    let reasoning_index = message
        .parts
        .iter()
        .position(|part| matches!(part, Part::Reasoning(_)))
        .expect("reasoning part");
    let first_text_index = message
        .parts
        .iter()
        .position(|part| matches!(part, Part::Text(_)))
        .expect("text part");
    assert!(reasoning_index < first_text_index);

    // The sentence severed by the read tool is whole again.
    assert_eq!(
        message_text(&message),
        "Let me check the file before editing.\n\nAll checks passed."
    );
    assert_eq!(message.content, message_text(&message));

    // All three top-level tools are terminal, and the HITL exchange carries
    // the answer in its completed output.
    let tools: Vec<_> = message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Tool(tool) => Some(tool),
            _ => None,
        })
        .collect();
    assert_eq!(tools.len(), 3);
    assert!(tools.iter().all(|tool| tool.state.is_terminal()));

    let hitl = tools
        .iter()
        .find(|tool| tool.tool_call_id == "mock-tc-2")
        .expect("HITL tool part");
    assert!(hitl.pending_question.is_none());
    assert_eq!(
        hitl.hitl_response.as_ref().map(|r| r.answer_text.as_str()),
        Some("yes")
    );
    match &hitl.state {
        ToolState::Completed { output, .. } => {
            assert_eq!(output["answerText"], json!("yes"));
        }
        other => panic!("unexpected HITL state: {other:?}"),
    }

    // Both agents live in one grouped tree and finished with results.
    let agent_parts: Vec<_> = message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Agent(agent_part) => Some(agent_part),
            _ => None,
        })
        .collect();
    assert_eq!(agent_parts.len(), 1);
    assert!(message.agents_grouped);
    let agents = &agent_parts[0].agents;
    assert_eq!(agents.len(), 2);
    assert!(agents
        .iter()
        .all(|agent| agent.status == AgentStatus::Completed && agent.result.is_some()));

    // Inline activity landed in the right branches and was finalized.
    let explorer = agents.iter().find(|agent| agent.id == "mock-agent-a").expect("explorer");
    assert!(matches!(
        explorer.inline_parts.as_slice(),
        [Part::Text(text)] if text.content == "Scanning modules." && !text.is_streaming
    ));
    let tester = agents.iter().find(|agent| agent.id == "mock-agent-b").expect("tester");
    assert!(matches!(
        tester.inline_parts.as_slice(),
        [Part::Tool(tool)] if tool.state.is_terminal()
    ));

    // Legacy mirrors agree with the part tree.
    assert_eq!(message.tool_calls.len(), 3);
    assert!(message.tool_calls.iter().all(|call| call.completed));
    assert_eq!(message.parallel_agents.len(), 2);
    assert_eq!(message.thinking_ms, 320);

    // Task list reflects normalized statuses.
    let task_list = message
        .parts
        .iter()
        .find_map(|part| match part {
            Part::TaskList(list) => Some(list),
            _ => None,
        })
        .expect("task list part");
    assert_eq!(task_list.items[0].status, TaskStatus::Completed);
    assert_eq!(task_list.items[1].status, TaskStatus::InProgress);
}

#[test]
fn replaying_the_same_events_yields_an_identical_tree_shape() {
    let script = agent_stream_mock::default_script();

    let first = apply_all(&script);
    let second = apply_all(&script);

    // Ids differ between runs; shapes and payloads must not.
    let shape = |message: &Message| -> Vec<String> {
        message
            .parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => format!("text:{}", text.content),
                Part::Reasoning(r) => format!("reasoning:{}", r.content),
                Part::Tool(tool) => format!("tool:{}:{}", tool.tool_call_id, tool.state.rank()),
                Part::Agent(agent_part) => format!("agents:{}", agent_part.agents.len()),
                Part::TaskList(list) => format!("tasks:{}", list.items.len()),
                Part::WorkflowStep(step) => format!("step:{}", step.node_id),
                Part::SkillLoad(skill) => format!("skill:{}", skill.skill_name),
                Part::McpSnapshot(_) => "mcp".to_string(),
                Part::Compaction(_) => "compaction".to_string(),
            })
            .collect()
    };

    assert_eq!(shape(&first), shape(&second));
    assert_eq!(first.content, second.content);
    assert_eq!(first.tool_calls, second.tool_calls);
}

#[test]
fn tool_events_arriving_before_their_start_still_settle() {
    let message = apply_all(&[
        StreamPartEvent::ToolPartialResult {
            tool_call_id: "tc-early".to_string(),
            chunk: "dropped, no part yet".to_string(),
        },
        StreamPartEvent::ToolComplete {
            agent_id: None,
            tool_call_id: "tc-early".to_string(),
            success: true,
            output: Some(json!("late result")),
            error: None,
            completed_at: None,
            tool_name: Some("bash".to_string()),
            input: Some(json!({ "command": "true" })),
        },
        // A start after the terminal state must not reopen the part.
        StreamPartEvent::ToolStart {
            agent_id: None,
            tool_call_id: "tc-early".to_string(),
            tool_name: "bash".to_string(),
            input: json!({ "command": "true" }),
            started_at: None,
        },
    ]);

    assert_eq!(message.parts.len(), 1);
    match &message.parts[0] {
        Part::Tool(tool) => {
            assert_eq!(tool.tool_name, "bash");
            assert!(tool.state.is_terminal());
            assert!(tool.partial_output.is_none());
        }
        other => panic!("unexpected part: {other:?}"),
    }
}

#[test]
fn workflow_and_auxiliary_parts_keep_arrival_order() {
    let message = apply_all(&[
        StreamPartEvent::SkillLoad {
            skill_name: "review".to_string(),
        },
        StreamPartEvent::WorkflowStepStart {
            node_id: "plan".to_string(),
            node_name: "Plan".to_string(),
            started_at: None,
        },
        StreamPartEvent::McpSnapshot {
            servers: json!([{ "name": "files" }]),
        },
        StreamPartEvent::WorkflowStepComplete {
            node_id: "plan".to_string(),
            status: "success".to_string(),
            completed_at: None,
        },
        StreamPartEvent::Compaction {
            summary: "Older turns folded away.".to_string(),
        },
    ]);

    assert_sorted(&message.parts);
    assert_eq!(message.parts.len(), 4);
    assert!(matches!(&message.parts[0], Part::SkillLoad(_)));
    assert!(matches!(&message.parts[1], Part::WorkflowStep(step)
        if step.node_id == "plan" && step.duration_ms.is_some()));
    assert!(matches!(&message.parts[2], Part::McpSnapshot(_)));
    assert!(matches!(&message.parts[3], Part::Compaction(_)));
}

fn assert_streaming_tail_invariant(parts: &[Part]) {
    let streaming: Vec<usize> = parts
        .iter()
        .enumerate()
        .filter_map(|(index, part)| match part {
            Part::Text(text) if text.is_streaming => Some(index),
            _ => None,
        })
        .collect();

    assert!(
        streaming.len() <= 1,
        "multiple streaming text parts at {streaming:?}"
    );
    if let Some(&index) = streaming.first() {
        assert_eq!(index, parts.len() - 1, "streaming text part is not last");
    }

    for part in parts {
        if let Part::Agent(agent_part) = part {
            for agent in &agent_part.agents {
                assert_streaming_tail_invariant(&agent.inline_parts);
            }
        }
    }
}

fn assert_fully_finalized(parts: &[Part]) {
    for part in parts {
        match part {
            Part::Text(text) => assert!(!text.is_streaming, "{} still streaming", text.content),
            Part::Reasoning(reasoning) => assert!(!reasoning.is_streaming),
            Part::Agent(agent_part) => {
                for agent in &agent_part.agents {
                    assert_fully_finalized(&agent.inline_parts);
                }
            }
            _ => {}
        }
    }
}

#[test]
fn part_appending_events_keep_one_streaming_tail() {
    let text = |delta: &str| StreamPartEvent::TextDelta {
        agent_id: None,
        delta: delta.to_string(),
    };
    let helper = AgentSnapshot {
        id: "helper".to_string(),
        name: "helper".to_string(),
        task: "assist".to_string(),
        status: "running".to_string(),
        background: false,
        started_at: None,
        duration_ms: None,
        result: None,
        error: None,
        task_tool_call_id: None,
    };

    let events = [
        text("Working through the plan"),
        StreamPartEvent::SkillLoad {
            skill_name: "review".to_string(),
        },
        text("\n\nStep one"),
        StreamPartEvent::WorkflowStepStart {
            node_id: "n1".to_string(),
            node_name: "plan".to_string(),
            started_at: None,
        },
        text("continues"),
        StreamPartEvent::TaskListUpdate {
            items: vec![TaskItemUpdate {
                id: "t1".to_string(),
                content: "first step".to_string(),
                status: "in_progress".to_string(),
            }],
            expanded: None,
        },
        text("and more"),
        StreamPartEvent::McpSnapshot {
            servers: json!([{ "name": "files" }]),
        },
        StreamPartEvent::ParallelAgents {
            agents: vec![helper],
            group_into_single_tree: false,
        },
        text("closing out"),
        StreamPartEvent::Compaction {
            summary: "earlier turns folded".to_string(),
        },
    ];

    let mut message = Message::new();
    for event in &events {
        message = apply_stream_part_event(message, event);
        assert_sorted(&message.parts);
        assert_streaming_tail_invariant(&message.parts);
    }

    let message = finalize_message(message);
    assert_fully_finalized(&message.parts);
}

#[test]
fn message_round_trips_through_serde() {
    let message = apply_all(&agent_stream_mock::default_script());
    let message = finalize_message(message);

    let encoded = serde_json::to_string(&message).expect("message should serialize");
    let decoded: Message = serde_json::from_str(&encoded).expect("message should deserialize");

    assert_eq!(decoded.parts, message.parts);
    assert_eq!(decoded.content, message.content);
    assert_eq!(decoded.tool_calls, message.tool_calls);
    assert_eq!(decoded.agents_grouped, message.agents_grouped);
}
