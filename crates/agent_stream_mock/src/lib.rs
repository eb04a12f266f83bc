//! Deterministic mock implementation of the shared `agent_stream` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing of the reconciliation
//! engine.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use agent_stream::{
    AgentSnapshot, CancelSignal, EventSource, HitlQuestion, MessageScopedEvent, SourceProfile,
    StreamPartEvent, TaskItemUpdate,
};
use serde_json::json;

/// Stable source identifier used for explicit startup selection.
pub const MOCK_SOURCE_ID: &str = "mock";

/// Message key all default-script events are attributed to.
pub const MOCK_MESSAGE_KEY: &str = "mock-msg-1";

/// Deterministic scripted event source used by engine tests and local runs.
#[derive(Debug)]
pub struct ScriptedSource {
    script: Vec<MessageScopedEvent>,
    event_delay: Duration,
}

impl ScriptedSource {
    /// Creates a source that replays the given events with no delay.
    #[must_use]
    pub fn scripted(script: Vec<MessageScopedEvent>) -> Self {
        Self {
            script,
            event_delay: Duration::ZERO,
        }
    }

    /// Creates a source that replays events with a fixed pause between them,
    /// for watching reconciliation behave under streaming pacing.
    #[must_use]
    pub fn with_delay(script: Vec<MessageScopedEvent>, event_delay: Duration) -> Self {
        Self {
            script,
            event_delay,
        }
    }

    /// Wraps bare events with the default message key.
    #[must_use]
    pub fn for_message(events: Vec<StreamPartEvent>) -> Self {
        Self::scripted(
            events
                .into_iter()
                .map(|event| MessageScopedEvent {
                    message_key: MOCK_MESSAGE_KEY.to_string(),
                    event,
                })
                .collect(),
        )
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::for_message(default_script())
    }
}

impl EventSource for ScriptedSource {
    fn profile(&self) -> SourceProfile {
        SourceProfile {
            source_id: MOCK_SOURCE_ID.to_string(),
            runtime_id: "mock-runtime".to_string(),
        }
    }

    fn drive(
        &self,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(MessageScopedEvent),
    ) -> Result<(), String> {
        for scoped in &self.script {
            if cancel.load(Ordering::SeqCst) {
                return Ok(());
            }

            emit(scoped.clone());

            if !self.event_delay.is_zero() {
                thread::sleep(self.event_delay);
            }
        }

        Ok(())
    }
}

/// The default conversation script: assistant text interrupted by a tool
/// call, a HITL question exchange, two parallel agents with inline activity,
/// and a task-list update. Covers every merge family the engine implements.
#[must_use]
pub fn default_script() -> Vec<StreamPartEvent> {
    vec![
        StreamPartEvent::ThinkingMeta {
            source_key: None,
            text: Some("Planning the change.".to_string()),
            duration_ms: Some(320),
            include_reasoning_part: true,
        },
        StreamPartEvent::TextDelta {
            agent_id: None,
            delta: "Let me check the file".to_string(),
        },
        StreamPartEvent::ToolStart {
            agent_id: None,
            tool_call_id: "mock-tc-1".to_string(),
            tool_name: "read".to_string(),
            input: json!({ "path": "src/main.rs" }),
            started_at: Some("2026-08-29T10:00:00Z".to_string()),
        },
        StreamPartEvent::ToolPartialResult {
            tool_call_id: "mock-tc-1".to_string(),
            chunk: "fn main() {\n".to_string(),
        },
        StreamPartEvent::ToolComplete {
            agent_id: None,
            tool_call_id: "mock-tc-1".to_string(),
            success: true,
            output: Some(json!({ "lines": 42 })),
            error: None,
            completed_at: Some("2026-08-29T10:00:01Z".to_string()),
            tool_name: None,
            input: None,
        },
        StreamPartEvent::TextDelta {
            agent_id: None,
            delta: " before editing.".to_string(),
        },
        StreamPartEvent::ToolStart {
            agent_id: None,
            tool_call_id: "mock-tc-2".to_string(),
            tool_name: "AskUserQuestion".to_string(),
            input: json!({ "question": "Apply the edit?" }),
            started_at: None,
        },
        StreamPartEvent::ToolHitlRequest {
            tool_call_id: "mock-tc-2".to_string(),
            question: HitlQuestion::with_options(
                "Apply the edit?",
                vec!["yes".to_string(), "no".to_string()],
            ),
        },
        StreamPartEvent::ToolHitlResponse {
            tool_call_id: "mock-tc-2".to_string(),
            answer_text: "yes".to_string(),
        },
        StreamPartEvent::ToolComplete {
            agent_id: None,
            tool_call_id: "mock-tc-2".to_string(),
            success: true,
            output: None,
            error: None,
            completed_at: None,
            tool_name: None,
            input: None,
        },
        StreamPartEvent::ToolStart {
            agent_id: None,
            tool_call_id: "mock-tc-3".to_string(),
            tool_name: "Task".to_string(),
            input: json!({ "description": "parallel investigation" }),
            started_at: None,
        },
        StreamPartEvent::ParallelAgents {
            agents: vec![
                mock_agent("mock-agent-a", "explorer", "map the module graph", "running"),
                mock_agent("mock-agent-b", "tester", "run the unit suite", "running"),
            ],
            group_into_single_tree: true,
        },
        StreamPartEvent::TextDelta {
            agent_id: Some("mock-agent-a".to_string()),
            delta: "Scanning modules.".to_string(),
        },
        StreamPartEvent::ToolStart {
            agent_id: Some("mock-agent-b".to_string()),
            tool_call_id: "mock-tc-b1".to_string(),
            tool_name: "bash".to_string(),
            input: json!({ "command": "cargo test" }),
            started_at: None,
        },
        StreamPartEvent::ToolComplete {
            agent_id: Some("mock-agent-b".to_string()),
            tool_call_id: "mock-tc-b1".to_string(),
            success: true,
            output: Some(json!("ok")),
            error: None,
            completed_at: None,
            tool_name: None,
            input: None,
        },
        StreamPartEvent::ParallelAgents {
            agents: vec![
                mock_agent("mock-agent-a", "explorer", "map the module graph", "completed"),
                mock_agent("mock-agent-b", "tester", "run the unit suite", "completed"),
            ],
            group_into_single_tree: true,
        },
        StreamPartEvent::ToolComplete {
            agent_id: None,
            tool_call_id: "mock-tc-3".to_string(),
            success: true,
            output: Some(json!({ "agents": 2 })),
            error: None,
            completed_at: None,
            tool_name: None,
            input: None,
        },
        StreamPartEvent::TaskListUpdate {
            items: vec![
                TaskItemUpdate {
                    id: "t1".to_string(),
                    content: "read the file".to_string(),
                    status: "done".to_string(),
                },
                TaskItemUpdate {
                    id: "t2".to_string(),
                    content: "apply the edit".to_string(),
                    status: "in_progress".to_string(),
                },
            ],
            expanded: Some(true),
        },
        StreamPartEvent::TextDelta {
            agent_id: None,
            delta: "\n\nAll checks passed.".to_string(),
        },
    ]
}

fn mock_agent(id: &str, name: &str, task: &str, status: &str) -> AgentSnapshot {
    AgentSnapshot {
        id: id.to_string(),
        name: name.to_string(),
        task: task.to_string(),
        status: status.to_string(),
        background: false,
        started_at: Some("2026-08-29T10:00:02Z".to_string()),
        duration_ms: None,
        result: if status == "completed" {
            Some(format!("{task}: done"))
        } else {
            None
        },
        error: None,
        task_tool_call_id: Some("mock-tc-3".to_string()),
    }
}
