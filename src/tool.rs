//! Tool part lifecycle merges for one part branch.
//!
//! Tool events may arrive duplicated, late, or out of order relative to the
//! parts they target. Every merge here is idempotent and forward-only:
//! terminal states absorb repeats, and a part is located by `tool_call_id`
//! so repeated events land on the same id at the same position.

use agent_stream::HitlQuestion;
use serde_json::{Map, Value};

use crate::clock::{now_ms, parse_timestamp_ms};
use crate::part::{HitlResponse, Part, ToolPart, ToolState};
use crate::part_id::create_part_id;
use crate::text::finalize_streaming_text;

/// Tool names that represent a human-in-the-loop question exchange.
pub const HITL_TOOL_NAMES: [&str; 3] = ["AskUserQuestion", "question", "ask_user"];

/// Placeholder name for tool parts synthesized from a HITL request that
/// arrived before its tool-start event.
pub const SYNTHESIZED_HITL_TOOL_NAME: &str = "AskUserQuestion";

#[must_use]
pub fn is_hitl_tool(tool_name: &str) -> bool {
    HITL_TOOL_NAMES.contains(&tool_name)
}

fn find_tool_part_index(parts: &[Part], tool_call_id: &str) -> Option<usize> {
    parts.iter().position(|part| {
        matches!(part, Part::Tool(tool) if tool.tool_call_id == tool_call_id)
    })
}

fn new_tool_part(tool_call_id: &str, tool_name: &str, input: Value, state: ToolState) -> ToolPart {
    ToolPart {
        id: create_part_id(),
        created_at: now_ms(),
        tool_call_id: tool_call_id.to_string(),
        tool_name: tool_name.to_string(),
        input,
        partial_output: None,
        state,
        pending_question: None,
        hitl_response: None,
    }
}

/// Creates or updates a tool part to `Running`.
///
/// Finalizes any streaming text in the branch first, so tool activity never
/// interleaves inside open text. Duplicate starts are idempotent: an already
/// recorded `started_at` wins, and a terminal part is left untouched.
#[must_use]
pub fn upsert_tool_part_start(
    parts: Vec<Part>,
    tool_call_id: &str,
    tool_name: &str,
    input: Value,
    started_at: Option<String>,
) -> Vec<Part> {
    let mut parts = finalize_streaming_text(parts);

    let Some(index) = find_tool_part_index(&parts, tool_call_id) else {
        parts.push(Part::Tool(new_tool_part(
            tool_call_id,
            tool_name,
            input,
            ToolState::Running { started_at },
        )));
        return parts;
    };

    if let Part::Tool(tool) = &mut parts[index] {
        if tool.state.is_terminal() {
            return parts;
        }

        let preserved = match &tool.state {
            ToolState::Running {
                started_at: Some(existing),
            } => Some(existing.clone()),
            _ => None,
        };

        tool.tool_name = tool_name.to_string();
        if !input.is_null() {
            tool.input = input;
        }
        tool.state = ToolState::Running {
            started_at: preserved.or(started_at),
        };
    }

    parts
}

/// Transitions a tool part to `Completed` or `Error`.
///
/// `duration_ms` comes from the stored `started_at`; an unparsable timestamp
/// yields 0, never an error. Late-arriving `tool_name`/`input` only fill
/// gaps. For HITL-shaped tools an accumulated answer is merged into the
/// output. When no start was ever observed a terminal part is synthesized.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn upsert_tool_part_complete(
    mut parts: Vec<Part>,
    tool_call_id: &str,
    success: bool,
    output: Option<Value>,
    error: Option<String>,
    completed_at: Option<&str>,
    tool_name: Option<&str>,
    input: Option<Value>,
) -> Vec<Part> {
    let Some(index) = find_tool_part_index(&parts, tool_call_id) else {
        let mut parts = finalize_streaming_text(parts);
        let name = tool_name.unwrap_or_default();
        let state = terminal_state(success, output, error, 0);
        let mut tool = new_tool_part(tool_call_id, name, input.unwrap_or(Value::Null), state);
        merge_hitl_answer_into_output(&mut tool);
        parts.push(Part::Tool(tool));
        return parts;
    };

    if let Part::Tool(tool) = &mut parts[index] {
        if tool.state.is_terminal() {
            return parts;
        }

        if tool.tool_name.is_empty() {
            if let Some(name) = tool_name {
                tool.tool_name = name.to_string();
            }
        }
        if tool.input.is_null() {
            if let Some(late_input) = input {
                tool.input = late_input;
            }
        }

        let started_ms = match &tool.state {
            ToolState::Running {
                started_at: Some(raw),
            } => parse_timestamp_ms(raw),
            _ => None,
        };
        let completed_ms = completed_at.and_then(parse_timestamp_ms).unwrap_or_else(now_ms);
        let duration_ms = started_ms
            .map(|started| (completed_ms - started).max(0))
            .unwrap_or(0);

        tool.state = terminal_state(success, output, error, duration_ms);
        merge_hitl_answer_into_output(tool);
    }

    parts
}

fn terminal_state(
    success: bool,
    output: Option<Value>,
    error: Option<String>,
    duration_ms: i64,
) -> ToolState {
    if success {
        ToolState::Completed {
            output: output.unwrap_or(Value::Null),
            duration_ms,
        }
    } else {
        ToolState::Error {
            error: error.unwrap_or_else(|| "tool failed".to_string()),
            output,
        }
    }
}

/// Folds a recorded HITL answer into the completed output of a HITL-shaped
/// tool, so renderers see the user's decision alongside the result.
fn merge_hitl_answer_into_output(tool: &mut ToolPart) {
    if !is_hitl_tool(&tool.tool_name) {
        return;
    }
    let Some(response) = &tool.hitl_response else {
        return;
    };
    let ToolState::Completed { output, .. } = &mut tool.state else {
        return;
    };

    let answer = Value::String(response.answer_text.clone());
    match output {
        Value::Object(map) => {
            map.insert("answerText".to_string(), answer);
        }
        Value::Null => {
            let mut map = Map::new();
            map.insert("answerText".to_string(), answer);
            *output = Value::Object(map);
        }
        other => {
            let mut map = Map::new();
            map.insert("output".to_string(), other.clone());
            map.insert("answerText".to_string(), answer);
            *other = Value::Object(map);
        }
    }
}

/// Appends a partial output chunk to a running tool part. No state
/// transition; unknown targets are dropped.
#[must_use]
pub fn append_tool_partial_result(mut parts: Vec<Part>, tool_call_id: &str, chunk: &str) -> Vec<Part> {
    if let Some(index) = find_tool_part_index(&parts, tool_call_id) {
        if let Part::Tool(tool) = &mut parts[index] {
            tool.partial_output
                .get_or_insert_with(String::new)
                .push_str(chunk);
        }
    }

    parts
}

/// Records a pending HITL question on the matching tool part, synthesizing
/// one when the question outruns its tool-start event. A new question clears
/// any previous response; the two are mutually exclusive.
#[must_use]
pub fn set_pending_question(
    mut parts: Vec<Part>,
    tool_call_id: &str,
    question: HitlQuestion,
) -> Vec<Part> {
    let Some(index) = find_tool_part_index(&parts, tool_call_id) else {
        let mut parts = finalize_streaming_text(parts);
        let mut tool = new_tool_part(
            tool_call_id,
            SYNTHESIZED_HITL_TOOL_NAME,
            Value::Null,
            ToolState::Running { started_at: None },
        );
        tool.pending_question = Some(question);
        parts.push(Part::Tool(tool));
        return parts;
    };

    if let Part::Tool(tool) = &mut parts[index] {
        tool.pending_question = Some(question);
        tool.hitl_response = None;
    }

    parts
}

/// Resolves a pending HITL question in place: clears the question and sets
/// the response on the same part id at the same position. Unknown targets
/// are dropped.
#[must_use]
pub fn apply_hitl_response(mut parts: Vec<Part>, tool_call_id: &str, answer_text: &str) -> Vec<Part> {
    if let Some(index) = find_tool_part_index(&parts, tool_call_id) {
        if let Part::Tool(tool) = &mut parts[index] {
            tool.pending_question = None;
            tool.hitl_response = Some(HitlResponse {
                answer_text: answer_text.to_string(),
            });
        }
    }

    parts
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::text::handle_text_delta;

    fn tool_part_at(parts: &[Part], index: usize) -> &ToolPart {
        match &parts[index] {
            Part::Tool(tool) => tool,
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[test]
    fn tool_start_finalizes_streaming_text_in_branch() {
        let parts = handle_text_delta(Vec::new(), "Looking at the repo");
        let parts = upsert_tool_part_start(parts, "tc1", "read", json!({"path": "a.rs"}), None);

        assert_eq!(parts.len(), 2);
        assert_matches!(&parts[0], Part::Text(text) if !text.is_streaming);
        let tool = tool_part_at(&parts, 1);
        assert_eq!(tool.tool_call_id, "tc1");
        assert_matches!(tool.state, ToolState::Running { .. });
    }

    #[test]
    fn duplicate_start_preserves_original_started_at() {
        let parts = upsert_tool_part_start(
            Vec::new(),
            "tc1",
            "bash",
            json!({"command": "ls"}),
            Some("2026-08-29T10:00:00Z".to_string()),
        );
        let first_id = parts[0].id().clone();

        let parts = upsert_tool_part_start(
            parts,
            "tc1",
            "bash",
            json!({"command": "ls"}),
            Some("2026-08-29T10:00:05Z".to_string()),
        );

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].id(), &first_id);
        let tool = tool_part_at(&parts, 0);
        assert_matches!(
            &tool.state,
            ToolState::Running { started_at: Some(at) } if at == "2026-08-29T10:00:00Z"
        );
    }

    #[test]
    fn complete_computes_duration_from_stored_start() {
        let parts = upsert_tool_part_start(
            Vec::new(),
            "tc1",
            "bash",
            json!({"command": "ls"}),
            Some("2026-08-29T10:00:00Z".to_string()),
        );

        let parts = upsert_tool_part_complete(
            parts,
            "tc1",
            true,
            Some(json!("file listing")),
            None,
            Some("2026-08-29T10:00:02.500Z"),
            None,
            None,
        );

        let tool = tool_part_at(&parts, 0);
        assert_matches!(
            &tool.state,
            ToolState::Completed { output, duration_ms }
                if output == &json!("file listing") && *duration_ms == 2_500
        );
    }

    #[test]
    fn unparsable_start_timestamp_degrades_duration_to_zero() {
        let parts = upsert_tool_part_start(
            Vec::new(),
            "tc1",
            "bash",
            Value::Null,
            Some("whenever".to_string()),
        );

        let parts = upsert_tool_part_complete(
            parts,
            "tc1",
            true,
            None,
            None,
            Some("2026-08-29T10:00:02Z"),
            None,
            None,
        );

        let tool = tool_part_at(&parts, 0);
        assert_matches!(tool.state, ToolState::Completed { duration_ms: 0, .. });
    }

    #[test]
    fn completing_twice_is_idempotent() {
        let parts = upsert_tool_part_start(Vec::new(), "tc1", "bash", Value::Null, None);
        let once = upsert_tool_part_complete(
            parts,
            "tc1",
            true,
            Some(json!({"lines": 3})),
            None,
            None,
            None,
            None,
        );
        let twice = upsert_tool_part_complete(
            once.clone(),
            "tc1",
            true,
            Some(json!({"lines": 3})),
            None,
            None,
            None,
            None,
        );

        assert_eq!(once, twice);
    }

    #[test]
    fn failed_completion_records_error_state() {
        let parts = upsert_tool_part_start(Vec::new(), "tc1", "read", Value::Null, None);
        let parts = upsert_tool_part_complete(
            parts,
            "tc1",
            false,
            Some(json!("partial bytes")),
            Some("missing file".to_string()),
            None,
            None,
            None,
        );

        let tool = tool_part_at(&parts, 0);
        assert_matches!(
            &tool.state,
            ToolState::Error { error, output: Some(output) }
                if error == "missing file" && output == &json!("partial bytes")
        );
    }

    #[test]
    fn synthesized_terminal_part_closes_open_streaming_text() {
        let parts = handle_text_delta(Vec::new(), "starting work");
        let parts =
            upsert_tool_part_complete(parts, "tc-late", true, None, None, None, None, None);

        assert_matches!(&parts[0], Part::Text(text) if !text.is_streaming);
        assert_matches!(&parts[1], Part::Tool(tool) if tool.state.is_terminal());
    }

    #[test]
    fn synthesized_question_part_closes_open_streaming_text() {
        let parts = handle_text_delta(Vec::new(), "need a decision");
        let parts = set_pending_question(parts, "tc-q", HitlQuestion::new("Proceed?"));

        assert_matches!(&parts[0], Part::Text(text) if !text.is_streaming);
        assert_matches!(&parts[1], Part::Tool(tool) if tool.pending_question.is_some());
    }

    #[test]
    fn complete_without_start_synthesizes_a_terminal_part() {
        let parts = upsert_tool_part_complete(
            Vec::new(),
            "tc-late",
            true,
            Some(json!("done")),
            None,
            None,
            Some("write"),
            Some(json!({"path": "b.rs"})),
        );

        assert_eq!(parts.len(), 1);
        let tool = tool_part_at(&parts, 0);
        assert_eq!(tool.tool_name, "write");
        assert_eq!(tool.input, json!({"path": "b.rs"}));
        assert_matches!(tool.state, ToolState::Completed { duration_ms: 0, .. });
    }

    #[test]
    fn late_name_and_input_fill_gaps_without_clobbering() {
        let parts = upsert_tool_part_start(Vec::new(), "tc1", "bash", json!({"command": "ls"}), None);
        let parts = upsert_tool_part_complete(
            parts,
            "tc1",
            true,
            None,
            None,
            None,
            Some("renamed"),
            Some(json!({"command": "pwd"})),
        );

        let tool = tool_part_at(&parts, 0);
        assert_eq!(tool.tool_name, "bash");
        assert_eq!(tool.input, json!({"command": "ls"}));
    }

    #[test]
    fn partial_results_accumulate_without_transitioning() {
        let parts = upsert_tool_part_start(Vec::new(), "tc1", "bash", Value::Null, None);
        let parts = append_tool_partial_result(parts, "tc1", "line one\n");
        let parts = append_tool_partial_result(parts, "tc1", "line two\n");
        let parts = append_tool_partial_result(parts, "tc-unknown", "dropped");

        let tool = tool_part_at(&parts, 0);
        assert_eq!(tool.partial_output.as_deref(), Some("line one\nline two\n"));
        assert_matches!(tool.state, ToolState::Running { .. });
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn hitl_request_synthesizes_question_part_when_start_is_late() {
        let parts = set_pending_question(
            Vec::new(),
            "tc-q",
            HitlQuestion::new("Overwrite the file?"),
        );

        assert_eq!(parts.len(), 1);
        let tool = tool_part_at(&parts, 0);
        assert_eq!(tool.tool_name, SYNTHESIZED_HITL_TOOL_NAME);
        assert_matches!(tool.state, ToolState::Running { .. });
        assert!(tool.pending_question.is_some());
        assert!(tool.hitl_response.is_none());
    }

    #[test]
    fn hitl_response_resolves_question_in_place() {
        let parts = set_pending_question(Vec::new(), "tc-q", HitlQuestion::new("Proceed?"));
        let part_id = parts[0].id().clone();

        let parts = apply_hitl_response(parts, "tc-q", "Yes, proceed");

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].id(), &part_id);
        let tool = tool_part_at(&parts, 0);
        assert!(tool.pending_question.is_none());
        assert_eq!(
            tool.hitl_response.as_ref().map(|r| r.answer_text.as_str()),
            Some("Yes, proceed")
        );
    }

    #[test]
    fn hitl_answer_is_folded_into_completed_output() {
        let parts = set_pending_question(Vec::new(), "tc-q", HitlQuestion::new("Pick one"));
        let parts = apply_hitl_response(parts, "tc-q", "option-b");
        let parts = upsert_tool_part_complete(
            parts,
            "tc-q",
            true,
            Some(json!({"selected": true})),
            None,
            None,
            None,
            None,
        );

        let tool = tool_part_at(&parts, 0);
        assert_matches!(
            &tool.state,
            ToolState::Completed { output, .. }
                if output == &json!({"selected": true, "answerText": "option-b"})
        );
    }

    #[test]
    fn non_hitl_tools_keep_their_output_untouched() {
        let parts = upsert_tool_part_start(Vec::new(), "tc1", "bash", Value::Null, None);
        let parts = apply_hitl_response(parts, "tc1", "stray answer");
        let parts = upsert_tool_part_complete(
            parts,
            "tc1",
            true,
            Some(json!("raw output")),
            None,
            None,
            None,
            None,
        );

        let tool = tool_part_at(&parts, 0);
        assert_matches!(
            &tool.state,
            ToolState::Completed { output, .. } if output == &json!("raw output")
        );
    }

    #[test]
    fn terminal_state_never_moves_backward_to_running() {
        let parts = upsert_tool_part_start(Vec::new(), "tc1", "bash", Value::Null, None);
        let parts = upsert_tool_part_complete(parts, "tc1", true, None, None, None, None, None);

        let parts = upsert_tool_part_start(parts, "tc1", "bash", Value::Null, None);

        let tool = tool_part_at(&parts, 0);
        assert!(tool.state.is_terminal());
    }
}
