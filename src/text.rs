//! Streaming text merge rules for one part branch.
//!
//! A branch is either the top-level part array or one agent's `inline_parts`;
//! the same rules apply to both. Finalizing the streaming tail is an explicit
//! step owned by the tool-start handler, which is what produces the natural
//! "text → tool → text" splitting.

use crate::clock::now_ms;
use crate::part::{Part, TextPart};
use crate::part_id::create_part_id;
use crate::store::find_last_part_index;

pub(crate) const PARAGRAPH_BREAK: &str = "\n\n";

/// Applies one text delta to a branch.
///
/// Appends to a streaming tail when one exists. A finalized trailing text
/// part is merged into instead when neither side carries a paragraph break,
/// which repairs a sentence artificially severed by a tool boundary.
/// Otherwise a new streaming part starts.
#[must_use]
pub fn handle_text_delta(mut parts: Vec<Part>, delta: &str) -> Vec<Part> {
    if let Some(Part::Text(last)) = parts.last_mut() {
        if last.is_streaming {
            last.content.push_str(delta);
            return parts;
        }

        if !delta.starts_with(PARAGRAPH_BREAK) && !last.content.ends_with(PARAGRAPH_BREAK) {
            last.content.push_str(delta);
            last.is_streaming = true;
            return parts;
        }
    }

    parts.push(Part::Text(TextPart {
        id: create_part_id(),
        created_at: now_ms(),
        content: delta.to_string(),
        is_streaming: true,
    }));

    parts
}

/// Closes the streaming text tail of a branch, if any.
#[must_use]
pub fn finalize_streaming_text(mut parts: Vec<Part>) -> Vec<Part> {
    let streaming_index = find_last_part_index(&parts, |part| {
        matches!(part, Part::Text(text) if text.is_streaming)
    });

    if let Some(index) = streaming_index {
        if let Part::Text(text) = &mut parts[index] {
            text.is_streaming = false;
        }
    }

    parts
}

/// Concatenation of all text parts in a branch, ignoring other part types.
#[must_use]
pub fn branch_text(parts: &[Part]) -> String {
    let mut combined = String::new();
    for part in parts {
        if let Part::Text(text) = part {
            combined.push_str(&text.content);
        }
    }

    combined
}
