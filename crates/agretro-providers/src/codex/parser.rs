use std::path::Path;

use agretro_types::{EntryKind, Parsed, RawEntry, ToolErrorKind};
use uuid::Uuid;

use crate::codex::schema::{
    Envelope, FunctionCallOutputPayload, FunctionCallPayload, MessagePart, MessagePayload, Payload,
};
use crate::io::read_utf8;
use crate::{ids, Result};

const PREVIEW_CAP: usize = 200;
const RESULT_TEXT_CAP: usize = 1500;

pub fn parse_file(path: &Path, project: &str) -> Result<Vec<Parsed>> {
    let text = read_utf8(path)?;
    let session_id = session_id_for(path);
    Ok(text
        .lines()
        .enumerate()
        .filter_map(|(line_no, line)| {
            let line = line.trim();
            if line.is_empty() {
                None
            } else {
                parse_line(line, line_no, &session_id, project)
            }
        })
        .collect())
}

/// Session id for a rollout file: the trailing UUID of the filename when
/// present (`rollout-2025-08-01T10-00-00-<uuid>.jsonl`), else a stable
/// hash of the path.
pub fn session_id_for(path: &Path) -> String {
    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        if let Some(tail) = stem.len().checked_sub(36).and_then(|start| stem.get(start..)) {
            if Uuid::parse_str(tail).is_ok() {
                return tail.to_string();
            }
        }
    }
    ids::stable_id(&["codex-session", &path.to_string_lossy()])
}

/// Parse one rollout line. Non-`response_item` envelopes and unmodeled
/// payloads yield `None`.
pub fn parse_line(line: &str, line_no: usize, session_id: &str, project: &str) -> Option<Parsed> {
    let Envelope::ResponseItem(record) = serde_json::from_str::<Envelope>(line).ok()? else {
        return None;
    };

    let entry = match record.payload {
        Payload::Message(msg) => message_entry(msg, line_no, &record.timestamp, session_id, project)?,
        Payload::FunctionCall(call) => call_entry(call, &record.timestamp, session_id, project),
        Payload::FunctionCallOutput(out) => output_entry(out, &record.timestamp, session_id, project),
        Payload::Unknown => return None,
    };
    Some(Parsed::raw(entry))
}

fn message_entry(
    msg: MessagePayload,
    line_no: usize,
    timestamp: &str,
    session_id: &str,
    project: &str,
) -> Option<RawEntry> {
    let kind = match msg.role.as_str() {
        "user" => EntryKind::User,
        "assistant" => EntryKind::Assistant,
        _ => return None,
    };

    let mut parts: Vec<String> = Vec::new();
    for part in msg.content {
        match part {
            MessagePart::InputText { text } | MessagePart::OutputText { text } => {
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            MessagePart::Unknown => {}
        }
    }
    let text = parts.join("\n");

    let entry_id = ids::stable_id(&["codex-msg", session_id, &line_no.to_string()]);
    let mut entry = RawEntry::new(entry_id, session_id, project, kind, timestamp);
    if !text.is_empty() {
        match kind {
            EntryKind::User => entry.user_text = Some(text),
            _ => entry.text_content = Some(text),
        }
    }
    entry.content_types = vec!["text".to_string()];
    Some(entry)
}

/// Tool calls become assistant entries so tool pacing matches the
/// envelope format downstream.
fn call_entry(
    call: FunctionCallPayload,
    timestamp: &str,
    session_id: &str,
    project: &str,
) -> RawEntry {
    let entry_id = ids::stable_id(&["codex-call", session_id, &call.call_id]);
    let mut entry = RawEntry::new(entry_id, session_id, project, EntryKind::Assistant, timestamp);
    entry.content_types = vec!["tool_use".to_string()];
    if let Some(first) = call.arguments.trim().lines().next() {
        if !first.is_empty() {
            entry.tool_input_preview = Some(first.chars().take(PREVIEW_CAP).collect());
        }
    }
    entry.tool_names = vec![call.name];
    entry
}

/// Outputs become user-side tool results. The format has no error flag,
/// so an output is an error exactly when its text classifies as one.
fn output_entry(
    out: FunctionCallOutputPayload,
    timestamp: &str,
    session_id: &str,
    project: &str,
) -> RawEntry {
    let entry_id = ids::stable_id(&["codex-output", session_id, &out.call_id]);
    let mut entry = RawEntry::new(entry_id, session_id, project, EntryKind::User, timestamp);
    entry.content_types = vec!["tool_result".to_string()];
    entry.is_tool_result = true;
    if !out.output.is_empty() {
        entry.user_text = Some(out.output.chars().take(RESULT_TEXT_CAP).collect());
        let kind = ToolErrorKind::classify(&out.output);
        if kind != ToolErrorKind::Other {
            entry.tool_result_error = true;
            entry.tool_result_error_type = Some(kind);
        }
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn raw(line: &str) -> RawEntry {
        parse_line(line, 7, "11111111-2222-3333-4444-555555555555", "codex")
            .expect("record should parse")
            .as_raw()
            .expect("record should be a raw entry")
            .clone()
    }

    #[test]
    fn session_id_comes_from_rollout_filename() {
        let path = PathBuf::from(
            "/logs/rollout-2025-08-01T10-00-00-0199a213-ceb0-7803-bd57-0789bd07a561.jsonl",
        );
        assert_eq!(
            session_id_for(&path),
            "0199a213-ceb0-7803-bd57-0789bd07a561"
        );
    }

    #[test]
    fn session_id_falls_back_to_path_hash() {
        let path = PathBuf::from("/logs/notes.jsonl");
        let id = session_id_for(&path);
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(id, session_id_for(&path));
    }

    #[test]
    fn user_message_concatenates_text_parts() {
        let entry = raw(
            r#"{"type":"response_item","timestamp":"2025-08-01T10:00:00Z","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"add a flag"},{"type":"input_text","text":"and docs"}]}}"#,
        );
        assert_eq!(entry.kind, EntryKind::User);
        assert_eq!(entry.user_text.as_deref(), Some("add a flag\nand docs"));
        assert_eq!(entry.content_types, vec!["text"]);
        assert_eq!(entry.timestamp_utc, "2025-08-01T10:00:00Z");
    }

    #[test]
    fn assistant_message_uses_output_text() {
        let entry = raw(
            r#"{"type":"response_item","timestamp":"2025-08-01T10:00:01Z","payload":{"type":"message","role":"assistant","content":[{"type":"output_text","text":"done"}]}}"#,
        );
        assert_eq!(entry.kind, EntryKind::Assistant);
        assert_eq!(entry.text_content.as_deref(), Some("done"));
        assert!(entry.user_text.is_none());
    }

    #[test]
    fn function_call_is_an_assistant_tool_use() {
        let entry = raw(
            r#"{"type":"response_item","timestamp":"2025-08-01T10:00:02Z","payload":{"type":"function_call","name":"shell","arguments":"{\"command\":[\"cargo\",\"test\"]}","call_id":"call_1"}}"#,
        );
        assert_eq!(entry.kind, EntryKind::Assistant);
        assert_eq!(entry.tool_names, vec!["shell"]);
        assert_eq!(entry.content_types, vec!["tool_use"]);
        assert_eq!(
            entry.tool_input_preview.as_deref(),
            Some(r#"{"command":["cargo","test"]}"#)
        );
    }

    #[test]
    fn function_call_output_is_a_tool_result() {
        let entry = raw(
            r#"{"type":"response_item","timestamp":"2025-08-01T10:00:03Z","payload":{"type":"function_call_output","call_id":"call_1","output":"all tests passed"}}"#,
        );
        assert_eq!(entry.kind, EntryKind::User);
        assert!(entry.is_tool_result);
        assert!(!entry.tool_result_error);
        assert_eq!(entry.user_text.as_deref(), Some("all tests passed"));
    }

    #[test]
    fn error_output_is_classified() {
        let entry = raw(
            r#"{"type":"response_item","timestamp":"2025-08-01T10:00:04Z","payload":{"type":"function_call_output","call_id":"call_2","output":"bash: command exited with exit code 1"}}"#,
        );
        assert!(entry.tool_result_error);
        assert_eq!(
            entry.tool_result_error_type,
            Some(ToolErrorKind::CommandFailed)
        );
    }

    #[test]
    fn call_and_output_ids_are_stable_per_call_id() {
        let call = raw(
            r#"{"type":"response_item","timestamp":"2025-08-01T10:00:05Z","payload":{"type":"function_call","name":"shell","arguments":"ls","call_id":"call_9"}}"#,
        );
        let again = raw(
            r#"{"type":"response_item","timestamp":"2025-08-01T10:00:05Z","payload":{"type":"function_call","name":"shell","arguments":"ls","call_id":"call_9"}}"#,
        );
        assert_eq!(call.entry_id, again.entry_id);

        let output = raw(
            r#"{"type":"response_item","timestamp":"2025-08-01T10:00:06Z","payload":{"type":"function_call_output","call_id":"call_9","output":"ok"}}"#,
        );
        assert_ne!(call.entry_id, output.entry_id);
    }

    #[test]
    fn unmodeled_lines_parse_to_nothing() {
        // Session meta and other envelope types.
        assert!(parse_line(
            r#"{"type":"session_meta","payload":{"id":"x"}}"#,
            0,
            "s1",
            "codex",
        )
        .is_none());
        // Reasoning payloads and other unmodeled response items.
        assert!(parse_line(
            r#"{"type":"response_item","timestamp":"2025-08-01T10:00:07Z","payload":{"type":"reasoning","summary":[]}}"#,
            1,
            "s1",
            "codex",
        )
        .is_none());
        // Non-conversation roles.
        assert!(parse_line(
            r#"{"type":"response_item","timestamp":"2025-08-01T10:00:08Z","payload":{"type":"message","role":"developer","content":[{"type":"input_text","text":"rules"}]}}"#,
            2,
            "s1",
            "codex",
        )
        .is_none());
        // Broken JSON.
        assert!(parse_line("{oops", 3, "s1", "codex").is_none());
    }

    #[test]
    fn parse_file_assigns_line_scoped_message_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir
            .path()
            .join("rollout-2025-08-01T10-00-00-0199a213-ceb0-7803-bd57-0789bd07a561.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"session_meta","payload":{"id":"x"}}"#,
                "\n",
                r#"{"type":"response_item","timestamp":"2025-08-01T10:00:00Z","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"hello"}]}}"#,
                "\n",
                r#"{"type":"response_item","timestamp":"2025-08-01T10:00:01Z","payload":{"type":"message","role":"assistant","content":[{"type":"output_text","text":"hi"}]}}"#,
                "\n",
            ),
        )
        .expect("write fixture");

        let parsed = parse_file(&path, "codex").expect("parse");
        assert_eq!(parsed.len(), 2);
        let first = parsed[0].as_raw().unwrap();
        let second = parsed[1].as_raw().unwrap();
        assert_eq!(first.session_id, "0199a213-ceb0-7803-bd57-0789bd07a561");
        assert_eq!(first.session_id, second.session_id);
        assert_ne!(first.entry_id, second.entry_id);
    }
}
