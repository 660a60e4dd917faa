use std::path::Path;

use agretro_types::{EntryKind, Parsed, ProgressEntry, ProgressKind, RawEntry, ToolErrorKind};
use serde_json::Value;

use crate::claude::schema::{
    AgentMessage, Block, Content, ConversationRecord, Envelope, Message, ProgressData,
    ProgressRecord, SystemRecord,
};
use crate::io::read_utf8;
use crate::Result;

/// Tools whose input names a file worth indexing.
const FILE_PATH_TOOLS: [&str; 5] = ["Edit", "Write", "Read", "NotebookEdit", "NotebookRead"];
const FILE_PATH_KEYS: [&str; 3] = ["file_path", "notebook_path", "path"];

/// Tools whose input carries a human-readable string worth previewing.
const TEXT_INPUT_TOOLS: [(&str, &str); 5] = [
    ("Bash", "command"),
    ("Task", "prompt"),
    ("WebSearch", "query"),
    ("WebFetch", "url"),
    ("Grep", "pattern"),
];

const PREVIEW_CAP: usize = 200;
const RESULT_TEXT_CAP: usize = 1500;

pub fn parse_file(path: &Path, project: &str) -> Result<Vec<Parsed>> {
    let text = read_utf8(path)?;
    Ok(text
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                None
            } else {
                parse_line(line, project)
            }
        })
        .collect())
}

/// Parse one envelope record. Malformed JSON, unmodeled record types, and
/// records without a usable id all yield `None`.
pub fn parse_line(line: &str, project: &str) -> Option<Parsed> {
    match serde_json::from_str::<Envelope>(line).ok()? {
        Envelope::User(rec) if !rec.uuid.is_empty() => {
            Some(Parsed::raw(conversation_entry(rec, EntryKind::User, project)))
        }
        Envelope::Assistant(rec) if !rec.uuid.is_empty() => Some(Parsed::raw(conversation_entry(
            rec,
            EntryKind::Assistant,
            project,
        ))),
        Envelope::System(rec) if !rec.uuid.is_empty() => {
            Some(Parsed::raw(system_entry(rec, project)))
        }
        Envelope::Progress(rec) if !rec.uuid.is_empty() => {
            progress_entry(rec).map(Parsed::Progress)
        }
        _ => None,
    }
}

fn conversation_entry(rec: ConversationRecord, kind: EntryKind, project: &str) -> RawEntry {
    let ConversationRecord {
        uuid,
        session_id,
        timestamp,
        parent_uuid,
        is_sidechain,
        git_branch,
        cwd,
        message,
    } = rec;

    let mut entry = RawEntry::new(uuid, session_id, project, kind, timestamp);
    entry.parent_uuid = parent_uuid;
    entry.is_sidechain = is_sidechain;
    entry.git_branch = git_branch;
    entry.cwd = cwd;
    apply_message(&mut entry, message, kind);
    entry
}

fn system_entry(rec: SystemRecord, project: &str) -> RawEntry {
    let SystemRecord {
        uuid,
        session_id,
        timestamp,
        parent_uuid,
        is_sidechain,
        subtype,
        duration_ms,
        git_branch,
        cwd,
        message,
    } = rec;

    let mut entry = RawEntry::new(uuid, session_id, project, EntryKind::System, timestamp);
    entry.parent_uuid = parent_uuid;
    entry.is_sidechain = is_sidechain;
    entry.system_subtype = subtype;
    entry.duration_ms = duration_ms;
    entry.git_branch = git_branch;
    entry.cwd = cwd;
    apply_message(&mut entry, message, EntryKind::System);
    entry
}

fn apply_message(entry: &mut RawEntry, message: Option<Message>, kind: EntryKind) {
    let Some(message) = message else {
        return;
    };
    entry.model = message.model;
    if let Some(usage) = message.usage {
        entry.input_tokens = Some(usage.input_tokens);
        entry.output_tokens = Some(usage.output_tokens);
    }
    match message.content {
        Some(Content::Text(text)) => {
            if !text.is_empty() {
                match kind {
                    EntryKind::User => entry.user_text = Some(text),
                    _ => entry.text_content = Some(text),
                }
            }
            entry.content_types = vec!["text".to_string()];
        }
        Some(Content::Blocks(blocks)) => apply_blocks(entry, blocks, kind),
        None => {}
    }
}

fn apply_blocks(entry: &mut RawEntry, blocks: Vec<Block>, kind: EntryKind) {
    let mut types: Vec<String> = Vec::new();
    let mut user_parts: Vec<String> = Vec::new();
    let mut text_parts: Vec<String> = Vec::new();

    for block in blocks {
        match block {
            Block::Text { text } => {
                push_type(&mut types, "text");
                if kind == EntryKind::User {
                    user_parts.push(text);
                } else {
                    text_parts.push(text);
                }
            }
            Block::ToolUse { name, input } => {
                push_type(&mut types, "tool_use");
                if FILE_PATH_TOOLS.contains(&name.as_str()) {
                    if let Some(path) = file_path_from(&input) {
                        entry.tool_file_paths.push(path.to_string());
                    }
                }
                if entry.tool_input_preview.is_none() {
                    entry.tool_input_preview = input_preview(&name, &input);
                }
                entry.tool_names.push(name);
            }
            Block::ToolResult { content, is_error } => {
                push_type(&mut types, "tool_result");
                entry.is_tool_result = true;
                let result_text = tool_result_text(content.as_ref());
                if !result_text.is_empty() {
                    user_parts.push(truncate_chars(&result_text, RESULT_TEXT_CAP));
                }
                if is_error {
                    entry.tool_result_error = true;
                    entry.tool_result_error_type = Some(ToolErrorKind::classify(&result_text));
                }
            }
            Block::Thinking => push_type(&mut types, "thinking"),
            Block::Unknown => {}
        }
    }

    if kind == EntryKind::User && !user_parts.is_empty() {
        entry.user_text = Some(user_parts.join("\n"));
    }
    if !text_parts.is_empty() {
        entry.text_content = Some(text_parts.join("\n"));
    }
    entry.content_types = types;
}

/// Record a block kind once, preserving first-occurrence order.
fn push_type(types: &mut Vec<String>, kind: &str) {
    if !types.iter().any(|existing| existing == kind) {
        types.push(kind.to_string());
    }
}

fn file_path_from(input: &Value) -> Option<&str> {
    FILE_PATH_KEYS
        .iter()
        .find_map(|key| input.get(key).and_then(|v| v.as_str()))
}

/// First line of the tool's free-text input, capped. Only tools with a
/// known text field produce a preview.
fn input_preview(name: &str, input: &Value) -> Option<String> {
    let (_, key) = TEXT_INPUT_TOOLS.iter().find(|(tool, _)| *tool == name)?;
    let raw = input.get(*key)?.as_str()?;
    let first = raw.trim().lines().next().unwrap_or("");
    if first.is_empty() {
        None
    } else {
        Some(truncate_chars(first, PREVIEW_CAP))
    }
}

/// Tool results are either a bare string or a list of blocks whose text
/// entries get joined.
fn tool_result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => {
            let texts: Vec<&str> = items
                .iter()
                .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect();
            texts.join("\n")
        }
        _ => String::new(),
    }
}

fn truncate_chars(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

fn progress_entry(rec: ProgressRecord) -> Option<ProgressEntry> {
    let (kind, message) = match rec.data? {
        ProgressData::AgentProgress { message } => (ProgressKind::AgentProgress, message),
        ProgressData::BashProgress => (ProgressKind::BashProgress, None),
        ProgressData::Unknown => return None,
    };

    let mut entry = ProgressEntry {
        entry_id: rec.uuid,
        session_id: rec.session_id,
        progress_type: kind,
        parent_tool_id: rec.parent_uuid,
        tool_name: None,
        has_result: false,
        result_error: false,
        timestamp_utc: rec.timestamp,
    };

    if let Some(msg) = message {
        apply_agent_message(&mut entry, msg);
    }
    Some(entry)
}

fn apply_agent_message(entry: &mut ProgressEntry, msg: AgentMessage) {
    let blocks = msg.message.map(|inner| inner.content).unwrap_or_default();
    match msg.kind.as_deref() {
        Some("assistant") => {
            for block in blocks {
                if let Block::ToolUse { name, .. } = block {
                    entry.tool_name = Some(name);
                    break;
                }
            }
        }
        Some("user") => {
            for block in blocks {
                if let Block::ToolResult { is_error, .. } = block {
                    entry.has_result = true;
                    entry.result_error = is_error;
                    break;
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(line: &str) -> RawEntry {
        parse_line(line, "claude:demo")
            .expect("record should parse")
            .as_raw()
            .expect("record should be a raw entry")
            .clone()
    }

    #[test]
    fn parses_user_prompt() {
        let entry = raw(
            r#"{"type":"user","uuid":"u1","sessionId":"s1","timestamp":"2025-03-01T10:00:00Z","cwd":"/repo","gitBranch":"main","message":{"content":[{"type":"text","text":"fix the bug"}]}}"#,
        );
        assert_eq!(entry.kind, EntryKind::User);
        assert_eq!(entry.user_text.as_deref(), Some("fix the bug"));
        assert_eq!(entry.content_types, vec!["text"]);
        assert_eq!(entry.cwd.as_deref(), Some("/repo"));
        assert_eq!(entry.git_branch.as_deref(), Some("main"));
        assert!(!entry.is_tool_result);
    }

    #[test]
    fn string_content_lands_by_role() {
        let user = raw(
            r#"{"type":"user","uuid":"u1","sessionId":"s1","timestamp":"2025-03-01T10:00:00Z","message":{"content":"plain prompt"}}"#,
        );
        assert_eq!(user.user_text.as_deref(), Some("plain prompt"));
        assert!(user.text_content.is_none());

        let assistant = raw(
            r#"{"type":"assistant","uuid":"a1","sessionId":"s1","timestamp":"2025-03-01T10:00:01Z","message":{"content":"plain reply"}}"#,
        );
        assert_eq!(assistant.text_content.as_deref(), Some("plain reply"));
        assert!(assistant.user_text.is_none());
    }

    #[test]
    fn tool_use_collects_names_paths_and_preview() {
        let entry = raw(
            r#"{"type":"assistant","uuid":"a1","sessionId":"s1","timestamp":"2025-03-01T10:00:02Z","message":{"model":"sonnet","content":[{"type":"tool_use","name":"Bash","input":{"command":"cargo test\n--all"}},{"type":"tool_use","name":"Edit","input":{"file_path":"/repo/src/lib.rs"}},{"type":"tool_use","name":"Bash","input":{"command":"ls"}}]}}"#,
        );
        assert_eq!(entry.tool_names, vec!["Bash", "Edit", "Bash"]);
        assert_eq!(entry.tool_file_paths, vec!["/repo/src/lib.rs"]);
        // First preview wins; later tool inputs never overwrite it.
        assert_eq!(entry.tool_input_preview.as_deref(), Some("cargo test"));
        assert_eq!(entry.content_types, vec!["tool_use"]);
        assert_eq!(entry.model.as_deref(), Some("sonnet"));
    }

    #[test]
    fn tool_result_error_is_classified() {
        let entry = raw(
            r#"{"type":"assistant","uuid":"a2","sessionId":"s1","timestamp":"2025-03-01T10:00:03Z","message":{"content":[{"type":"tool_use","name":"Read","input":{"file_path":"/x"}},{"type":"tool_result","content":"file not found: /x","is_error":true}]}}"#,
        );
        assert_eq!(entry.tool_names, vec!["Read"]);
        assert!(entry.is_tool_result);
        assert!(entry.tool_result_error);
        assert_eq!(entry.tool_result_error_type, Some(ToolErrorKind::FileNotFound));
        assert_eq!(entry.content_types, vec!["tool_use", "tool_result"]);
        // Result text joins user text only on user records.
        assert!(entry.user_text.is_none());
        assert!(entry.text_content.is_none());
    }

    #[test]
    fn user_tool_result_text_is_capped_and_joined() {
        let long = "x".repeat(2000);
        let line = format!(
            r#"{{"type":"user","uuid":"u2","sessionId":"s1","timestamp":"2025-03-01T10:00:04Z","message":{{"content":[{{"type":"tool_result","content":[{{"type":"text","text":"{long}"}}]}},{{"type":"text","text":"now fix it"}}]}}}}"#,
        );
        let entry = raw(&line);
        assert!(entry.is_tool_result);
        assert!(!entry.tool_result_error);
        let text = entry.user_text.expect("tool result text should be kept");
        let parts: Vec<&str> = text.split('\n').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].chars().count(), 1500);
        assert_eq!(parts[1], "now fix it");
    }

    #[test]
    fn thinking_blocks_count_only_as_content_type() {
        let entry = raw(
            r#"{"type":"assistant","uuid":"a3","sessionId":"s1","timestamp":"2025-03-01T10:00:05Z","message":{"content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"answer"},{"type":"text","text":"more"}]}}"#,
        );
        assert_eq!(entry.content_types, vec!["thinking", "text"]);
        assert_eq!(entry.text_content.as_deref(), Some("answer\nmore"));
    }

    #[test]
    fn system_record_keeps_subtype_and_duration() {
        let entry = raw(
            r#"{"type":"system","uuid":"sys1","sessionId":"s1","timestamp":"2025-03-01T10:00:06Z","subtype":"turn_duration","durationMs":5400}"#,
        );
        assert_eq!(entry.kind, EntryKind::System);
        assert_eq!(entry.system_subtype.as_deref(), Some("turn_duration"));
        assert_eq!(entry.duration_ms, Some(5400));
    }

    #[test]
    fn usage_tokens_are_carried() {
        let entry = raw(
            r#"{"type":"assistant","uuid":"a4","sessionId":"s1","timestamp":"2025-03-01T10:00:07Z","message":{"usage":{"input_tokens":120,"output_tokens":48},"content":[]}}"#,
        );
        assert_eq!(entry.input_tokens, Some(120));
        assert_eq!(entry.output_tokens, Some(48));
        assert!(entry.content_types.is_empty());
    }

    #[test]
    fn sidechain_flag_is_kept() {
        let entry = raw(
            r#"{"type":"user","uuid":"u3","sessionId":"s1","timestamp":"2025-03-01T10:00:08Z","isSidechain":true,"parentUuid":"a1","message":{"content":"side"}}"#,
        );
        assert!(entry.is_sidechain);
        assert_eq!(entry.parent_uuid.as_deref(), Some("a1"));
    }

    #[test]
    fn agent_progress_tool_call_is_tracked() {
        let parsed = parse_line(
            r#"{"type":"progress","uuid":"p1","sessionId":"s1","timestamp":"2025-03-01T10:00:09Z","parentUuid":"tool-1","data":{"type":"agent_progress","message":{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Grep","input":{"pattern":"fn main"}}]}}}}"#,
            "claude:demo",
        )
        .expect("progress should parse");
        let progress = parsed.as_progress().expect("should be progress");
        assert_eq!(progress.progress_type, ProgressKind::AgentProgress);
        assert_eq!(progress.parent_tool_id.as_deref(), Some("tool-1"));
        assert_eq!(progress.tool_name.as_deref(), Some("Grep"));
        assert!(!progress.has_result);
    }

    #[test]
    fn agent_progress_result_sets_flags() {
        let parsed = parse_line(
            r#"{"type":"progress","uuid":"p2","sessionId":"s1","timestamp":"2025-03-01T10:00:10Z","parentUuid":"tool-1","data":{"type":"agent_progress","message":{"type":"user","message":{"content":[{"type":"tool_result","content":"boom","is_error":true}]}}}}"#,
            "claude:demo",
        )
        .expect("progress should parse");
        let progress = parsed.as_progress().expect("should be progress");
        assert!(progress.has_result);
        assert!(progress.result_error);
        assert!(progress.tool_name.is_none());
    }

    #[test]
    fn bash_progress_is_a_heartbeat() {
        let parsed = parse_line(
            r#"{"type":"progress","uuid":"p3","sessionId":"s1","timestamp":"2025-03-01T10:00:11Z","data":{"type":"bash_progress"}}"#,
            "claude:demo",
        )
        .expect("progress should parse");
        let progress = parsed.as_progress().expect("should be progress");
        assert_eq!(progress.progress_type, ProgressKind::BashProgress);
        assert!(progress.tool_name.is_none());
    }

    #[test]
    fn unmodeled_records_parse_to_nothing() {
        // Unknown progress payloads.
        assert!(parse_line(
            r#"{"type":"progress","uuid":"p4","sessionId":"s1","timestamp":"2025-03-01T10:00:12Z","data":{"type":"mcp_progress","payload":{}}}"#,
            "claude:demo",
        )
        .is_none());
        // Snapshot records.
        assert!(parse_line(
            r#"{"type":"file-history-snapshot","messageId":"m1","snapshot":{}}"#,
            "claude:demo",
        )
        .is_none());
        // Unknown top-level types.
        assert!(parse_line(r#"{"type":"summary","summary":"hi"}"#, "claude:demo").is_none());
        // Records with no id.
        assert!(parse_line(
            r#"{"type":"user","uuid":"","sessionId":"s1","timestamp":"2025-03-01T10:00:13Z"}"#,
            "claude:demo",
        )
        .is_none());
        // Records missing required identity fields.
        assert!(parse_line(r#"{"type":"user","uuid":"u9"}"#, "claude:demo").is_none());
        // Broken JSON.
        assert!(parse_line("{not json", "claude:demo").is_none());
    }

    #[test]
    fn parse_file_skips_blank_and_broken_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"user","uuid":"u1","sessionId":"s1","timestamp":"2025-03-01T10:00:00Z","message":{"content":"hello"}}"#,
                "\n\n{broken\n",
                r#"{"type":"assistant","uuid":"a1","sessionId":"s1","timestamp":"2025-03-01T10:00:01Z","message":{"content":"hi"}}"#,
                "\n",
            ),
        )
        .expect("write fixture");

        let parsed = parse_file(&path, "claude:demo").expect("parse");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].as_raw().unwrap().entry_id, "u1");
        assert_eq!(parsed[1].as_raw().unwrap().entry_id, "a1");
    }

    #[test]
    fn parse_file_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, [0xffu8, 0xfe, 0x00, 0x01]).expect("write fixture");

        let err = parse_file(&path, "claude:demo").expect_err("must fail");
        assert_eq!(err.kind(), "invalid_utf8");
    }
}
