//! Line builders for each supported log format.
//!
//! Each function returns one serialized line (or, for transcripts, a
//! whole file body) shaped the way the matching parser expects. Text
//! arguments are JSON-escaped via `serde_json`, so fixtures can carry
//! quotes and newlines without care.

use serde_json::json;

/// Claude-style user prompt with a plain string body.
pub fn claude_user(session: &str, uuid: &str, ts: &str, text: &str) -> String {
    json!({
        "type": "user",
        "uuid": uuid,
        "sessionId": session,
        "timestamp": ts,
        "message": { "content": text },
    })
    .to_string()
}

/// Claude-style assistant reply carrying one text block.
pub fn claude_assistant(session: &str, uuid: &str, ts: &str, text: &str) -> String {
    json!({
        "type": "assistant",
        "uuid": uuid,
        "sessionId": session,
        "timestamp": ts,
        "message": { "content": [ { "type": "text", "text": text } ] },
    })
    .to_string()
}

/// Claude-style assistant turn invoking `tool` with the given input.
pub fn claude_tool_use(
    session: &str,
    uuid: &str,
    ts: &str,
    tool: &str,
    input: serde_json::Value,
) -> String {
    json!({
        "type": "assistant",
        "uuid": uuid,
        "sessionId": session,
        "timestamp": ts,
        "message": { "content": [ { "type": "tool_use", "name": tool, "input": input } ] },
    })
    .to_string()
}

/// Claude-style tool result. `is_error` marks the invocation failed.
pub fn claude_tool_result(
    session: &str,
    uuid: &str,
    ts: &str,
    content: &str,
    is_error: bool,
) -> String {
    json!({
        "type": "user",
        "uuid": uuid,
        "sessionId": session,
        "timestamp": ts,
        "message": {
            "content": [ { "type": "tool_result", "content": content, "is_error": is_error } ],
        },
    })
    .to_string()
}

/// Claude-style turn boundary marker with a duration in milliseconds.
pub fn claude_turn(session: &str, uuid: &str, ts: &str, duration_ms: i64) -> String {
    json!({
        "type": "system",
        "uuid": uuid,
        "sessionId": session,
        "timestamp": ts,
        "subtype": "turn_duration",
        "durationMs": duration_ms,
    })
    .to_string()
}

/// Codex rollout line carrying a user message.
pub fn codex_user(ts: &str, text: &str) -> String {
    json!({
        "type": "response_item",
        "timestamp": ts,
        "payload": {
            "type": "message",
            "role": "user",
            "content": [ { "type": "input_text", "text": text } ],
        },
    })
    .to_string()
}

/// Codex rollout line carrying an assistant message.
pub fn codex_assistant(ts: &str, text: &str) -> String {
    json!({
        "type": "response_item",
        "timestamp": ts,
        "payload": {
            "type": "message",
            "role": "assistant",
            "content": [ { "type": "output_text", "text": text } ],
        },
    })
    .to_string()
}

/// Codex rollout line invoking `name` with raw argument text.
pub fn codex_function_call(ts: &str, name: &str, arguments: &str, call_id: &str) -> String {
    json!({
        "type": "response_item",
        "timestamp": ts,
        "payload": {
            "type": "function_call",
            "name": name,
            "arguments": arguments,
            "call_id": call_id,
        },
    })
    .to_string()
}

/// Plain-text transcript body from `(role, text)` turns.
pub fn transcript(turns: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (role, text) in turns {
        body.push_str(role);
        body.push_str(": ");
        body.push_str(text);
        body.push('\n');
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_arguments_are_escaped() {
        let line = claude_user("s1", "u1", "2026-05-01T09:00:00Z", "say \"hi\"\nthen stop");
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["message"]["content"], "say \"hi\"\nthen stop");
    }

    #[test]
    fn lines_stay_single_line() {
        let line = claude_assistant("s1", "a1", "2026-05-01T09:00:05Z", "multi\nline\nreply");
        assert!(!line.contains('\n'));
    }

    #[test]
    fn transcripts_tag_each_turn_with_its_role() {
        let body = transcript(&[("user", "run the tests"), ("assistant", "running")]);
        assert_eq!(body, "user: run the tests\nassistant: running\n");
    }
}
