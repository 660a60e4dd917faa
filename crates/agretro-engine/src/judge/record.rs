//! Validates a judge reply into a `session_judgments` row.
//!
//! Models pad replies with markdown fences and routinely undercount
//! turns, so the raw JSON is repaired before it is stored: fence lines
//! are stripped, turn totals are rescaled to the known turn count, and
//! a reply that is not JSON at all still produces a row (outcome
//! `unknown`) so the session is not re-sent on the next pass.

use agretro_store::JudgmentRecord;
use serde_json::Value;

const RAW_SNIPPET_CAP: usize = 200;

/// Strips markdown code fences and parses the reply as JSON.
pub(crate) fn parse_reply(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.starts_with("```") {
        let cleaned: Vec<&str> = trimmed
            .lines()
            .filter(|line| !line.trim_start().starts_with("```"))
            .collect();
        serde_json::from_str(&cleaned.join("\n")).ok()
    } else {
        serde_json::from_str(trimmed).ok()
    }
}

pub(crate) fn record_from_reply(session_id: &str, turn_count: i64, raw: &str) -> JudgmentRecord {
    match parse_reply(raw) {
        Some(parsed) => build_record(session_id, turn_count, &parsed, raw),
        None => parse_failure_record(session_id, raw),
    }
}

fn build_record(session_id: &str, turn_count: i64, parsed: &Value, raw: &str) -> JudgmentRecord {
    let mut productive = get_count(parsed, "productive_turns");
    let mut waste = get_count(parsed, "waste_turns");
    let mut total = productive + waste;
    let misalignment_count = get_count(parsed, "misalignment_count");

    if turn_count > 0 && total < turn_count {
        if total > 0 {
            // Undercounted: distribute the missing turns proportionally.
            productive = (productive as f64 * turn_count as f64 / total as f64).round() as i64;
            waste = turn_count - productive;
        } else {
            // Returned 0/0: estimate waste from the misalignment count.
            waste = (misalignment_count * 2).min(turn_count);
            productive = turn_count - waste;
        }
        total = productive + waste;
    }

    // Each misalignment implies at least one wasted turn.
    if misalignment_count >= 3 && total > 0 && (waste as f64) / (total as f64) < 0.1 {
        let cap = if turn_count > 0 { turn_count } else { total };
        let min_waste = misalignment_count.min(cap);
        if waste < min_waste {
            waste = min_waste;
            productive = (total - waste).max(0);
        }
    }

    let ratio = if total > 0 {
        productive as f64 / total as f64
    } else {
        get_f64(parsed, "productivity_ratio")
    };

    JudgmentRecord {
        session_id: session_id.to_string(),
        outcome: get_str_or(parsed, "outcome", "unknown"),
        outcome_confidence: get_f64(parsed, "outcome_confidence"),
        outcome_reasoning: get_str(parsed, "outcome_reasoning"),
        prompt_clarity: get_f64(parsed, "prompt_clarity"),
        prompt_completeness: get_f64(parsed, "prompt_completeness"),
        prompt_missing: dump(parsed, "prompt_missing", "[]"),
        prompt_summary: get_str(parsed, "prompt_summary"),
        trajectory_summary: get_str(parsed, "trajectory_summary"),
        underspecified_parts: dump(parsed, "underspecified_parts", "[]"),
        misalignment_count,
        misalignments: dump(parsed, "misalignments", "[]"),
        correction_count: get_count(parsed, "correction_count"),
        corrections: dump(parsed, "corrections", "[]"),
        productive_turns: productive,
        waste_turns: waste,
        productivity_ratio: ratio,
        waste_breakdown: dump(parsed, "waste_breakdown", "{}"),
        narrative: get_str(parsed, "narrative"),
        what_worked: get_str(parsed, "what_worked"),
        what_failed: get_str(parsed, "what_failed"),
        user_quote: get_str(parsed, "user_quote"),
        claude_md_suggestion: get_str(parsed, "claude_md_suggestion"),
        claude_md_rationale: get_str(parsed, "claude_md_rationale"),
        raw_analysis: raw.to_string(),
    }
}

fn parse_failure_record(session_id: &str, raw: &str) -> JudgmentRecord {
    let snippet: String = raw.chars().take(RAW_SNIPPET_CAP).collect();
    JudgmentRecord {
        session_id: session_id.to_string(),
        outcome: "unknown".to_string(),
        outcome_reasoning: format!("Failed to parse: {}", snippet),
        prompt_missing: "[]".to_string(),
        underspecified_parts: "[]".to_string(),
        misalignments: "[]".to_string(),
        corrections: "[]".to_string(),
        waste_breakdown: r#"{"misalignment": 0, "errors": 0, "rework": 0}"#.to_string(),
        raw_analysis: raw.to_string(),
        ..JudgmentRecord::default()
    }
}

pub(crate) fn get_str(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn get_str_or(value: &Value, key: &str, default: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn get_f64(value: &Value, key: &str) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Integer field the model sometimes returns as a float.
fn get_count(value: &Value, key: &str) -> i64 {
    let field = value.get(key);
    field
        .and_then(Value::as_i64)
        .or_else(|| field.and_then(Value::as_f64).map(|f| f as i64))
        .unwrap_or(0)
}

/// JSON-encodes a nested field for a text column.
pub(crate) fn dump(value: &Value, key: &str, default: &str) -> String {
    match value.get(key) {
        Some(field) => serde_json::to_string(field).unwrap_or_else(|_| default.to_string()),
        None => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(fields: &str) -> String {
        format!(r#"{{"outcome": "completed", "outcome_confidence": 0.9, {}}}"#, fields)
    }

    #[test]
    fn fenced_replies_parse() {
        let raw = "```json\n{\"outcome\": \"completed\"}\n```";
        let parsed = parse_reply(raw).unwrap();
        assert_eq!(parsed["outcome"], "completed");
    }

    #[test]
    fn garbage_reply_becomes_an_unknown_outcome_row() {
        let rec = record_from_reply("s1", 5, "I could not analyze this session.");
        assert_eq!(rec.outcome, "unknown");
        assert_eq!(rec.outcome_confidence, 0.0);
        assert!(rec.outcome_reasoning.starts_with("Failed to parse: I could not"));
        assert_eq!(rec.prompt_missing, "[]");
        assert_eq!(rec.raw_analysis, "I could not analyze this session.");
    }

    #[test]
    fn undercounted_turns_are_rescaled_proportionally() {
        let raw = reply(r#""productive_turns": 3, "waste_turns": 1"#);
        let rec = record_from_reply("s1", 10, &raw);
        // 3/4 of 10, rounded.
        assert_eq!(rec.productive_turns, 8);
        assert_eq!(rec.waste_turns, 2);
        assert_eq!(rec.productivity_ratio, 0.8);
    }

    #[test]
    fn zero_turn_replies_estimate_waste_from_misalignments() {
        let raw = reply(r#""productive_turns": 0, "waste_turns": 0, "misalignment_count": 2"#);
        let rec = record_from_reply("s1", 6, &raw);
        assert_eq!(rec.waste_turns, 4);
        assert_eq!(rec.productive_turns, 2);
        assert!((rec.productivity_ratio - 2.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn heavy_misalignment_forces_a_waste_floor() {
        let raw = reply(
            r#""productive_turns": 10, "waste_turns": 0, "misalignment_count": 3, "misalignments": [{"turn": 1}, {"turn": 2}, {"turn": 3}]"#,
        );
        let rec = record_from_reply("s1", 10, &raw);
        assert_eq!(rec.waste_turns, 3);
        assert_eq!(rec.productive_turns, 7);
        assert_eq!(rec.productivity_ratio, 0.7);
        assert_eq!(rec.misalignments, r#"[{"turn":1},{"turn":2},{"turn":3}]"#);
    }

    #[test]
    fn matching_turn_totals_pass_through() {
        let raw = reply(r#""productive_turns": 4, "waste_turns": 1, "prompt_missing": ["repro steps"]"#);
        let rec = record_from_reply("s1", 5, &raw);
        assert_eq!(rec.outcome, "completed");
        assert_eq!(rec.productive_turns, 4);
        assert_eq!(rec.waste_turns, 1);
        assert_eq!(rec.productivity_ratio, 0.8);
        assert_eq!(rec.prompt_missing, r#"["repro steps"]"#);
        assert_eq!(rec.waste_breakdown, "{}");
    }
}
