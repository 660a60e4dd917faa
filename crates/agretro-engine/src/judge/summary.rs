//! Compresses a session's raw entries into a transcript small enough
//! for one judge prompt.
//!
//! User prompts are kept in full, assistant turns shrink to a reasoning
//! snippet plus their tool batch annotated with ok/error results, and
//! timestamps become relative offsets. The returned turn count covers
//! meaningful action rounds only (user prompts, assistant tool batches,
//! assistant explanations), which is the denominator the judge is asked
//! to split into productive and wasted turns.

use agretro_store::Result;
use chrono::DateTime;
use rusqlite::Connection;

const SNIPPET_CAP: usize = 200;
const ERROR_TEXT_CAP: usize = 150;

struct SummaryEntry {
    kind: String,
    timestamp_utc: Option<String>,
    user_text: Option<String>,
    tool_names: Vec<String>,
    is_tool_result: bool,
    tool_result_error: bool,
    system_subtype: Option<String>,
    text_content: Option<String>,
    input_tokens: i64,
    output_tokens: i64,
}

/// Builds the transcript for one session. Returns `("", 0)` when the
/// session has no main-chain entries.
pub(crate) fn build_session_summary(conn: &Connection, session_id: &str) -> Result<(String, i64)> {
    let mut stmt = conn.prepare(
        r#"
        SELECT entry_type, timestamp_utc, user_text, tool_names,
               is_tool_result, tool_result_error, system_subtype,
               text_content, input_tokens, output_tokens
        FROM raw_entries
        WHERE session_id = ?1 AND NOT is_sidechain
        ORDER BY timestamp_utc
        "#,
    )?;
    let entries = stmt
        .query_map([session_id], |row| {
            let tool_names: Option<String> = row.get(3)?;
            Ok(SummaryEntry {
                kind: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                timestamp_utc: row.get(1)?,
                user_text: row.get(2)?,
                tool_names: tool_names
                    .as_deref()
                    .map(|names| serde_json::from_str(names).unwrap_or_default())
                    .unwrap_or_default(),
                is_tool_result: row.get(4)?,
                tool_result_error: row.get(5)?,
                system_subtype: row.get(6)?,
                text_content: row.get(7)?,
                input_tokens: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
                output_tokens: row.get::<_, Option<i64>>(9)?.unwrap_or(0),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if entries.is_empty() {
        return Ok((String::new(), 0));
    }

    let first_ts = parse_ts(entries[0].timestamp_utc.as_deref());
    let mut lines: Vec<String> = Vec::new();
    let mut turn_num: i64 = 0;
    let mut total_input: i64 = 0;
    let mut total_output: i64 = 0;

    for (idx, entry) in entries.iter().enumerate() {
        total_input += entry.input_tokens;
        total_output += entry.output_tokens;

        let elapsed = elapsed_prefix(first_ts, entry.timestamp_utc.as_deref());

        match entry.kind.as_str() {
            "user" if !entry.is_tool_result => {
                if let Some(text) = entry.user_text.as_deref().filter(|t| !t.is_empty()) {
                    turn_num += 1;
                    lines.push(format!("{}TURN {} [user prompt]:\n{}", elapsed, turn_num, text));
                }
            }
            "assistant" if !entry.tool_names.is_empty() => {
                turn_num += 1;
                let snippet = entry
                    .text_content
                    .as_deref()
                    .map(|text| reasoning_snippet(text))
                    .unwrap_or_default();
                let tools = annotate_tools(&entry.tool_names, &entries[idx + 1..]);
                if snippet.is_empty() {
                    lines.push(format!(
                        "{}TURN {} [assistant tools: {}]",
                        elapsed,
                        turn_num,
                        tools.join(", ")
                    ));
                } else {
                    lines.push(format!("{}TURN {} [assistant]:{}", elapsed, turn_num, snippet));
                    lines.push(format!("  tools: {}", tools.join(", ")));
                }
            }
            "assistant" => {
                if let Some(text) = entry.text_content.as_deref().filter(|t| !t.is_empty()) {
                    turn_num += 1;
                    lines.push(format!(
                        "{}TURN {} [assistant]: \"{}{}\"",
                        elapsed,
                        turn_num,
                        clip_chars(text, SNIPPET_CAP).trim(),
                        ellipsis(text, SNIPPET_CAP)
                    ));
                }
            }
            "system" => {
                if entry.system_subtype.as_deref() == Some("api_error") {
                    lines.push(format!("{}SYSTEM: API error", elapsed));
                }
            }
            _ => {}
        }
    }

    let cost = estimate_cost(total_input, total_output);
    let header = format!(
        "SESSION STATS: {} turns, ~{} tokens, ~${:.2} estimated cost\n",
        turn_num,
        group_thousands(total_input + total_output),
        cost
    );
    Ok((header + &lines.join("\n"), turn_num))
}

/// Consecutive tool-result entries immediately after a tool batch report
/// that batch's outcomes, in order.
fn annotate_tools(tools: &[String], following: &[SummaryEntry]) -> Vec<String> {
    let mut statuses: Vec<(bool, String)> = Vec::new();
    for next in following {
        if next.kind != "user" || !next.is_tool_result {
            break;
        }
        if next.tool_result_error {
            let err = next.user_text.as_deref().unwrap_or("");
            statuses.push((true, clip_chars(err, ERROR_TEXT_CAP).trim().to_string()));
        } else {
            statuses.push((false, String::new()));
        }
    }

    tools
        .iter()
        .enumerate()
        .map(|(i, tool)| match statuses.get(i) {
            Some((true, err)) if !err.is_empty() => format!("{} (error: \"{}\")", tool, err),
            Some((true, _)) => format!("{} (error)", tool),
            Some((false, _)) => format!("{} (ok)", tool),
            None => tool.clone(),
        })
        .collect()
}

fn reasoning_snippet(text: &str) -> String {
    let clipped = clip_chars(text, SNIPPET_CAP).trim();
    if clipped.is_empty() {
        String::new()
    } else {
        format!("  \"{}{}\"", clipped, ellipsis(text, SNIPPET_CAP))
    }
}

fn ellipsis(text: &str, cap: usize) -> &'static str {
    if text.chars().count() > cap { "..." } else { "" }
}

pub(crate) fn clip_chars(text: &str, cap: usize) -> &str {
    match text.char_indices().nth(cap) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

fn parse_ts(value: Option<&str>) -> Option<DateTime<chrono::FixedOffset>> {
    DateTime::parse_from_rfc3339(value?).ok()
}

fn elapsed_prefix(
    first: Option<DateTime<chrono::FixedOffset>>,
    timestamp: Option<&str>,
) -> String {
    let (Some(first), Some(ts)) = (first, parse_ts(timestamp)) else {
        return String::new();
    };
    let delta = (ts - first).num_seconds() as f64;
    if delta >= 60.0 {
        format!("[+{:.0}m] ", delta / 60.0)
    } else if delta > 0.0 {
        format!("[+{:.0}s] ", delta)
    } else {
        String::new()
    }
}

/// Rough spend estimate at Sonnet-class list prices.
fn estimate_cost(input_tokens: i64, output_tokens: i64) -> f64 {
    (input_tokens * 3 + output_tokens * 15) as f64 / 1_000_000.0
}

fn group_thousands(n: i64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use agretro_store::{Store, entries};
    use agretro_types::{EntryKind, RawEntry};

    use super::*;

    fn entry(id: &str, session: &str, ts: &str, kind: EntryKind) -> RawEntry {
        RawEntry::new(id, session, "demo", kind, ts)
    }

    fn seed(store: &Store, rows: Vec<RawEntry>) {
        store
            .with_writer(|conn| {
                for row in &rows {
                    entries::upsert_raw_entry(conn, row)?;
                }
                Ok(())
            })
            .unwrap();
    }

    fn summarize(store: &Store, session: &str) -> (String, i64) {
        store
            .with_reader(|conn| build_session_summary(conn, session))
            .unwrap()
    }

    #[test]
    fn missing_session_yields_empty_summary() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(summarize(&store, "nope"), (String::new(), 0));
    }

    #[test]
    fn transcript_numbers_turns_and_annotates_tool_results() {
        let store = Store::open_in_memory().unwrap();

        let mut user = entry("e1", "s1", "2026-06-01T10:00:00Z", EntryKind::User);
        user.user_text = Some("fix the flaky test".to_string());

        let mut worker = entry("e2", "s1", "2026-06-01T10:01:30Z", EntryKind::Assistant);
        worker.text_content = Some("Looking at the test".to_string());
        worker.tool_names = vec!["Read".to_string(), "Edit".to_string()];
        worker.input_tokens = Some(900);
        worker.output_tokens = Some(150);

        let mut ok_result = entry("e3", "s1", "2026-06-01T10:01:35Z", EntryKind::User);
        ok_result.is_tool_result = true;

        let mut err_result = entry("e4", "s1", "2026-06-01T10:01:40Z", EntryKind::User);
        err_result.is_tool_result = true;
        err_result.tool_result_error = true;
        err_result.user_text = Some("file not found: /tmp/x".to_string());

        let mut closer = entry("e5", "s1", "2026-06-01T10:03:00Z", EntryKind::Assistant);
        closer.text_content = Some("done".to_string());
        closer.input_tokens = Some(300);
        closer.output_tokens = Some(150);

        let mut outage = entry("e6", "s1", "2026-06-01T10:03:20Z", EntryKind::System);
        outage.system_subtype = Some("api_error".to_string());

        let mut side = entry("e7", "s1", "2026-06-01T10:03:30Z", EntryKind::User);
        side.is_sidechain = true;
        side.user_text = Some("sidechain note".to_string());

        seed(
            &store,
            vec![user, worker, ok_result, err_result, closer, outage, side],
        );

        let (summary, turns) = summarize(&store, "s1");
        assert_eq!(turns, 3);
        assert!(summary.starts_with("SESSION STATS: 3 turns, ~1,500 tokens, ~$0.01 estimated cost\n"));
        assert!(summary.contains("TURN 1 [user prompt]:\nfix the flaky test"));
        assert!(summary.contains("[+2m] TURN 2 [assistant]:  \"Looking at the test\""));
        assert!(summary.contains("  tools: Read (ok), Edit (error: \"file not found: /tmp/x\")"));
        assert!(summary.contains("[+3m] TURN 3 [assistant]: \"done\""));
        assert!(summary.contains("[+3m] SYSTEM: API error"));
        assert!(!summary.contains("sidechain note"));
    }

    #[test]
    fn long_reasoning_is_clipped_with_an_ellipsis() {
        let store = Store::open_in_memory().unwrap();
        let mut talker = entry("e1", "s1", "2026-06-01T10:00:00Z", EntryKind::Assistant);
        talker.text_content = Some("a".repeat(250));
        seed(&store, vec![talker]);

        let (summary, turns) = summarize(&store, "s1");
        assert_eq!(turns, 1);
        assert!(summary.contains(&format!("TURN 1 [assistant]: \"{}...\"", "a".repeat(200))));
    }

    #[test]
    fn unresolved_tool_batches_list_bare_names() {
        let store = Store::open_in_memory().unwrap();
        let mut user = entry("e1", "s1", "2026-06-01T10:00:00Z", EntryKind::User);
        user.user_text = Some("run the suite".to_string());
        let mut worker = entry("e2", "s1", "2026-06-01T10:00:30Z", EntryKind::Assistant);
        worker.tool_names = vec!["Bash".to_string()];
        seed(&store, vec![user, worker]);

        let (summary, turns) = summarize(&store, "s1");
        assert_eq!(turns, 2);
        assert!(summary.contains("[+30s] TURN 2 [assistant tools: Bash]"));
    }

    #[test]
    fn grouping_inserts_separators_every_three_digits() {
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_500), "1,500");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
