//! Per-session feature extraction.

use std::collections::HashSet;

use agretro_store::Store;
use anyhow::Result;
use chrono::{DateTime, Datelike, Local, Timelike};
use rusqlite::{Connection, OptionalExtension, params};

use crate::config;
use crate::text;

/// Rebuild session_features for every session. Returns the number of
/// sessions processed.
pub fn extract_features(store: &Store) -> Result<i64> {
    let count = store.with_writer(|conn| {
        let session_ids: Vec<String> = {
            let mut stmt = conn.prepare("SELECT session_id FROM sessions")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            ids
        };

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM session_features", [])?;
        for session_id in &session_ids {
            extract_one(&tx, session_id)?;
        }
        tx.commit()?;
        Ok(session_ids.len() as i64)
    })?;
    Ok(count)
}

fn extract_one(conn: &Connection, session_id: &str) -> rusqlite::Result<()> {
    // Non-tool-result user prompts in order.
    let mut stmt = conn.prepare_cached(
        "SELECT user_text, user_text_length FROM raw_entries
         WHERE session_id = ?1 AND entry_type = 'user'
           AND NOT is_tool_result AND user_text_length > 0
         ORDER BY timestamp_utc",
    )?;
    let prompts = stmt
        .query_map([session_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let prompt_texts: Vec<String> = prompts.iter().map(|(t, _)| t.clone()).collect();
    let prompt_lengths: Vec<f64> = prompts.iter().map(|(_, l)| *l as f64).collect();

    let mut stmt = conn.prepare_cached(
        "SELECT COALESCE(text_length, 0), COALESCE(input_tokens, 0),
                COALESCE(output_tokens, 0), tool_names
         FROM raw_entries
         WHERE session_id = ?1 AND entry_type = 'assistant'
         ORDER BY timestamp_utc",
    )?;
    let assistant_rows = stmt
        .query_map([session_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT text_content FROM raw_entries
         WHERE session_id = ?1 AND entry_type = 'assistant' AND text_length > 0",
    )?;
    let assistant_texts = stmt
        .query_map([session_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT duration_ms FROM raw_entries
         WHERE session_id = ?1 AND entry_type = 'system' AND system_subtype = 'turn_duration'",
    )?;
    let durations: Vec<f64> = stmt
        .query_map([session_id], |row| row.get::<_, Option<i64>>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .filter(|d| *d > 0)
        .map(|d| d as f64)
        .collect();

    let started_at: Option<String> = conn
        .query_row(
            "SELECT started_at FROM sessions WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )
        .optional()?
        .flatten();

    let sidechain_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM raw_entries WHERE session_id = ?1 AND is_sidechain = TRUE",
        [session_id],
        |row| row.get(0),
    )?;
    let total_entries: i64 = conn.query_row(
        "SELECT COUNT(*) FROM raw_entries WHERE session_id = ?1",
        [session_id],
        |row| row.get(0),
    )?;
    let branch_count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT git_branch) FROM raw_entries
         WHERE session_id = ?1 AND git_branch IS NOT NULL",
        [session_id],
        |row| row.get(0),
    )?;
    let api_error_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM raw_entries
         WHERE session_id = ?1 AND entry_type = 'system' AND system_subtype = 'api_error'",
        [session_id],
        |row| row.get(0),
    )?;

    // Prompt metrics.
    let avg_prompt_length = mean(&prompt_lengths);
    let prompt_length_trend = text::linear_trend(&prompt_lengths);
    let max_prompt_length = prompt_lengths.iter().copied().fold(0.0, f64::max) as i64;

    // Response metrics over non-empty texts.
    let response_lengths: Vec<f64> = assistant_rows
        .iter()
        .filter(|(len, ..)| *len > 0)
        .map(|(len, ..)| *len as f64)
        .collect();
    let avg_response_length = mean(&response_lengths);
    let response_length_trend = text::linear_trend(&response_lengths);
    let response_length_cv = text::coefficient_of_variation(&response_lengths);

    let total_input: i64 = assistant_rows.iter().map(|(_, i, ..)| i).sum();
    let total_output: i64 = assistant_rows.iter().map(|(_, _, o, _)| o).sum();

    // Tool mix over the flattened batch lists.
    let mut all_tools: Vec<String> = Vec::new();
    for (.., tool_names) in &assistant_rows {
        if let Some(json) = tool_names {
            let tools: Vec<String> = serde_json::from_str(json).unwrap_or_default();
            all_tools.extend(tools);
        }
    }
    let total_tools = all_tools.len().max(1) as f64;
    let ratio = |category: &[&str]| -> f64 {
        all_tools
            .iter()
            .filter(|t| category.contains(&t.as_str()))
            .count() as f64
            / total_tools
    };
    let edit_write_ratio = ratio(config::EDIT_WRITE_TOOLS);
    let read_grep_ratio = ratio(config::READ_GREP_TOOLS);
    let bash_ratio = ratio(config::BASH_TOOLS);
    let task_ratio = ratio(config::TASK_TOOLS);
    let web_ratio = ratio(config::WEB_TOOLS);
    let unique_tools = all_tools.iter().collect::<HashSet<_>>().len() as i64;

    let avg_turn_duration = mean(&durations);

    // Session start in the user's local clock.
    let (hour_of_day, day_of_week) = started_at
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| {
            let local = dt.with_timezone(&Local);
            (
                local.hour() as i64,
                local.weekday().num_days_from_monday() as i64,
            )
        })
        .unwrap_or((0, 0));

    let correction_count = text::count_matching(&prompt_texts, config::CORRECTION_MARKERS);
    let correction_rate = if prompt_texts.is_empty() {
        0.0
    } else {
        correction_count as f64 / prompt_texts.len() as f64
    };
    let rephrasing_count = text::count_matching(&prompt_texts, config::REPHRASING_MARKERS);
    let decision_count = text::count_matching(&prompt_texts, config::DECISION_MARKERS)
        + text::count_matching(&assistant_texts, config::DECISION_MARKERS);

    let topic_entropy = text::topic_keyword_entropy(&prompt_texts, 3);

    let sidechain_ratio = if total_entries > 0 {
        sidechain_count as f64 / total_entries as f64
    } else {
        0.0
    };

    let abandoned = prompt_texts.len() <= 1;

    let has_pr = prompt_texts.iter().chain(assistant_texts.iter()).any(|t| {
        let lower = t.to_lowercase();
        lower.contains("pull request")
            || lower.contains("pr #")
            || (lower.contains("github.com") && lower.contains("/pull/"))
    });

    let branch_switch_count = (branch_count - 1).max(0);
    let prompt_oscillation = text::oscillation_score(&prompt_lengths);

    let subagent = subagent_stats(conn, session_id)?;

    conn.execute(
        "INSERT OR REPLACE INTO session_features (
            session_id, avg_prompt_length, prompt_length_trend, max_prompt_length,
            avg_response_length, response_length_trend, response_length_cv,
            total_input_tokens, total_output_tokens,
            edit_write_ratio, read_grep_ratio, bash_ratio, task_ratio, web_ratio,
            unique_tools_used, avg_turn_duration_ms, hour_of_day, day_of_week,
            correction_count, correction_rate, rephrasing_count, decision_marker_count,
            topic_keyword_entropy, sidechain_count, sidechain_ratio, abandoned,
            has_pr_link, branch_switch_count, prompt_length_oscillation, api_error_count,
            subagent_spawn_count, subagent_tool_diversity, subagent_error_rate,
            bash_heartbeat_count
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                  ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28,
                  ?29, ?30, ?31, ?32, ?33, ?34)",
        params![
            session_id,
            avg_prompt_length,
            prompt_length_trend,
            max_prompt_length,
            avg_response_length,
            response_length_trend,
            response_length_cv,
            total_input,
            total_output,
            edit_write_ratio,
            read_grep_ratio,
            bash_ratio,
            task_ratio,
            web_ratio,
            unique_tools,
            avg_turn_duration,
            hour_of_day,
            day_of_week,
            correction_count,
            correction_rate,
            rephrasing_count,
            decision_count,
            topic_entropy,
            sidechain_count,
            sidechain_ratio,
            abandoned,
            has_pr,
            branch_switch_count,
            prompt_oscillation,
            api_error_count,
            subagent.spawn_count,
            subagent.tool_diversity,
            subagent.error_rate,
            subagent.bash_heartbeat_count,
        ],
    )?;
    Ok(())
}

struct SubagentStats {
    spawn_count: i64,
    tool_diversity: i64,
    error_rate: f64,
    bash_heartbeat_count: i64,
}

/// Subagent metrics from the progress heartbeat table.
fn subagent_stats(conn: &Connection, session_id: &str) -> rusqlite::Result<SubagentStats> {
    let spawn_count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT parent_tool_id) FROM progress_entries
         WHERE session_id = ?1 AND progress_type = 'agent_progress'",
        [session_id],
        |row| row.get(0),
    )?;
    let tool_diversity: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT tool_name) FROM progress_entries
         WHERE session_id = ?1 AND progress_type = 'agent_progress' AND tool_name IS NOT NULL",
        [session_id],
        |row| row.get(0),
    )?;
    let (errors, total): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(result_error), 0), COUNT(*) FROM progress_entries
         WHERE session_id = ?1 AND progress_type = 'agent_progress'",
        [session_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let error_rate = if total > 0 {
        errors as f64 / total as f64
    } else {
        0.0
    };
    let bash_heartbeat_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM progress_entries
         WHERE session_id = ?1 AND progress_type = 'bash_progress'",
        [session_id],
        |row| row.get(0),
    )?;
    Ok(SubagentStats {
        spawn_count,
        tool_diversity,
        error_rate,
        bash_heartbeat_count,
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::sessions::build_sessions;
    use agretro_store::entries;
    use agretro_types::{EntryKind, ProgressEntry, ProgressKind, RawEntry};

    fn prompt(id: &str, session: &str, ts: &str, txt: &str) -> RawEntry {
        let mut e = RawEntry::new(id, session, "claude:demo", EntryKind::User, ts);
        e.user_text = Some(txt.to_string());
        e
    }

    fn reply(id: &str, session: &str, ts: &str, txt: &str, tools: &[&str]) -> RawEntry {
        let mut e = RawEntry::new(id, session, "claude:demo", EntryKind::Assistant, ts);
        if !txt.is_empty() {
            e.text_content = Some(txt.to_string());
        }
        e.tool_names = tools.iter().map(|t| t.to_string()).collect();
        e.input_tokens = Some(100);
        e.output_tokens = Some(50);
        e
    }

    fn seed_and_extract(store: &Store, rows: &[RawEntry]) {
        store
            .with_writer(|conn| {
                for e in rows {
                    entries::upsert_raw_entry(conn, e)?;
                }
                Ok(())
            })
            .unwrap();
        build_sessions(store).unwrap();
        extract_features(store).unwrap();
    }

    fn feature_f64(store: &Store, session: &str, column: &str) -> f64 {
        let sql = format!(
            "SELECT CAST({} AS REAL) FROM session_features WHERE session_id = ?1",
            column
        );
        store
            .with_writer(|conn| Ok(conn.query_row(&sql, [session], |row| row.get(0))?))
            .unwrap()
    }

    #[test]
    fn prompt_and_marker_metrics() {
        let store = Store::open_in_memory().unwrap();
        seed_and_extract(
            &store,
            &[
                prompt("e1", "s1", "2025-03-01T10:00:00Z", "builds a parser"),
                prompt("e2", "s1", "2025-03-01T10:01:00Z", "wait, that is wrong"),
                prompt("e3", "s1", "2025-03-01T10:02:00Z", "perfect, ship it"),
                reply("e4", "s1", "2025-03-01T10:03:00Z", "decided to merge", &[]),
            ],
        );

        // Three prompts, one with a correction marker.
        assert_eq!(feature_f64(&store, "s1", "correction_count"), 1.0);
        let rate = feature_f64(&store, "s1", "correction_rate");
        assert!((rate - 1.0 / 3.0).abs() < 1e-9);
        // "perfect" from the user plus "decided to" from the assistant.
        assert_eq!(feature_f64(&store, "s1", "decision_marker_count"), 2.0);
        let avg = feature_f64(&store, "s1", "avg_prompt_length");
        assert!((avg - (15.0 + 19.0 + 16.0) / 3.0).abs() < 1e-9);
        assert_eq!(feature_f64(&store, "s1", "max_prompt_length"), 19.0);
        assert_eq!(feature_f64(&store, "s1", "abandoned"), 0.0);
    }

    #[test]
    fn tool_ratios_from_json_batches() {
        let store = Store::open_in_memory().unwrap();
        seed_and_extract(
            &store,
            &[
                prompt("e1", "s1", "2025-03-01T10:00:00Z", "go"),
                reply("e2", "s1", "2025-03-01T10:01:00Z", "", &["Read", "Edit"]),
                reply("e3", "s1", "2025-03-01T10:02:00Z", "", &["Bash", "Edit"]),
            ],
        );

        // 4 tool uses: 2 Edit, 1 Read, 1 Bash.
        assert!((feature_f64(&store, "s1", "edit_write_ratio") - 0.5).abs() < 1e-9);
        assert!((feature_f64(&store, "s1", "read_grep_ratio") - 0.25).abs() < 1e-9);
        assert!((feature_f64(&store, "s1", "bash_ratio") - 0.25).abs() < 1e-9);
        assert_eq!(feature_f64(&store, "s1", "task_ratio"), 0.0);
        assert_eq!(feature_f64(&store, "s1", "unique_tools_used"), 3.0);
        assert_eq!(feature_f64(&store, "s1", "total_input_tokens"), 200.0);
        assert_eq!(feature_f64(&store, "s1", "total_output_tokens"), 100.0);
    }

    #[test]
    fn abandoned_and_pr_detection() {
        let store = Store::open_in_memory().unwrap();
        seed_and_extract(
            &store,
            &[
                prompt("e1", "s1", "2025-03-01T10:00:00Z", "just one prompt"),
                reply(
                    "e2",
                    "s1",
                    "2025-03-01T10:01:00Z",
                    "opened https://github.com/acme/x/pull/42 for review",
                    &[],
                ),
            ],
        );

        assert_eq!(feature_f64(&store, "s1", "abandoned"), 1.0);
        assert_eq!(feature_f64(&store, "s1", "has_pr_link"), 1.0);
    }

    #[test]
    fn subagent_metrics_from_progress_entries() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_writer(|conn| {
                for e in [
                    prompt("e1", "s1", "2025-03-01T10:00:00Z", "go"),
                    prompt("e2", "s1", "2025-03-01T10:01:00Z", "continue"),
                ] {
                    entries::upsert_raw_entry(conn, &e)?;
                }
                for (id, kind, parent, tool, error) in [
                    ("p1", ProgressKind::AgentProgress, Some("t1"), Some("Read"), false),
                    ("p2", ProgressKind::AgentProgress, Some("t1"), Some("Grep"), true),
                    ("p3", ProgressKind::AgentProgress, Some("t2"), Some("Read"), false),
                    ("p4", ProgressKind::BashProgress, None, None, false),
                ] {
                    let entry = ProgressEntry {
                        entry_id: id.to_string(),
                        session_id: "s1".to_string(),
                        progress_type: kind,
                        parent_tool_id: parent.map(String::from),
                        tool_name: tool.map(String::from),
                        has_result: true,
                        result_error: error,
                        timestamp_utc: "2025-03-01T10:00:30Z".to_string(),
                    };
                    entries::upsert_progress_entry(conn, &entry)?;
                }
                Ok(())
            })
            .unwrap();
        build_sessions(&store).unwrap();
        extract_features(&store).unwrap();

        assert_eq!(feature_f64(&store, "s1", "subagent_spawn_count"), 2.0);
        assert_eq!(feature_f64(&store, "s1", "subagent_tool_diversity"), 2.0);
        let rate = feature_f64(&store, "s1", "subagent_error_rate");
        assert!((rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(feature_f64(&store, "s1", "bash_heartbeat_count"), 1.0);
    }

    #[test]
    fn rebuild_drops_stale_rows() {
        let store = Store::open_in_memory().unwrap();
        seed_and_extract(
            &store,
            &[
                prompt("e1", "s1", "2025-03-01T10:00:00Z", "one"),
                prompt("e2", "s1", "2025-03-01T10:01:00Z", "two"),
            ],
        );

        store
            .with_writer(|conn| {
                conn.execute("DELETE FROM raw_entries", [])?;
                Ok(())
            })
            .unwrap();
        seed_and_extract(
            &store,
            &[
                prompt("f1", "s2", "2025-03-02T10:00:00Z", "one"),
                prompt("f2", "s2", "2025-03-02T10:01:00Z", "two"),
            ],
        );

        let stale: i64 = store
            .with_writer(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM session_features WHERE session_id = 's1'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(stale, 0);
    }
}
