//! Per-session tool call and error tallies.

use std::collections::{BTreeMap, VecDeque};

use agretro_store::Store;
use anyhow::Result;
use rusqlite::params;

#[derive(Default)]
struct Tally {
    uses: i64,
    errors: i64,
}

/// Rebuild session_tool_usage by replaying each session's entries.
///
/// Assistant entries contribute their tool batch to the use counts and
/// become the pending batch; tool-result entries consume the pending
/// batch front-to-back, attributing errors to the tool they answer. A
/// plain user prompt is a turn boundary and discards whatever is still
/// pending. Returns the number of (session, tool) rows written.
pub fn build_tool_usage(store: &Store) -> Result<i64> {
    let rows = store.with_writer(|conn| {
        let mut stmt = conn.prepare(
            "SELECT session_id, entry_type, is_tool_result, tool_result_error, tool_names
             FROM raw_entries
             WHERE session_id IN (SELECT session_id FROM sessions)
             ORDER BY session_id, timestamp_utc, entry_id",
        )?;
        let mut entry_rows = stmt.query([])?;

        let mut tallies: BTreeMap<(String, String), Tally> = BTreeMap::new();
        let mut pending: VecDeque<String> = VecDeque::new();
        let mut current_session = String::new();

        while let Some(row) = entry_rows.next()? {
            let session_id: String = row.get(0)?;
            let entry_type: String = row.get(1)?;
            let is_tool_result: bool = row.get(2)?;
            let tool_result_error: bool = row.get(3)?;
            let tool_names: Option<String> = row.get(4)?;

            if session_id != current_session {
                current_session = session_id.clone();
                pending.clear();
            }

            match entry_type.as_str() {
                "assistant" => {
                    let tools: Vec<String> = tool_names
                        .as_deref()
                        .map(|t| serde_json::from_str(t).unwrap_or_default())
                        .unwrap_or_default();
                    if !tools.is_empty() {
                        for tool in &tools {
                            tallies
                                .entry((session_id.clone(), tool.clone()))
                                .or_default()
                                .uses += 1;
                        }
                        pending = tools.into();
                    }
                }
                "user" if is_tool_result => {
                    if let Some(tool) = pending.pop_front()
                        && tool_result_error
                    {
                        tallies
                            .entry((session_id.clone(), tool))
                            .or_default()
                            .errors += 1;
                    }
                }
                "user" => pending.clear(),
                _ => {}
            }
        }
        drop(entry_rows);
        drop(stmt);

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM session_tool_usage", [])?;
        for ((session_id, tool_name), tally) in &tallies {
            tx.execute(
                "INSERT INTO session_tool_usage (session_id, tool_name, use_count, error_count)
                 VALUES (?1, ?2, ?3, ?4)",
                params![session_id, tool_name, tally.uses, tally.errors],
            )?;
        }
        tx.commit()?;
        Ok(tallies.len() as i64)
    })?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::sessions::build_sessions;
    use agretro_store::entries;
    use agretro_types::{EntryKind, RawEntry};

    fn prompt(id: &str, session: &str, ts: &str, text: &str) -> RawEntry {
        let mut e = RawEntry::new(id, session, "claude:demo", EntryKind::User, ts);
        e.user_text = Some(text.to_string());
        e
    }

    fn tool_call(id: &str, session: &str, ts: &str, tools: &[&str]) -> RawEntry {
        let mut e = RawEntry::new(id, session, "claude:demo", EntryKind::Assistant, ts);
        e.tool_names = tools.iter().map(|t| t.to_string()).collect();
        e
    }

    fn tool_result(id: &str, session: &str, ts: &str, error: bool) -> RawEntry {
        let mut e = RawEntry::new(id, session, "claude:demo", EntryKind::User, ts);
        e.is_tool_result = true;
        e.tool_result_error = error;
        e.user_text = Some(if error { "boom" } else { "ok" }.to_string());
        e
    }

    fn seed_and_build(store: &Store, rows: &[RawEntry]) {
        store
            .with_writer(|conn| {
                for e in rows {
                    entries::upsert_raw_entry(conn, e)?;
                }
                Ok(())
            })
            .unwrap();
        build_sessions(store).unwrap();
    }

    #[test]
    fn counts_uses_across_batches() {
        let store = Store::open_in_memory().unwrap();
        seed_and_build(
            &store,
            &[
                prompt("e1", "s1", "2025-03-01T10:00:00Z", "go"),
                tool_call("e2", "s1", "2025-03-01T10:00:10Z", &["Read", "Edit"]),
                tool_call("e3", "s1", "2025-03-01T10:00:20Z", &["Edit"]),
            ],
        );

        assert_eq!(build_tool_usage(&store).unwrap(), 2);
        let usage = store.tool_usage("s1").unwrap();
        let edit = usage.iter().find(|u| u.tool_name == "Edit").unwrap();
        let read = usage.iter().find(|u| u.tool_name == "Read").unwrap();
        assert_eq!(edit.use_count, 2);
        assert_eq!(read.use_count, 1);
        assert_eq!(edit.error_count, 0);
    }

    #[test]
    fn attributes_errors_in_batch_order() {
        let store = Store::open_in_memory().unwrap();
        seed_and_build(
            &store,
            &[
                prompt("e1", "s1", "2025-03-01T10:00:00Z", "go"),
                tool_call("e2", "s1", "2025-03-01T10:00:10Z", &["Edit", "Bash"]),
                tool_result("e3", "s1", "2025-03-01T10:00:11Z", false),
                tool_result("e4", "s1", "2025-03-01T10:00:12Z", true),
            ],
        );

        build_tool_usage(&store).unwrap();
        let usage = store.tool_usage("s1").unwrap();
        let edit = usage.iter().find(|u| u.tool_name == "Edit").unwrap();
        let bash = usage.iter().find(|u| u.tool_name == "Bash").unwrap();
        assert_eq!(edit.error_count, 0);
        assert_eq!(bash.error_count, 1);
    }

    #[test]
    fn prompt_boundary_discards_pending_results() {
        let store = Store::open_in_memory().unwrap();
        seed_and_build(
            &store,
            &[
                prompt("e1", "s1", "2025-03-01T10:00:00Z", "go"),
                tool_call("e2", "s1", "2025-03-01T10:00:10Z", &["Edit"]),
                prompt("e3", "s1", "2025-03-01T10:00:20Z", "stop, do something else"),
                // Stray error after the boundary must not hit Edit.
                tool_result("e4", "s1", "2025-03-01T10:00:21Z", true),
            ],
        );

        build_tool_usage(&store).unwrap();
        let usage = store.tool_usage("s1").unwrap();
        let edit = usage.iter().find(|u| u.tool_name == "Edit").unwrap();
        assert_eq!(edit.use_count, 1);
        assert_eq!(edit.error_count, 0);
    }

    #[test]
    fn new_batch_replaces_pending_queue() {
        let store = Store::open_in_memory().unwrap();
        seed_and_build(
            &store,
            &[
                prompt("e1", "s1", "2025-03-01T10:00:00Z", "go"),
                tool_call("e2", "s1", "2025-03-01T10:00:10Z", &["Read", "Read"]),
                // Only one of two results arrives before the next batch.
                tool_result("e3", "s1", "2025-03-01T10:00:11Z", false),
                tool_call("e4", "s1", "2025-03-01T10:00:20Z", &["Bash"]),
                tool_result("e5", "s1", "2025-03-01T10:00:21Z", true),
            ],
        );

        build_tool_usage(&store).unwrap();
        let usage = store.tool_usage("s1").unwrap();
        let bash = usage.iter().find(|u| u.tool_name == "Bash").unwrap();
        let read = usage.iter().find(|u| u.tool_name == "Read").unwrap();
        assert_eq!(bash.error_count, 1);
        assert_eq!(read.error_count, 0);
    }

    #[test]
    fn rebuild_is_a_full_replacement() {
        let store = Store::open_in_memory().unwrap();
        seed_and_build(
            &store,
            &[
                prompt("e1", "s1", "2025-03-01T10:00:00Z", "go"),
                tool_call("e2", "s1", "2025-03-01T10:00:10Z", &["Read"]),
            ],
        );
        build_tool_usage(&store).unwrap();

        store
            .with_writer(|conn| {
                conn.execute("DELETE FROM raw_entries", [])?;
                Ok(())
            })
            .unwrap();
        seed_and_build(
            &store,
            &[
                prompt("f1", "s2", "2025-03-02T10:00:00Z", "go"),
                tool_call("f2", "s2", "2025-03-02T10:00:10Z", &["Bash"]),
            ],
        );

        assert_eq!(build_tool_usage(&store).unwrap(), 1);
        assert!(store.tool_usage("s1").unwrap().is_empty());
        assert_eq!(store.tool_usage("s2").unwrap().len(), 1);
    }
}
