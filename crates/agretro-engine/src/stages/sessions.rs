//! Session aggregation from raw entries.

use agretro_store::{Store, sessions};
use anyhow::Result;

const BUILD_SQL: &str = r#"
INSERT OR REPLACE INTO sessions (
    session_id, project_name, started_at, ended_at, duration_seconds,
    user_prompt_count, assistant_msg_count, tool_use_count, tool_error_count,
    turn_count, first_prompt
)
SELECT
    agg.session_id,
    agg.project_name,
    agg.started_at,
    agg.ended_at,
    agg.duration_seconds,
    agg.user_prompt_count,
    agg.assistant_msg_count,
    agg.tool_use_count,
    agg.tool_error_count,
    agg.turn_count,
    fp.user_text AS first_prompt
FROM (
    SELECT
        session_id,
        MAX(project_name) AS project_name,
        MIN(timestamp_utc) AS started_at,
        MAX(timestamp_utc) AS ended_at,
        CAST((julianday(MAX(timestamp_utc)) - julianday(MIN(timestamp_utc))) * 86400 AS INTEGER)
            AS duration_seconds,
        SUM(CASE WHEN entry_type = 'user' AND NOT is_tool_result AND user_text_length > 0
                 THEN 1 ELSE 0 END) AS user_prompt_count,
        SUM(CASE WHEN entry_type = 'assistant' THEN 1 ELSE 0 END) AS assistant_msg_count,
        COALESCE(SUM(CASE WHEN tool_names IS NOT NULL
                 THEN length(tool_names) - length(REPLACE(tool_names, ',', '')) + 1
                 ELSE 0 END), 0) AS tool_use_count,
        SUM(CASE WHEN tool_result_error = 1 THEN 1 ELSE 0 END) AS tool_error_count,
        SUM(CASE WHEN entry_type = 'system' AND system_subtype = 'turn_duration'
                 THEN 1 ELSE 0 END) AS turn_count
    FROM raw_entries
    WHERE session_id IS NOT NULL
    GROUP BY session_id
    HAVING COUNT(*) >= 2
) agg
LEFT JOIN (
    SELECT session_id, user_text
    FROM raw_entries
    WHERE entry_type = 'user' AND NOT is_tool_result AND user_text_length > 0
      AND (session_id, timestamp_utc) IN (
          SELECT session_id, MIN(timestamp_utc)
          FROM raw_entries
          WHERE entry_type = 'user' AND NOT is_tool_result AND user_text_length > 0
          GROUP BY session_id
      )
) fp ON agg.session_id = fp.session_id
"#;

/// Rebuild the sessions table from raw_entries. Tool uses are counted
/// from the stored tool_names JSON by counting list separators, so no
/// per-row parsing is needed. Single-entry sessions are dropped.
/// Returns the number of sessions built.
pub fn build_sessions(store: &Store) -> Result<i64> {
    let count = store.with_writer(|conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM sessions", [])?;
        tx.execute(BUILD_SQL, [])?;
        tx.commit()?;
        sessions::count(conn)
    })?;
    Ok(count)
}
