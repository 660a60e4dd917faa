use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::Result;
use crate::records::{SessionRow, ToolUsageRow};

const SESSION_COLUMNS: &str = "session_id, project_name, started_at, ended_at, duration_seconds, \
     user_prompt_count, assistant_msg_count, tool_use_count, tool_error_count, turn_count, \
     first_prompt, intent, trajectory, convergence_score, drift_score, thrash_score";

fn session_from_row(row: &Row<'_>) -> std::result::Result<SessionRow, rusqlite::Error> {
    Ok(SessionRow {
        session_id: row.get(0)?,
        project_name: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
        duration_seconds: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
        user_prompt_count: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        assistant_msg_count: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        tool_use_count: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        tool_error_count: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
        turn_count: row.get::<_, Option<i64>>(9)?.unwrap_or(0),
        first_prompt: row.get(10)?,
        intent: row.get(11)?,
        trajectory: row.get(12)?,
        convergence_score: row.get::<_, Option<f64>>(13)?.unwrap_or(0.0),
        drift_score: row.get::<_, Option<f64>>(14)?.unwrap_or(0.0),
        thrash_score: row.get::<_, Option<f64>>(15)?.unwrap_or(0.0),
    })
}

pub fn list(
    conn: &Connection,
    project: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<SessionRow>> {
    let limit_clause = limit.map(|l| format!("LIMIT {}", l)).unwrap_or_default();

    let sessions = if let Some(project) = project {
        let query = format!(
            "SELECT {} FROM sessions WHERE project_name = ?1 ORDER BY started_at DESC {}",
            SESSION_COLUMNS, limit_clause
        );
        let mut stmt = conn.prepare(&query)?;
        stmt.query_map([project], session_from_row)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?
    } else {
        let query = format!(
            "SELECT {} FROM sessions ORDER BY started_at DESC {}",
            SESSION_COLUMNS, limit_clause
        );
        let mut stmt = conn.prepare(&query)?;
        stmt.query_map([], session_from_row)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?
    };

    Ok(sessions)
}

pub fn get(conn: &Connection, session_id: &str) -> Result<Option<SessionRow>> {
    let query = format!(
        "SELECT {} FROM sessions WHERE session_id = ?1",
        SESSION_COLUMNS
    );
    let session = conn
        .query_row(&query, [session_id], session_from_row)
        .optional()?;
    Ok(session)
}

pub fn count(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
    Ok(count)
}

pub fn tool_usage_for(conn: &Connection, session_id: &str) -> Result<Vec<ToolUsageRow>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT session_id, tool_name, use_count, error_count
        FROM session_tool_usage
        WHERE session_id = ?1
        ORDER BY use_count DESC, tool_name
        "#,
    )?;

    let rows = stmt
        .query_map([session_id], |row| {
            Ok(ToolUsageRow {
                session_id: row.get(0)?,
                tool_name: row.get(1)?,
                use_count: row.get(2)?,
                error_count: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

/// Sessions to present for judging: at least one turn and no judgment yet
/// (or all qualifying sessions when `force`).
pub fn unjudged(conn: &Connection, force: bool) -> Result<Vec<SessionRow>> {
    let query = if force {
        format!(
            "SELECT {} FROM sessions s WHERE s.turn_count >= 1 ORDER BY s.started_at",
            prefixed_columns("s")
        )
    } else {
        format!(
            "SELECT {} FROM sessions s \
             LEFT JOIN session_judgments j ON s.session_id = j.session_id \
             WHERE j.session_id IS NULL AND s.turn_count >= 1 \
             ORDER BY s.started_at",
            prefixed_columns("s")
        )
    };

    let mut stmt = conn.prepare(&query)?;
    let sessions = stmt
        .query_map([], session_from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(sessions)
}

fn prefixed_columns(alias: &str) -> String {
    SESSION_COLUMNS
        .split(", ")
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn insert_session(conn: &Connection, id: &str, project: &str, started: &str, turns: i64) {
        conn.execute(
            r#"
            INSERT INTO sessions (session_id, project_name, started_at, ended_at, duration_seconds,
                                  user_prompt_count, assistant_msg_count, tool_use_count,
                                  tool_error_count, turn_count, first_prompt)
            VALUES (?1, ?2, ?3, ?3, 60.0, 2, 3, 4, 0, ?4, 'do the thing')
            "#,
            params![id, project, started, turns],
        )
        .unwrap();
    }

    #[test]
    fn test_list_orders_newest_first() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_writer(|conn| {
                insert_session(conn, "s1", "claude:alpha", "2025-01-01T00:00:00Z", 3);
                insert_session(conn, "s2", "claude:alpha", "2025-01-03T00:00:00Z", 3);
                insert_session(conn, "s3", "codex:beta", "2025-01-02T00:00:00Z", 3);
                Ok(())
            })
            .unwrap();

        let all = store.list_sessions(None, 10).unwrap();
        assert_eq!(
            all.iter().map(|s| s.session_id.as_str()).collect::<Vec<_>>(),
            vec!["s2", "s3", "s1"]
        );

        let alpha = store.list_sessions(Some("claude:alpha"), 10).unwrap();
        assert_eq!(alpha.len(), 2);

        let limited = store.list_sessions(None, 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].session_id, "s2");
    }

    #[test]
    fn test_get_returns_none_for_missing() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_session("nope").unwrap().is_none());
    }

    #[test]
    fn test_unjudged_excludes_judged_sessions() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_writer(|conn| {
                insert_session(conn, "s1", "claude:alpha", "2025-01-01T00:00:00Z", 3);
                insert_session(conn, "s2", "claude:alpha", "2025-01-02T00:00:00Z", 3);
                insert_session(conn, "s0", "claude:alpha", "2025-01-03T00:00:00Z", 0);
                conn.execute(
                    "INSERT INTO session_judgments (session_id, outcome) VALUES ('s1', 'success')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let pending = store.with_reader(|conn| unjudged(conn, false)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].session_id, "s2");

        // Zero-turn sessions are never judged, even when forced.
        let forced = store.with_reader(|conn| unjudged(conn, true)).unwrap();
        assert_eq!(forced.len(), 2);
    }
}
