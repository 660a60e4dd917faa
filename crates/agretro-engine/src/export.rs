//! CSV export of the sessions table.

use std::io::Write;

use agretro_store::{Store, sessions};
use anyhow::Result;

/// Streams every session row as CSV, newest first. Returns the row count.
pub fn export_sessions_csv<W: Write>(store: &Store, out: W) -> Result<usize> {
    let rows = store.with_reader(|conn| sessions::list(conn, None, None))?;

    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record([
        "session_id",
        "project_name",
        "started_at",
        "ended_at",
        "duration_seconds",
        "user_prompt_count",
        "assistant_msg_count",
        "tool_use_count",
        "tool_error_count",
        "turn_count",
        "first_prompt",
        "intent",
        "trajectory",
        "convergence_score",
        "drift_score",
        "thrash_score",
    ])?;

    for s in &rows {
        wtr.write_record([
            s.session_id.as_str(),
            s.project_name.as_deref().unwrap_or(""),
            s.started_at.as_deref().unwrap_or(""),
            s.ended_at.as_deref().unwrap_or(""),
            &s.duration_seconds.to_string(),
            &s.user_prompt_count.to_string(),
            &s.assistant_msg_count.to_string(),
            &s.tool_use_count.to_string(),
            &s.tool_error_count.to_string(),
            &s.turn_count.to_string(),
            s.first_prompt.as_deref().unwrap_or(""),
            &s.intent,
            &s.trajectory,
            &s.convergence_score.to_string(),
            &s.drift_score.to_string(),
            &s.thrash_score.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_exports_only_the_header() {
        let store = Store::open_in_memory().unwrap();
        let mut buf = Vec::new();

        let count = export_sessions_csv(&store, &mut buf).unwrap();
        assert_eq!(count, 0);

        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("session_id,project_name,started_at"));
    }

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .with_writer(|conn| {
                conn.execute(
                    "INSERT INTO sessions (session_id, project_name, started_at, duration_seconds,
                                           user_prompt_count, assistant_msg_count, tool_use_count,
                                           tool_error_count, turn_count, first_prompt)
                     VALUES ('s-old', 'claude:alpha', '2026-01-10T09:00:00Z', 120.0,
                             2, 3, 4, 0, 2, 'fix the build, please')",
                    [],
                )?;
                conn.execute(
                    "INSERT INTO sessions (session_id, project_name, started_at, duration_seconds,
                                           user_prompt_count, assistant_msg_count, tool_use_count,
                                           tool_error_count, turn_count, first_prompt)
                     VALUES ('s-new', 'codex:beta', '2026-02-01T09:00:00Z', 60.0,
                             1, 1, 0, 0, 1, 'add a flag')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn sessions_come_out_newest_first_with_prompts_quoted() {
        let store = seeded_store();

        let mut buf = Vec::new();
        let count = export_sessions_csv(&store, &mut buf).unwrap();
        assert_eq!(count, 2);

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("s-new,codex:beta,"));
        assert!(lines[2].starts_with("s-old,claude:alpha,"));
        assert!(lines[2].contains("\"fix the build, please\""));
    }

    #[test]
    fn csv_shape_stays_stable() {
        let store = seeded_store();

        let mut buf = Vec::new();
        export_sessions_csv(&store, &mut buf).unwrap();

        let text = String::from_utf8(buf).unwrap();
        insta::assert_snapshot!(text, @r#"
        session_id,project_name,started_at,ended_at,duration_seconds,user_prompt_count,assistant_msg_count,tool_use_count,tool_error_count,turn_count,first_prompt,intent,trajectory,convergence_score,drift_score,thrash_score
        s-new,codex:beta,2026-02-01T09:00:00Z,,60,1,1,0,0,1,add a flag,unknown,unknown,0,0,0
        s-old,claude:alpha,2026-01-10T09:00:00Z,,120,2,3,4,0,2,"fix the build, please",unknown,unknown,0,0,0
        "#);
    }
}
