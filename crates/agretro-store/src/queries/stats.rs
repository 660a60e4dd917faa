use rusqlite::Connection;

use crate::Result;

/// Whole-store counters shown after ingestion and by `status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreTotals {
    pub entries: i64,
    pub progress_entries: i64,
    pub sessions: i64,
    pub projects: i64,
}

pub fn totals(conn: &Connection) -> Result<StoreTotals> {
    let entries = conn.query_row("SELECT COUNT(*) FROM raw_entries", [], |row| row.get(0))?;
    let progress_entries =
        conn.query_row("SELECT COUNT(*) FROM progress_entries", [], |row| row.get(0))?;
    let sessions = conn.query_row(
        "SELECT COUNT(DISTINCT session_id) FROM raw_entries WHERE session_id IS NOT NULL",
        [],
        |row| row.get(0),
    )?;
    let projects = conn.query_row(
        "SELECT COUNT(DISTINCT project_name) FROM raw_entries WHERE project_name IS NOT NULL",
        [],
        |row| row.get(0),
    )?;

    Ok(StoreTotals {
        entries,
        progress_entries,
        sessions,
        projects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use agretro_types::{EntryKind, RawEntry};

    #[test]
    fn test_totals_count_distinct_sessions_and_projects() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_writer(|conn| {
                for (id, session, project) in [
                    ("e1", "s1", "claude:alpha"),
                    ("e2", "s1", "claude:alpha"),
                    ("e3", "s2", "codex:beta"),
                ] {
                    let entry =
                        RawEntry::new(id, session, project, EntryKind::User, "2025-01-01T00:00:00Z");
                    crate::queries::entries::upsert_raw_entry(conn, &entry)?;
                }
                Ok(())
            })
            .unwrap();

        let totals = store.totals().unwrap();
        assert_eq!(totals.entries, 3);
        assert_eq!(totals.progress_entries, 0);
        assert_eq!(totals.sessions, 2);
        assert_eq!(totals.projects, 2);
    }
}
