use rusqlite::Connection;

use crate::Result;

// NOTE: Store layout
//
// Two tiers of tables with different write disciplines:
// - Ingested tables (raw_entries, progress_entries, session_languages,
//   ingestion_log, skip_cache) are written incrementally, one transaction
//   per source file, with idempotent upserts keyed on stable ids.
// - Derived tables (sessions, session_features, session_tool_usage,
//   baselines, prescriptions, session_skills, skill_profile, skill_nudges,
//   session_judgments, synthesis, messages_fts) are owned by exactly one
//   pipeline stage each and rebuilt wholesale inside that stage's
//   transaction. Dismissal flags are the only state that survives a
//   rebuild.
//
// Migrations are additive only: new columns arrive via ALTER TABLE ADD
// COLUMN guarded by a table_info probe, so reopening an old store upgrades
// it in place and reopening a current store is a no-op.

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS raw_entries (
            entry_id TEXT PRIMARY KEY,
            session_id TEXT,
            project_name TEXT,
            entry_type TEXT,
            timestamp_utc TEXT,
            parent_uuid TEXT,
            is_sidechain INTEGER DEFAULT 0,
            user_text TEXT,
            user_text_length INTEGER,
            is_tool_result INTEGER DEFAULT 0,
            tool_result_error INTEGER DEFAULT 0,
            tool_result_error_type TEXT,
            model TEXT,
            content_types TEXT,
            tool_names TEXT,
            tool_file_paths TEXT,
            tool_input_preview TEXT,
            text_content TEXT,
            text_length INTEGER,
            input_tokens INTEGER,
            output_tokens INTEGER,
            system_subtype TEXT,
            duration_ms INTEGER,
            git_branch TEXT,
            cwd TEXT
        );

        CREATE TABLE IF NOT EXISTS progress_entries (
            entry_id TEXT PRIMARY KEY,
            session_id TEXT,
            progress_type TEXT,
            parent_tool_id TEXT,
            tool_name TEXT,
            has_result INTEGER DEFAULT 0,
            result_error INTEGER DEFAULT 0,
            timestamp_utc TEXT
        );

        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            project_name TEXT,
            started_at TEXT,
            ended_at TEXT,
            duration_seconds REAL,
            user_prompt_count INTEGER,
            assistant_msg_count INTEGER,
            tool_use_count INTEGER,
            tool_error_count INTEGER,
            turn_count INTEGER,
            first_prompt TEXT,
            intent TEXT DEFAULT 'unknown',
            trajectory TEXT DEFAULT 'unknown',
            convergence_score REAL DEFAULT 0.0,
            drift_score REAL DEFAULT 0.0,
            thrash_score REAL DEFAULT 0.0
        );

        CREATE TABLE IF NOT EXISTS session_features (
            session_id TEXT PRIMARY KEY,
            avg_prompt_length REAL DEFAULT 0,
            prompt_length_trend REAL DEFAULT 0,
            max_prompt_length INTEGER DEFAULT 0,
            avg_response_length REAL DEFAULT 0,
            response_length_trend REAL DEFAULT 0,
            response_length_cv REAL DEFAULT 0,
            total_input_tokens INTEGER DEFAULT 0,
            total_output_tokens INTEGER DEFAULT 0,
            edit_write_ratio REAL DEFAULT 0,
            read_grep_ratio REAL DEFAULT 0,
            bash_ratio REAL DEFAULT 0,
            task_ratio REAL DEFAULT 0,
            web_ratio REAL DEFAULT 0,
            unique_tools_used INTEGER DEFAULT 0,
            avg_turn_duration_ms REAL DEFAULT 0,
            hour_of_day INTEGER DEFAULT 0,
            day_of_week INTEGER DEFAULT 0,
            correction_count INTEGER DEFAULT 0,
            correction_rate REAL DEFAULT 0,
            rephrasing_count INTEGER DEFAULT 0,
            decision_marker_count INTEGER DEFAULT 0,
            topic_keyword_entropy REAL DEFAULT 0,
            sidechain_count INTEGER DEFAULT 0,
            sidechain_ratio REAL DEFAULT 0,
            abandoned INTEGER DEFAULT 0,
            has_pr_link INTEGER DEFAULT 0,
            branch_switch_count INTEGER DEFAULT 0,
            prompt_length_oscillation REAL DEFAULT 0,
            api_error_count INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS session_tool_usage (
            session_id TEXT,
            tool_name TEXT,
            use_count INTEGER DEFAULT 0,
            error_count INTEGER DEFAULT 0,
            PRIMARY KEY (session_id, tool_name)
        );

        CREATE TABLE IF NOT EXISTS session_languages (
            session_id TEXT,
            extension TEXT,
            file_count INTEGER DEFAULT 0,
            PRIMARY KEY (session_id, extension)
        );

        CREATE TABLE IF NOT EXISTS baselines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            window_size INTEGER,
            computed_at TEXT DEFAULT CURRENT_TIMESTAMP,
            avg_convergence REAL,
            avg_drift REAL,
            avg_thrash REAL,
            avg_duration REAL,
            avg_turns REAL,
            avg_tool_errors REAL,
            avg_correction_rate REAL,
            session_count INTEGER
        );

        CREATE TABLE IF NOT EXISTS prescriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT,
            title TEXT,
            description TEXT,
            evidence TEXT,
            confidence REAL,
            dismissed INTEGER DEFAULT 0,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS session_judgments (
            session_id TEXT PRIMARY KEY,
            outcome TEXT,
            outcome_confidence REAL,
            outcome_reasoning TEXT,
            prompt_clarity REAL,
            prompt_completeness REAL,
            prompt_missing TEXT,
            prompt_summary TEXT,
            trajectory_summary TEXT,
            underspecified_parts TEXT,
            misalignment_count INTEGER,
            misalignments TEXT,
            correction_count INTEGER,
            corrections TEXT,
            productive_turns INTEGER,
            waste_turns INTEGER,
            productivity_ratio REAL,
            waste_breakdown TEXT,
            narrative TEXT,
            what_worked TEXT,
            what_failed TEXT,
            user_quote TEXT,
            claude_md_suggestion TEXT,
            claude_md_rationale TEXT,
            raw_analysis TEXT,
            judged_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS session_skills (
            session_id TEXT PRIMARY KEY,
            d1_level INTEGER DEFAULT 0, d1_opportunity INTEGER DEFAULT 0,
            d2_level INTEGER DEFAULT 0, d2_opportunity INTEGER DEFAULT 0,
            d3_level INTEGER DEFAULT 0, d3_opportunity INTEGER DEFAULT 0,
            d4_level INTEGER DEFAULT 0, d4_opportunity INTEGER DEFAULT 0,
            d5_level INTEGER DEFAULT 0, d5_opportunity INTEGER DEFAULT 0,
            d6_level INTEGER DEFAULT 0, d6_opportunity INTEGER DEFAULT 0,
            d7_level INTEGER DEFAULT 0, d7_opportunity INTEGER DEFAULT 0,
            d8_level INTEGER DEFAULT 0, d8_opportunity INTEGER DEFAULT 0,
            d9_level INTEGER DEFAULT 0, d9_opportunity INTEGER DEFAULT 0,
            d10_level INTEGER DEFAULT 0, d10_opportunity INTEGER DEFAULT 0,
            detection_confidence REAL DEFAULT 0.0,
            assessed_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS skill_profile (
            id INTEGER PRIMARY KEY DEFAULT 1,
            d1_score REAL DEFAULT 0.0,
            d2_score REAL DEFAULT 0.0,
            d3_score REAL DEFAULT 0.0,
            d4_score REAL DEFAULT 0.0,
            d5_score REAL DEFAULT 0.0,
            d6_score REAL DEFAULT 0.0,
            d7_score REAL DEFAULT 0.0,
            d8_score REAL DEFAULT 0.0,
            d9_score REAL DEFAULT 0.0,
            d10_score REAL DEFAULT 0.0,
            gap_1 TEXT,
            gap_2 TEXT,
            gap_3 TEXT,
            session_count INTEGER DEFAULT 0,
            computed_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS skill_nudges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dimension TEXT,
            current_level INTEGER,
            target_level INTEGER,
            nudge_text TEXT,
            evidence TEXT,
            frequency INTEGER DEFAULT 1,
            dismissed INTEGER DEFAULT 0,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS synthesis (
            id INTEGER PRIMARY KEY DEFAULT 1,
            at_a_glance TEXT,
            usage_narrative TEXT,
            top_wins TEXT,
            top_friction TEXT,
            claude_md_additions TEXT,
            fun_headline TEXT,
            generated_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS ingestion_log (
            file_path TEXT PRIMARY KEY,
            mtime REAL,
            entry_count INTEGER,
            ingested_at TEXT
        );

        CREATE TABLE IF NOT EXISTS skip_cache (
            file_path TEXT PRIMARY KEY,
            mtime REAL,
            error_type TEXT,
            error_message TEXT,
            skip_until TEXT,
            cached_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
            content,
            session_id UNINDEXED,
            entry_type UNINDEXED,
            tokenize='porter unicode61'
        );

        CREATE INDEX IF NOT EXISTS idx_raw_entries_session ON raw_entries(session_id);
        CREATE INDEX IF NOT EXISTS idx_raw_entries_timestamp ON raw_entries(timestamp_utc);
        CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_name);
        CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);
        CREATE INDEX IF NOT EXISTS idx_progress_session ON progress_entries(session_id);
        CREATE INDEX IF NOT EXISTS idx_progress_type ON progress_entries(progress_type);
        "#,
    )?;

    run_migrations(conn)?;

    Ok(())
}

/// Columns added after the initial schema shipped. Applied on every open.
fn run_migrations(conn: &Connection) -> Result<()> {
    ensure_column(
        conn,
        "session_features",
        "subagent_spawn_count",
        "INTEGER DEFAULT 0",
    )?;
    ensure_column(
        conn,
        "session_features",
        "subagent_tool_diversity",
        "INTEGER DEFAULT 0",
    )?;
    ensure_column(
        conn,
        "session_features",
        "subagent_error_rate",
        "REAL DEFAULT 0.0",
    )?;
    ensure_column(
        conn,
        "session_features",
        "bash_heartbeat_count",
        "INTEGER DEFAULT 0",
    )?;
    Ok(())
}

/// Add `column` to `table` unless it already exists. Returns whether the
/// column was added.
pub(crate) fn ensure_column(
    conn: &Connection,
    table: &str,
    column: &str,
    decl: &str,
) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|name| name.ok())
        .any(|name| name == column);

    if exists {
        return Ok(false);
    }

    conn.execute(
        &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl),
        [],
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        // A second pass must not fail or re-add columns.
        init_schema(&conn).unwrap();

        let mut stmt = conn.prepare("PRAGMA table_info(session_features)").unwrap();
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .filter_map(|name| name.ok())
            .collect();

        assert_eq!(
            columns
                .iter()
                .filter(|c| c.as_str() == "bash_heartbeat_count")
                .count(),
            1
        );
        assert!(columns.iter().any(|c| c == "subagent_spawn_count"));
        assert!(columns.iter().any(|c| c == "subagent_tool_diversity"));
        assert!(columns.iter().any(|c| c == "subagent_error_rate"));
    }

    #[test]
    fn test_migration_upgrades_old_table() {
        let conn = Connection::open_in_memory().unwrap();
        // A features table from before the subagent columns existed.
        conn.execute_batch(
            "CREATE TABLE session_features (session_id TEXT PRIMARY KEY, avg_prompt_length REAL)",
        )
        .unwrap();

        assert!(
            ensure_column(&conn, "session_features", "bash_heartbeat_count", "INTEGER DEFAULT 0")
                .unwrap()
        );
        assert!(
            !ensure_column(&conn, "session_features", "bash_heartbeat_count", "INTEGER DEFAULT 0")
                .unwrap()
        );
    }

    #[test]
    fn test_fts_table_exists() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO messages_fts (content, session_id, entry_type) VALUES ('fix the parser', 's1', 'user')",
            [],
        )
        .unwrap();

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages_fts WHERE messages_fts MATCH 'parser'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);
    }
}
