use agretro_types::{ProgressEntry, RawEntry};
use rusqlite::{Connection, params};

use crate::{Error, Result};

/// Serialize a list column. Empty lists become NULL so SQL that counts
/// separators over the text sees no phantom element.
fn json_list(values: &[String]) -> Result<Option<String>> {
    if values.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(values)
        .map(Some)
        .map_err(|e| Error::Query(format!("serialize list column: {}", e)))
}

fn char_len(text: &Option<String>) -> Option<i64> {
    text.as_ref().map(|t| t.chars().count() as i64)
}

/// Idempotent upsert keyed on entry_id; re-ingesting an unchanged file
/// rewrites identical rows.
pub fn upsert_raw_entry(conn: &Connection, entry: &RawEntry) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO raw_entries (
            entry_id, session_id, project_name, entry_type, timestamp_utc,
            parent_uuid, is_sidechain, user_text, user_text_length,
            is_tool_result, tool_result_error, tool_result_error_type,
            model, content_types, tool_names, tool_file_paths,
            tool_input_preview, text_content, text_length,
            input_tokens, output_tokens, system_subtype, duration_ms,
            git_branch, cwd
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                  ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)
        "#,
        params![
            &entry.entry_id,
            &entry.session_id,
            &entry.project_name,
            entry.kind.as_str(),
            &entry.timestamp_utc,
            &entry.parent_uuid,
            entry.is_sidechain,
            &entry.user_text,
            char_len(&entry.user_text),
            entry.is_tool_result,
            entry.tool_result_error,
            entry.tool_result_error_type.map(|k| k.as_str()),
            &entry.model,
            json_list(&entry.content_types)?,
            json_list(&entry.tool_names)?,
            json_list(&entry.tool_file_paths)?,
            &entry.tool_input_preview,
            &entry.text_content,
            char_len(&entry.text_content),
            entry.input_tokens,
            entry.output_tokens,
            &entry.system_subtype,
            entry.duration_ms,
            &entry.git_branch,
            &entry.cwd,
        ],
    )?;
    Ok(())
}

pub fn upsert_progress_entry(conn: &Connection, entry: &ProgressEntry) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO progress_entries (
            entry_id, session_id, progress_type, parent_tool_id,
            tool_name, has_result, result_error, timestamp_utc
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            &entry.entry_id,
            &entry.session_id,
            entry.progress_type.as_str(),
            &entry.parent_tool_id,
            &entry.tool_name,
            entry.has_result,
            entry.result_error,
            &entry.timestamp_utc,
        ],
    )?;
    Ok(())
}

/// Additive merge into the per-session extension histogram.
pub fn bump_language(
    conn: &Connection,
    session_id: &str,
    extension: &str,
    count: i64,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_languages (session_id, extension, file_count)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(session_id, extension) DO UPDATE SET
            file_count = file_count + excluded.file_count
        "#,
        params![session_id, extension, count],
    )?;
    Ok(())
}

pub fn language_histogram(conn: &Connection, session_id: &str) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT extension, file_count
        FROM session_languages
        WHERE session_id = ?1
        ORDER BY file_count DESC, extension
        "#,
    )?;

    let rows = stmt
        .query_map([session_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}
