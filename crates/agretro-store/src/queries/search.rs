use rusqlite::Connection;

use crate::Result;
use crate::records::SearchHit;

/// Drops and refills the FTS table from raw entries. Runs inside the
/// caller's transaction so a failed rebuild leaves the old index intact.
pub fn rebuild(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM messages_fts", [])?;
    let indexed = conn.execute(
        r#"
        INSERT INTO messages_fts (content, session_id, entry_type)
        SELECT COALESCE(user_text, '') || ' ' || COALESCE(text_content, ''),
               session_id,
               entry_type
        FROM raw_entries
        WHERE (user_text IS NOT NULL AND user_text != '')
           OR (text_content IS NOT NULL AND text_content != '')
        "#,
        [],
    )?;
    Ok(indexed)
}

pub fn search(conn: &Connection, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT session_id, entry_type, snippet(messages_fts, 0, '[', ']', '...', 20)
        FROM messages_fts
        WHERE messages_fts MATCH ?1
        ORDER BY rank
        LIMIT ?2
        "#,
    )?;

    let hits = stmt
        .query_map(rusqlite::params![query, limit as i64], |row| {
            Ok(SearchHit {
                session_id: row.get(0)?,
                entry_type: row.get(1)?,
                snippet: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(hits)
}
