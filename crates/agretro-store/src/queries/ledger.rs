use rusqlite::{Connection, OptionalExtension, params};

use crate::Result;
use crate::records::SkipRow;

/// Mtime recorded at the last successful ingest, if any.
pub fn recorded_mtime(conn: &Connection, file_path: &str) -> Result<Option<f64>> {
    let mtime = conn
        .query_row(
            "SELECT mtime FROM ingestion_log WHERE file_path = ?1",
            [file_path],
            |row| row.get(0),
        )
        .optional()?;
    Ok(mtime)
}

/// Record a successful ingest. Called inside the same transaction that
/// wrote the file's entries.
pub fn record_file(conn: &Connection, file_path: &str, mtime: f64, entry_count: i64) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO ingestion_log (file_path, mtime, entry_count, ingested_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![file_path, mtime, entry_count, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn ledger_entry_count(conn: &Connection, file_path: &str) -> Result<Option<i64>> {
    let count = conn
        .query_row(
            "SELECT entry_count FROM ingestion_log WHERE file_path = ?1",
            [file_path],
            |row| row.get(0),
        )
        .optional()?;
    Ok(count)
}

/// Forget every recorded ingest so the next pass re-reads all files.
/// Quarantine entries are left alone.
pub fn clear_ledger(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM ingestion_log", [])?;
    Ok(())
}

/// Mtime recorded by an unexpired quarantine entry, if one is active.
/// Expired entries are ignored so the file gets retried.
pub fn active_skip_mtime(conn: &Connection, file_path: &str) -> Result<Option<f64>> {
    let mtime = conn
        .query_row(
            "SELECT mtime FROM skip_cache WHERE file_path = ?1 AND skip_until > datetime('now')",
            [file_path],
            |row| row.get(0),
        )
        .optional()?;
    Ok(mtime)
}

pub fn skip_entry(conn: &Connection, file_path: &str) -> Result<Option<SkipRow>> {
    let row = conn
        .query_row(
            r#"
            SELECT file_path, mtime, error_type, error_message, skip_until
            FROM skip_cache
            WHERE file_path = ?1
            "#,
            [file_path],
            |row| {
                Ok(SkipRow {
                    file_path: row.get(0)?,
                    mtime: row.get(1)?,
                    error_type: row.get(2)?,
                    error_message: row.get(3)?,
                    skip_until: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Quarantine a file that failed to ingest. The message is capped at 500
/// chars; the retry horizon is one day, but an mtime advance retries
/// sooner.
pub fn mark_skip(
    conn: &Connection,
    file_path: &str,
    mtime: f64,
    error_type: &str,
    error_message: &str,
) -> Result<()> {
    let message: String = error_message.chars().take(500).collect();
    conn.execute(
        r#"
        INSERT OR REPLACE INTO skip_cache (file_path, mtime, error_type, error_message, skip_until, cached_at)
        VALUES (?1, ?2, ?3, ?4, datetime('now', '+1 day'), datetime('now'))
        "#,
        params![file_path, mtime, error_type, message],
    )?;
    Ok(())
}

/// Lift the quarantine after a successful ingest.
pub fn clear_skip(conn: &Connection, file_path: &str) -> Result<()> {
    conn.execute("DELETE FROM skip_cache WHERE file_path = ?1", [file_path])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[test]
    fn test_ledger_round_trip() {
        let store = Store::open_in_memory().unwrap();

        store
            .with_writer(|conn| {
                assert!(recorded_mtime(conn, "/logs/a.jsonl")?.is_none());
                record_file(conn, "/logs/a.jsonl", 1234.5, 7)?;
                Ok(())
            })
            .unwrap();

        let mtime = store
            .with_reader(|conn| recorded_mtime(conn, "/logs/a.jsonl"))
            .unwrap();
        assert_eq!(mtime, Some(1234.5));

        let count = store
            .with_reader(|conn| ledger_entry_count(conn, "/logs/a.jsonl"))
            .unwrap();
        assert_eq!(count, Some(7));
    }

    #[test]
    fn test_skip_cache_round_trip() {
        let store = Store::open_in_memory().unwrap();

        store
            .with_writer(|conn| {
                mark_skip(conn, "/logs/bad.jsonl", 99.0, "Io", "unreadable")?;
                Ok(())
            })
            .unwrap();

        let entry = store
            .with_reader(|conn| skip_entry(conn, "/logs/bad.jsonl"))
            .unwrap()
            .unwrap();
        assert_eq!(entry.mtime, 99.0);
        assert_eq!(entry.error_type, "Io");
        assert_eq!(entry.error_message, "unreadable");

        // Fresh quarantine entries are active for a day.
        let active = store
            .with_reader(|conn| active_skip_mtime(conn, "/logs/bad.jsonl"))
            .unwrap();
        assert_eq!(active, Some(99.0));

        store
            .with_writer(|conn| clear_skip(conn, "/logs/bad.jsonl"))
            .unwrap();
        let entry = store
            .with_reader(|conn| skip_entry(conn, "/logs/bad.jsonl"))
            .unwrap();
        assert!(entry.is_none());
    }

    #[test]
    fn test_skip_message_is_capped() {
        let store = Store::open_in_memory().unwrap();
        let long_message = "x".repeat(2000);

        store
            .with_writer(|conn| mark_skip(conn, "/logs/bad.jsonl", 1.0, "Parse", &long_message))
            .unwrap();

        let entry = store
            .with_reader(|conn| skip_entry(conn, "/logs/bad.jsonl"))
            .unwrap()
            .unwrap();
        assert_eq!(entry.error_message.chars().count(), 500);
    }

    #[test]
    fn test_clear_ledger_keeps_quarantine() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_writer(|conn| {
                record_file(conn, "/logs/a.jsonl", 1.0, 3)?;
                mark_skip(conn, "/logs/bad.jsonl", 2.0, "io_error", "unreadable")?;
                clear_ledger(conn)
            })
            .unwrap();

        assert!(store
            .with_reader(|conn| recorded_mtime(conn, "/logs/a.jsonl"))
            .unwrap()
            .is_none());
        assert!(store
            .with_reader(|conn| skip_entry(conn, "/logs/bad.jsonl"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_mark_skip_replaces_previous_entry() {
        let store = Store::open_in_memory().unwrap();

        store
            .with_writer(|conn| {
                mark_skip(conn, "/logs/bad.jsonl", 1.0, "Io", "first")?;
                mark_skip(conn, "/logs/bad.jsonl", 2.0, "Parse", "second")?;
                Ok(())
            })
            .unwrap();

        let entry = store
            .with_reader(|conn| skip_entry(conn, "/logs/bad.jsonl"))
            .unwrap()
            .unwrap();
        assert_eq!(entry.mtime, 2.0);
        assert_eq!(entry.error_type, "Parse");
    }
}
