use rusqlite::{Connection, OpenFlags};
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::records::{
    BaselineRow, PrescriptionRow, SearchHit, SessionRow, SkillNudgeRow, SkillProfileRow,
    SuggestionRow, SynthesisRow, ToolUsageRow,
};
use crate::{Result, queries, schema};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Reader connections cached per thread, keyed by store instance id.
    // Connections for dropped stores stay in the map until the thread
    // exits; ids are never reused, so they can never be observed again.
    static READERS: RefCell<HashMap<u64, Connection>> = RefCell::new(HashMap::new());
}

enum Backing {
    File(PathBuf),
    /// Shared-cache URI so reader connections see the writer's tables.
    Memory(String),
}

struct StoreInner {
    id: u64,
    backing: Backing,
    writer: Mutex<Connection>,
}

/// Handle to one SQLite store.
///
/// Cloning is cheap and every clone refers to the same underlying store.
/// All writes go through the single writer connection, serialized by a
/// mutex; reads use a per-thread cached connection that observes the
/// latest committed state and never waits on the writer.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Open (creating if needed) a file-backed store and bring its schema
    /// up to date.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(path)?;
        apply_pragmas(&writer, true)?;
        schema::init_schema(&writer)?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
                backing: Backing::File(path.to_path_buf()),
                writer: Mutex::new(writer),
            }),
        })
    }

    /// Open an in-memory store. The database lives as long as this handle
    /// (the writer connection pins the shared cache).
    pub fn open_in_memory() -> Result<Self> {
        let id = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:agretro-mem-{}?mode=memory&cache=shared", id);

        let writer = Connection::open_with_flags(&uri, memory_flags())?;
        apply_pragmas(&writer, false)?;
        schema::init_schema(&writer)?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                id,
                backing: Backing::Memory(uri),
                writer: Mutex::new(writer),
            }),
        })
    }

    /// Delete a store file along with its WAL sidecars. Missing files are
    /// not an error.
    pub fn destroy(path: &Path) -> Result<()> {
        for suffix in ["", "-wal", "-shm"] {
            let mut target = path.as_os_str().to_os_string();
            target.push(suffix);
            match std::fs::remove_file(PathBuf::from(target)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// File path backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.inner.backing {
            Backing::File(p) => Some(p),
            Backing::Memory(_) => None,
        }
    }

    /// Run `f` with exclusive access to the writer connection.
    ///
    /// `&mut Connection` allows `conn.transaction()`; a transaction left
    /// open when `f` returns rolls back on drop. A poisoned lock is
    /// recovered for the same reason: the panicking closure's transaction
    /// has already rolled back, leaving the connection consistent.
    pub fn with_writer<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = match self.inner.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Run `f` on this thread's cached reader connection, creating it on
    /// first use. Reader closures must not call back into `with_reader`.
    pub fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        READERS.with(|cell| {
            let mut map = cell.borrow_mut();
            let conn = match map.entry(self.inner.id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.open_reader()?),
            };
            f(conn)
        })
    }

    fn open_reader(&self) -> Result<Connection> {
        let conn = match &self.inner.backing {
            Backing::File(path) => Connection::open(path)?,
            Backing::Memory(uri) => Connection::open_with_flags(uri, memory_flags())?,
        };
        // journal_mode is a database property already set by the writer
        apply_pragmas(&conn, false)?;
        Ok(conn)
    }

    // Convenience wrappers over the query modules.

    pub fn list_sessions(&self, project: Option<&str>, limit: usize) -> Result<Vec<SessionRow>> {
        self.with_reader(|conn| queries::sessions::list(conn, project, Some(limit)))
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        self.with_reader(|conn| queries::sessions::get(conn, session_id))
    }

    pub fn session_count(&self) -> Result<i64> {
        self.with_reader(queries::sessions::count)
    }

    pub fn tool_usage(&self, session_id: &str) -> Result<Vec<ToolUsageRow>> {
        self.with_reader(|conn| queries::sessions::tool_usage_for(conn, session_id))
    }

    pub fn totals(&self) -> Result<queries::stats::StoreTotals> {
        self.with_reader(queries::stats::totals)
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        self.with_reader(|conn| queries::search::search(conn, query, limit))
    }

    pub fn baselines(&self) -> Result<Vec<BaselineRow>> {
        self.with_reader(queries::insights::baselines)
    }

    pub fn prescriptions(&self, include_dismissed: bool) -> Result<Vec<PrescriptionRow>> {
        self.with_reader(|conn| queries::insights::prescriptions(conn, include_dismissed))
    }

    pub fn dismiss_prescription(&self, id: i64) -> Result<bool> {
        self.with_writer(|conn| queries::insights::dismiss_prescription(conn, id))
    }

    pub fn skill_profile(&self) -> Result<Option<SkillProfileRow>> {
        self.with_reader(queries::insights::skill_profile)
    }

    pub fn skill_nudges(&self, include_dismissed: bool) -> Result<Vec<SkillNudgeRow>> {
        self.with_reader(|conn| queries::insights::nudges(conn, include_dismissed))
    }

    pub fn dismiss_nudge(&self, id: i64) -> Result<bool> {
        self.with_writer(|conn| queries::insights::dismiss_nudge(conn, id))
    }

    pub fn synthesis(&self) -> Result<Option<SynthesisRow>> {
        self.with_reader(queries::insights::synthesis)
    }

    pub fn claude_md_suggestions(&self) -> Result<Vec<SuggestionRow>> {
        self.with_reader(queries::insights::claude_md_suggestions)
    }
}

fn memory_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

fn apply_pragmas(conn: &Connection, wal: bool) -> Result<()> {
    if wal {
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "cache_size", -64000)?;
    conn.busy_timeout(Duration::from_secs(30))?;
    Ok(())
}
