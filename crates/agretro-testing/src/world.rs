//! Declarative test setup: temp source roots, a file-backed store, and
//! one-call ingestion.
//!
//! A `TestWorld` owns its temp directory, so everything it writes is
//! cleaned up on drop. Helpers panic on IO failure; a test that cannot
//! build its own fixtures has no useful way to continue.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agretro_ingest::IngestService;
use agretro_providers::SourceSpec;
use agretro_store::Store;
use agretro_types::IngestStats;
use anyhow::Result;
use filetime::FileTime;
use tempfile::TempDir;

pub struct TestWorld {
    temp_dir: TempDir,
    db_path: PathBuf,
    sources: Vec<SourceSpec>,
}

impl TestWorld {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let db_path = temp_dir.path().join("agretro.db");
        Self {
            temp_dir,
            db_path,
            sources: Vec::new(),
        }
    }

    /// Adds a source root for `agent` under the temp dir.
    pub fn with_source(mut self, agent: &str) -> Self {
        let root = self.temp_dir.path().join(format!("{agent}-logs"));
        fs::create_dir_all(&root).expect("create source root");
        self.sources.push(SourceSpec::new(agent, root));
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn sources(&self) -> &[SourceSpec] {
        &self.sources
    }

    pub fn source_root(&self, agent: &str) -> &Path {
        self.sources
            .iter()
            .find(|spec| spec.agent == agent)
            .map(|spec| spec.root.as_path())
            .expect("agent has no configured source root")
    }

    /// Writes `lines` as one JSONL file at `rel_path` under `agent`'s
    /// root. Nest the path (`"alpha/s1.jsonl"`) to get a project label
    /// like `agent:alpha`; a bare filename labels the session with the
    /// agent name alone.
    pub fn write_jsonl(&self, agent: &str, rel_path: &str, lines: &[String]) -> PathBuf {
        self.write_file(agent, rel_path, &(lines.join("\n") + "\n"))
    }

    /// Writes arbitrary text at `rel_path` under `agent`'s root,
    /// creating parent directories as needed.
    pub fn write_file(&self, agent: &str, rel_path: &str, contents: &str) -> PathBuf {
        let path = self.source_root(agent).join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture dirs");
        }
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// Opens the file-backed store, creating it on first call.
    pub fn store(&self) -> Store {
        Store::open(&self.db_path).expect("open store")
    }

    /// One ingestion pass over every configured source.
    pub fn ingest(&self, store: &Store) -> Result<IngestStats> {
        IngestService::new(store, &self.sources).run(false, |_| {})
    }

    /// Pushes a file's mtime into the future so the next ingestion pass
    /// treats it as modified.
    pub fn bump_mtime(path: &Path, ahead: Duration) {
        let modified = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .expect("stat fixture file");
        let bumped = FileTime::from_system_time(modified + ahead);
        filetime::set_file_mtime(path, bumped).expect("bump mtime");
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn ingest_round_trips_a_claude_session() -> Result<()> {
        let world = TestWorld::new().with_source("claude");
        world.write_jsonl(
            "claude",
            "alpha/s1.jsonl",
            &[
                fixtures::claude_user("s1", "u1", "2026-05-01T09:00:00Z", "fix the bug"),
                fixtures::claude_assistant("s1", "a1", "2026-05-01T09:00:10Z", "on it"),
            ],
        );

        let store = world.store();
        let stats = world.ingest(&store)?;

        assert_eq!(stats.ingested_files, 1);
        assert_eq!(stats.new_entries, 2);
        assert_eq!(stats.store_projects, 1);
        Ok(())
    }

    #[test]
    fn bumped_mtime_triggers_reingestion() -> Result<()> {
        let world = TestWorld::new().with_source("claude");
        let log = world.write_jsonl(
            "claude",
            "alpha/s2.jsonl",
            &[fixtures::claude_user(
                "s2",
                "u1",
                "2026-05-01T09:00:00Z",
                "first pass",
            )],
        );

        let store = world.store();
        world.ingest(&store)?;
        let skipped = world.ingest(&store)?;
        assert_eq!(skipped.ingested_files, 0);

        TestWorld::bump_mtime(&log, Duration::from_secs(120));
        let again = world.ingest(&store)?;
        assert_eq!(again.ingested_files, 1);
        Ok(())
    }
}
