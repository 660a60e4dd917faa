use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::Result;
use rusqlite::Connection;
use tracing::warn;

use agretro_providers::catalog::{self, SourceFile, SourceSpec};
use agretro_store::{entries, ledger, Store};
use agretro_types::{IngestStats, Parsed, RawEntry};

/// Why a discovered file was not parsed this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Ledger mtime is current
    Unchanged,
    /// Active quarantine entry covers this mtime
    Quarantined,
}

#[derive(Debug, Clone)]
pub enum IngestProgress {
    Discovered {
        total_files: usize,
    },
    FileIngested {
        path: PathBuf,
        entries: usize,
        progress_entries: usize,
    },
    FileSkipped {
        path: PathBuf,
        reason: SkipReason,
    },
    FileQuarantined {
        path: PathBuf,
        error_type: String,
        message: String,
    },
    Completed {
        stats: IngestStats,
    },
}

enum Decision {
    Ingest,
    SkipUnchanged,
    SkipQuarantined,
}

enum ParseOutcome {
    Ingested { entries: usize, progress: usize },
    Failed(agretro_providers::Error),
}

pub struct IngestService<'a> {
    store: &'a Store,
    specs: &'a [SourceSpec],
}

impl<'a> IngestService<'a> {
    pub fn new(store: &'a Store, specs: &'a [SourceSpec]) -> Self {
        Self { store, specs }
    }

    /// Walk every source root and ingest eligible files. `force` forgets
    /// the ledger first so everything re-reads; quarantine entries keep
    /// their horizon either way.
    pub fn run<F>(&self, force: bool, mut on_progress: F) -> Result<IngestStats>
    where
        F: FnMut(IngestProgress),
    {
        if force {
            self.store.with_writer(|conn| ledger::clear_ledger(conn))?;
        }

        let files = catalog::discover(self.specs);
        let mut stats = IngestStats {
            total_files: files.len(),
            ..Default::default()
        };
        on_progress(IngestProgress::Discovered {
            total_files: files.len(),
        });

        for file in &files {
            let path_str = file.path.to_string_lossy().into_owned();

            let mtime = match file_mtime(&file.path) {
                Ok(mtime) => mtime,
                Err(err) => {
                    // File vanished or turned unreadable after discovery.
                    let message = err.to_string();
                    self.quarantine(&path_str, 0.0, "io_error", &message)?;
                    stats.failed_files += 1;
                    on_progress(IngestProgress::FileQuarantined {
                        path: file.path.clone(),
                        error_type: "io_error".to_string(),
                        message,
                    });
                    continue;
                }
            };

            match self.decide(&path_str, mtime)? {
                Decision::SkipUnchanged => {
                    stats.skipped_files += 1;
                    on_progress(IngestProgress::FileSkipped {
                        path: file.path.clone(),
                        reason: SkipReason::Unchanged,
                    });
                    continue;
                }
                Decision::SkipQuarantined => {
                    stats.skipped_files += 1;
                    on_progress(IngestProgress::FileSkipped {
                        path: file.path.clone(),
                        reason: SkipReason::Quarantined,
                    });
                    continue;
                }
                Decision::Ingest => {}
            }

            match self.ingest_file(file, &path_str, mtime)? {
                ParseOutcome::Ingested { entries, progress } => {
                    stats.merge_file(entries, progress);
                    on_progress(IngestProgress::FileIngested {
                        path: file.path.clone(),
                        entries,
                        progress_entries: progress,
                    });
                }
                ParseOutcome::Failed(err) => {
                    let error_type = err.kind().to_string();
                    let message = err.to_string();
                    warn!(path = %file.path.display(), error_type = %error_type, "quarantining source file: {message}");
                    self.quarantine(&path_str, mtime, &error_type, &message)?;
                    stats.failed_files += 1;
                    on_progress(IngestProgress::FileQuarantined {
                        path: file.path.clone(),
                        error_type,
                        message,
                    });
                }
            }
        }

        let totals = self.store.totals()?;
        stats.store_entries = totals.entries;
        stats.store_progress_entries = totals.progress_entries;
        stats.store_sessions = totals.sessions;
        stats.store_projects = totals.projects;

        on_progress(IngestProgress::Completed {
            stats: stats.clone(),
        });
        Ok(stats)
    }

    /// A file is re-ingested iff its mtime strictly exceeds the ledger
    /// mtime (or it has no ledger row) and no active quarantine covers
    /// that same or older mtime.
    fn decide(&self, path_str: &str, mtime: f64) -> Result<Decision> {
        let decision = self.store.with_reader(|conn| {
            if let Some(cached) = ledger::active_skip_mtime(conn, path_str)? {
                if mtime <= cached {
                    return Ok(Decision::SkipQuarantined);
                }
            }
            match ledger::recorded_mtime(conn, path_str)? {
                None => Ok(Decision::Ingest),
                Some(recorded) if mtime > recorded => Ok(Decision::Ingest),
                Some(_) => Ok(Decision::SkipUnchanged),
            }
        })?;
        Ok(decision)
    }

    /// Parse outside the writer lock, then commit entries, the language
    /// histogram, and the ledger row in one transaction. A parse failure
    /// writes nothing.
    fn ingest_file(
        &self,
        file: &SourceFile,
        path_str: &str,
        mtime: f64,
    ) -> Result<ParseOutcome> {
        let parsed = match file.format.parse_file(&file.path, &file.project) {
            Ok(parsed) => parsed,
            Err(err) => return Ok(ParseOutcome::Failed(err)),
        };

        let (entry_count, progress_count) = self.store.with_writer(|conn| {
            let tx = conn.transaction()?;
            let mut entry_count = 0usize;
            let mut progress_count = 0usize;
            for item in &parsed {
                match item {
                    Parsed::Raw(entry) => {
                        entries::upsert_raw_entry(&tx, entry)?;
                        bump_languages(&tx, entry)?;
                        entry_count += 1;
                    }
                    Parsed::Progress(progress) => {
                        entries::upsert_progress_entry(&tx, progress)?;
                        progress_count += 1;
                    }
                }
            }
            ledger::record_file(&tx, path_str, mtime, entry_count as i64)?;
            ledger::clear_skip(&tx, path_str)?;
            tx.commit()?;
            Ok((entry_count, progress_count))
        })?;

        Ok(ParseOutcome::Ingested {
            entries: entry_count,
            progress: progress_count,
        })
    }

    fn quarantine(
        &self,
        path_str: &str,
        mtime: f64,
        error_type: &str,
        message: &str,
    ) -> Result<()> {
        self.store
            .with_writer(|conn| ledger::mark_skip(conn, path_str, mtime, error_type, message))?;
        Ok(())
    }
}

/// Count file extensions referenced by the entry's tool invocations into
/// the per-session histogram. Extensionless paths are not counted.
fn bump_languages(conn: &Connection, entry: &RawEntry) -> agretro_store::Result<()> {
    for path in &entry.tool_file_paths {
        if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
            let ext = ext.to_lowercase();
            if !ext.is_empty() {
                entries::bump_language(conn, &entry.session_id, &ext, 1)?;
            }
        }
    }
    Ok(())
}

fn file_mtime(path: &Path) -> std::io::Result<f64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0))
}
