//! Background worker: debounced pipeline runs driven by source changes.
//!
//! One long-lived loop waits on a wake channel fed by the filesystem
//! watcher, explicit change notifications, and refresh requests. A wake
//! carries no payload; the loop re-reads its inputs and decides what to
//! run. Stage failures are logged and reset the status to idle, never
//! killing the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use agretro_engine::judge::{self, HttpJudgeClient};
use agretro_engine::stages;
use agretro_ingest::IngestService;
use agretro_providers::catalog::SourceSpec;
use agretro_store::Store;
use anyhow::{Context, Result};
use tracing::{error, info};

use crate::status::{StatusCell, WorkerState, WorkerStatus};
use crate::watcher::SourceWatcher;

/// Minimum interval between automatic pipeline runs.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Idle wait between wake checks. Doubles as a periodic re-run interval,
/// so a missed filesystem event delays ingestion by at most this much.
const WAIT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct WorkerConfig {
    pub sources: Vec<SourceSpec>,
    pub cooldown: Duration,
    /// Run one lightweight pipeline before entering the wait loop.
    /// Callers set this when the store has no sessions yet.
    pub run_immediately: bool,
}

impl WorkerConfig {
    pub fn new(sources: Vec<SourceSpec>) -> Self {
        Self {
            sources,
            cooldown: DEFAULT_COOLDOWN,
            run_immediately: false,
        }
    }
}

/// Holds at most one pending refresh request. A second request while one
/// is queued is dropped rather than accumulated.
struct RefreshSlot(Mutex<Option<usize>>);

impl RefreshSlot {
    fn new() -> Self {
        Self(Mutex::new(None))
    }

    fn offer(&self, concurrency: usize) -> bool {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(concurrency);
        true
    }

    fn take(&self) -> Option<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

struct Shared {
    status: StatusCell,
    stop: AtomicBool,
    refresh: RefreshSlot,
}

/// Handle to the background worker pair: the run loop and its watcher.
pub struct Worker {
    shared: Arc<Shared>,
    wake: Sender<()>,
    watcher: Option<SourceWatcher>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(config: WorkerConfig, store: Store) -> Result<Self> {
        let shared = Arc::new(Shared {
            status: StatusCell::new(),
            stop: AtomicBool::new(false),
            refresh: RefreshSlot::new(),
        });

        let (wake_tx, wake_rx) = mpsc::channel();
        let watcher = SourceWatcher::spawn(&config.sources, wake_tx.clone())?;

        let loop_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("agretro-worker".to_string())
            .spawn(move || run_loop(config, store, loop_shared, wake_rx))
            .context("spawn worker thread")?;

        Ok(Self {
            shared,
            wake: wake_tx,
            watcher,
            handle: Some(handle),
        })
    }

    /// Current progress snapshot.
    pub fn status(&self) -> Arc<WorkerStatus> {
        self.shared.status.snapshot()
    }

    /// Queue a full refresh (ingest, judge, recompute). Non-blocking;
    /// returns false when a request is already pending.
    pub fn request_refresh(&self, concurrency: usize) -> bool {
        if !self.shared.refresh.offer(concurrency) {
            return false;
        }
        let _ = self.wake.send(());
        true
    }

    /// Signal that a source file changed. The watcher feeds the same
    /// channel; tests use this to drive the loop deterministically.
    pub fn notify_change(&self) {
        let _ = self.wake.send(());
    }

    /// Ask the loop to exit and stop the watcher. In-flight work finishes
    /// first; call [`Worker::join`] to wait for it.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        let _ = self.wake.send(());
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
    }

    /// Stop and wait for the run loop to finish.
    pub fn join(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop(config: WorkerConfig, store: Store, shared: Arc<Shared>, wake: Receiver<()>) {
    let mut last_run: Option<Instant> = None;

    if config.run_immediately {
        finish(run_pipeline(&store, &config.sources, &shared), &shared);
        last_run = Some(Instant::now());
    }

    loop {
        // The timeout path falls through to the cooldown check below, so
        // the pipeline also re-runs periodically without any events.
        match wake.recv_timeout(WAIT_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        // Coalesce a burst of change signals into this one pass.
        while wake.try_recv().is_ok() {}

        match shared.refresh.take() {
            Some(concurrency) => {
                finish(
                    run_full_refresh(&store, &config.sources, &shared, concurrency),
                    &shared,
                );
                last_run = Some(Instant::now());
            }
            None => {
                let cooled = last_run.is_none_or(|at| at.elapsed() >= config.cooldown);
                if cooled {
                    finish(run_pipeline(&store, &config.sources, &shared), &shared);
                    last_run = Some(Instant::now());
                }
            }
        }
    }
}

fn finish(result: Result<()>, shared: &Shared) {
    if let Err(error) = result {
        error!(%error, "pipeline run failed");
    }
    shared.status.set_idle();
}

/// The lightweight pass: ingest plus every local-heuristic stage, then
/// the search index.
fn run_pipeline(store: &Store, specs: &[SourceSpec], shared: &Shared) -> Result<()> {
    let total = stages::ANALYSIS_STAGES.len() as i64 + 2;

    shared
        .status
        .set_step(WorkerState::Ingesting, "Ingesting source files", 1, total);
    IngestService::new(store, specs).run(false, |_| {})?;

    for (i, stage) in stages::ANALYSIS_STAGES.iter().enumerate() {
        shared
            .status
            .set_step(WorkerState::Ingesting, stage.label, i as i64 + 2, total);
        (stage.run)(store)?;
    }

    shared
        .status
        .set_step(WorkerState::Ingesting, "Building search index", total, total);
    stages::rebuild_search_index(store)?;
    Ok(())
}

/// The full pass: lightweight stages, the LLM judge over unjudged
/// sessions, then a second baselines/prescriptions pass and the
/// synthesis report over the fresh judgments.
fn run_full_refresh(
    store: &Store,
    specs: &[SourceSpec],
    shared: &Shared,
    concurrency: usize,
) -> Result<()> {
    let total = stages::ANALYSIS_STAGES.len() as i64 + 1;

    shared
        .status
        .set_step(WorkerState::Ingesting, "Ingesting source files", 1, total);
    IngestService::new(store, specs).run(false, |_| {})?;

    for (i, stage) in stages::ANALYSIS_STAGES.iter().enumerate() {
        shared
            .status
            .set_step(WorkerState::Ingesting, stage.label, i as i64 + 2, total);
        (stage.run)(store)?;
    }

    let client = HttpJudgeClient::from_env()?;
    shared
        .status
        .set_step(WorkerState::Judging, "Starting LLM judge", 0, 0);
    let outcome = judge::judge_sessions(store, &client, false, concurrency, |p| {
        shared.status.set_step(
            WorkerState::Judging,
            &format!("Judging sessions ({} ok, {} errors)", p.ok, p.errors),
            p.done as i64,
            p.total as i64,
        );
    })?;
    info!(
        judged = outcome.judged,
        errors = outcome.errors,
        "judge pass complete"
    );

    shared
        .status
        .set_step(WorkerState::Ingesting, "Recomputing baselines", 1, 3);
    stages::baselines::compute_baselines(store)?;
    shared
        .status
        .set_step(WorkerState::Ingesting, "Regenerating prescriptions", 2, 3);
    stages::prescriptions::generate_prescriptions(store)?;
    shared
        .status
        .set_step(WorkerState::Ingesting, "Synthesizing usage report", 3, 3);
    judge::generate_synthesis(store, &client)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::Write as _;
    use std::path::Path;

    use filetime::FileTime;

    use super::*;

    fn claude_line(uuid: &str, ts: &str, text: &str) -> String {
        format!(
            r#"{{"type":"user","uuid":"{}","sessionId":"s-worker","timestamp":"{}","message":{{"content":"{}"}}}}"#,
            uuid, ts, text
        )
    }

    fn write_session(path: &Path) {
        let lines = [
            claude_line("u1", "2026-05-01T09:00:00Z", "fix the flaky test"),
            claude_line("u2", "2026-05-01T09:05:00Z", "now run the suite"),
        ];
        std::fs::write(path, lines.join("\n") + "\n").unwrap();
    }

    fn entry_count(store: &Store) -> i64 {
        store
            .with_reader(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM raw_entries", [], |row| row.get(0))?)
            })
            .unwrap()
    }

    fn wait_for(cond: impl Fn() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        cond()
    }

    #[test]
    fn refresh_slot_holds_at_most_one_request() {
        let slot = RefreshSlot::new();
        assert!(slot.offer(12));
        assert!(!slot.offer(4));
        assert_eq!(slot.take(), Some(12));
        assert_eq!(slot.take(), None);
        assert!(slot.offer(4));
    }

    #[test]
    fn run_immediately_ingests_before_any_signal() {
        let source = tempfile::tempdir().unwrap();
        let db = tempfile::tempdir().unwrap();
        write_session(&source.path().join("log.jsonl"));

        let store = Store::open(&db.path().join("agretro.db")).unwrap();
        let mut config = WorkerConfig::new(vec![SourceSpec::new("claude", source.path())]);
        config.cooldown = Duration::from_secs(300);
        config.run_immediately = true;

        let worker = Worker::spawn(config, store.clone()).unwrap();
        assert!(wait_for(
            || entry_count(&store) == 2,
            Duration::from_secs(15)
        ));
        assert!(wait_for(
            || worker.status().ready,
            Duration::from_secs(15)
        ));
        worker.join();
    }

    #[test]
    fn change_signals_are_debounced_by_the_cooldown() {
        let source = tempfile::tempdir().unwrap();
        let db = tempfile::tempdir().unwrap();
        let log = source.path().join("log.jsonl");
        write_session(&log);

        let store = Store::open(&db.path().join("agretro.db")).unwrap();
        let mut config = WorkerConfig::new(vec![SourceSpec::new("claude", source.path())]);
        config.cooldown = Duration::from_secs(5);

        let worker = Worker::spawn(config, store.clone()).unwrap();

        // A burst of signals produces exactly one run.
        for _ in 0..5 {
            worker.notify_change();
        }
        assert!(wait_for(
            || entry_count(&store) == 2,
            Duration::from_secs(15)
        ));

        // New data plus more signals inside the cooldown: still no run.
        let mut file = OpenOptions::new().append(true).open(&log).unwrap();
        writeln!(
            file,
            "{}",
            claude_line("u3", "2026-05-01T09:10:00Z", "one more thing")
        )
        .unwrap();
        drop(file);
        filetime::set_file_mtime(&log, FileTime::from_unix_time(4_102_444_800, 0)).unwrap();

        for _ in 0..3 {
            worker.notify_change();
        }
        std::thread::sleep(Duration::from_millis(1000));
        assert_eq!(entry_count(&store), 2);

        // After the cooldown a fresh signal picks the change up.
        std::thread::sleep(Duration::from_millis(4500));
        worker.notify_change();
        assert!(wait_for(
            || entry_count(&store) == 3,
            Duration::from_secs(15)
        ));
        worker.join();
    }

    #[test]
    fn refresh_request_runs_the_full_pipeline() {
        let source = tempfile::tempdir().unwrap();
        let db = tempfile::tempdir().unwrap();
        write_session(&source.path().join("log.jsonl"));

        let store = Store::open(&db.path().join("agretro.db")).unwrap();
        let mut config = WorkerConfig::new(vec![SourceSpec::new("claude", source.path())]);
        config.cooldown = Duration::from_secs(300);

        let worker = Worker::spawn(config, store.clone()).unwrap();
        assert!(worker.request_refresh(2));

        // The seeded session has no turn markers, so the judge queue is
        // empty and the refresh completes without touching the network.
        assert!(wait_for(
            || store.session_count().unwrap_or(0) == 1,
            Duration::from_secs(30)
        ));
        assert!(wait_for(
            || worker.status().ready,
            Duration::from_secs(30)
        ));
        worker.join();
    }
}
