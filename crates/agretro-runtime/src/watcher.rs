//! Filesystem watching over the configured source roots.
//!
//! A change carries no payload; it only wakes the worker, which decides
//! on its own schedule whether to run. Poll watching is deliberate:
//! agent log roots often live on filesystems where inotify misses
//! appends, and a 500 ms poll is cheap next to the pipeline itself.

use std::collections::HashSet;
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use agretro_providers::catalog::SourceSpec;
use anyhow::{Context, Result};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Watches every existing source root and forwards matching file events
/// as wake signals.
pub(crate) struct SourceWatcher {
    watcher: PollWatcher,
    handle: JoinHandle<()>,
}

impl SourceWatcher {
    /// Returns `Ok(None)` when no configured root exists yet; the worker
    /// then runs on its timer alone.
    pub(crate) fn spawn(specs: &[SourceSpec], wake: Sender<()>) -> Result<Option<Self>> {
        let roots: Vec<_> = specs
            .iter()
            .map(|spec| spec.root.clone())
            .filter(|root| root.is_dir())
            .collect();
        if roots.is_empty() {
            return Ok(None);
        }

        let extensions: HashSet<&'static str> = specs
            .iter()
            .flat_map(|spec| spec.format().extensions().iter().copied())
            .collect();

        let (fs_tx, fs_rx) = mpsc::channel();
        let config = notify::Config::default().with_poll_interval(POLL_INTERVAL);
        let mut watcher = PollWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = fs_tx.send(event);
                }
            },
            config,
        )
        .context("create source watcher")?;

        for root in &roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .with_context(|| format!("watch {}", root.display()))?;
        }

        let handle = std::thread::Builder::new()
            .name("agretro-watch".to_string())
            .spawn(move || {
                while let Ok(event) = fs_rx.recv() {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        continue;
                    }
                    if event.paths.iter().any(|p| matches_source(p, &extensions)) {
                        debug!(paths = event.paths.len(), "source change detected");
                        if wake.send(()).is_err() {
                            break;
                        }
                    }
                }
            })
            .context("spawn watch thread")?;

        Ok(Some(Self { watcher, handle }))
    }

    /// Stops polling and waits for the forwarding thread to drain.
    pub(crate) fn stop(self) {
        // Dropping the watcher closes the event channel; the thread then
        // runs out of events and exits.
        drop(self.watcher);
        let _ = self.handle.join();
    }
}

fn matches_source(path: &Path, extensions: &HashSet<&'static str>) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(ext))
}
