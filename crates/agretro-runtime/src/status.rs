//! Worker progress snapshots.
//!
//! Status is never mutated in place. Every update replaces the whole
//! snapshot behind an `Arc`, so a reader on any thread either sees the
//! old snapshot or the new one, never a torn mix of the two.

use std::sync::{Arc, Mutex, PoisonError};

/// Coarse worker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Ingesting,
    Judging,
}

/// One progress snapshot. `current`/`total` are step counters for the
/// phase named in `step`; both are zero while idle.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub step: String,
    pub ready: bool,
    pub current: i64,
    pub total: i64,
}

impl WorkerStatus {
    pub fn idle() -> Self {
        Self {
            state: WorkerState::Idle,
            step: String::new(),
            ready: true,
            current: 0,
            total: 0,
        }
    }
}

/// The swap cell the worker publishes through.
pub(crate) struct StatusCell(Mutex<Arc<WorkerStatus>>);

impl StatusCell {
    pub(crate) fn new() -> Self {
        Self(Mutex::new(Arc::new(WorkerStatus::idle())))
    }

    pub(crate) fn snapshot(&self) -> Arc<WorkerStatus> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn set_step(&self, state: WorkerState, step: &str, current: i64, total: i64) {
        self.replace(WorkerStatus {
            state,
            step: step.to_string(),
            ready: false,
            current,
            total,
        });
    }

    pub(crate) fn set_idle(&self) {
        self.replace(WorkerStatus::idle());
    }

    fn replace(&self, status: WorkerStatus) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(status);
    }
}
