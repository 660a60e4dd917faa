pub mod config;
mod status;
mod watcher;
mod worker;

pub use agretro_ingest::{IngestProgress, IngestService, SkipReason};
pub use config::{ConfigFile, RuntimeConfig};
pub use status::{WorkerState, WorkerStatus};
pub use worker::{Worker, WorkerConfig, DEFAULT_COOLDOWN};
