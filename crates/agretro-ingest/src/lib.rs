//! Incremental ingestion: walk configured source roots, parse what
//! changed, and persist normalized entries one file-transaction at a
//! time. Skip and quarantine bookkeeping lives in the store; this crate
//! owns the decision logic around it.

mod service;

pub use service::{IngestProgress, IngestService, SkipReason};
