use serde::{Deserialize, Serialize};

/// Summary of one ingestion batch.
///
/// The `*_files` and `new_*` counters describe this batch only; the
/// `store_*` totals are queried from the store after the batch commits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    /// Files discovered across all source roots
    pub total_files: usize,
    /// Files actually parsed and persisted this batch
    pub ingested_files: usize,
    /// Files skipped as unchanged or quarantined
    pub skipped_files: usize,
    /// Files that failed and were quarantined this batch
    pub failed_files: usize,
    /// Conversation entries written this batch
    pub new_entries: usize,
    /// Progress entries written this batch
    pub new_progress_entries: usize,
    pub store_entries: i64,
    pub store_progress_entries: i64,
    pub store_sessions: i64,
    pub store_projects: i64,
}

impl IngestStats {
    pub fn merge_file(&mut self, entries: usize, progress: usize) {
        self.ingested_files += 1;
        self.new_entries += entries;
        self.new_progress_entries += progress;
    }
}
