pub mod errors;
pub mod records;
pub mod stats;

pub use errors::ToolErrorKind;
pub use records::{EntryKind, Parsed, ProgressEntry, ProgressKind, RawEntry};
pub use stats::IngestStats;
