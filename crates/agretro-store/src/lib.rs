// SQLite session store
// Raw entry tables are written incrementally; every derived table is
// rebuilt wholesale by the pipeline

mod error;
mod handle;
mod queries;
mod records;
mod schema;

// Public API
pub use error::{Error, Result};
pub use handle::Store;
pub use queries::{entries, insights, ledger, search, sessions, stats};
pub use records::{
    BaselineRow, JudgmentRecord, LedgerRow, NewNudge, NewPrescription, NewSynthesis,
    PrescriptionRow, SearchHit, SessionRow, SkillAssessment, SkillNudgeRow, SkillProfileRow,
    SkipRow, SuggestionRow, SynthesisRow, ToolUsageRow,
};
