/// Aggregated session record from the sessions table.
///
/// Rebuilt wholesale by the session stage; the intent, trajectory, and
/// score columns are filled in by later stages.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionRow {
    /// Session identifier carried over from the source records.
    pub session_id: String,
    /// Project label, e.g. "claude:my-repo".
    pub project_name: Option<String>,
    /// Earliest entry timestamp (ISO 8601).
    pub started_at: Option<String>,
    /// Latest entry timestamp (ISO 8601).
    pub ended_at: Option<String>,
    pub duration_seconds: f64,
    pub user_prompt_count: i64,
    pub assistant_msg_count: i64,
    pub tool_use_count: i64,
    pub tool_error_count: i64,
    pub turn_count: i64,
    /// First substantive user prompt, for display and intent classification.
    pub first_prompt: Option<String>,
    pub intent: String,
    pub trajectory: String,
    pub convergence_score: f64,
    pub drift_score: f64,
    pub thrash_score: f64,
}

/// Per-tool call and error tally for one session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolUsageRow {
    pub session_id: String,
    pub tool_name: String,
    pub use_count: i64,
    pub error_count: i64,
}

/// Rolling averages over the most recent N sessions.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BaselineRow {
    pub window_size: i64,
    pub computed_at: String,
    pub avg_convergence: f64,
    pub avg_drift: f64,
    pub avg_thrash: f64,
    pub avg_duration: f64,
    pub avg_turns: f64,
    pub avg_tool_errors: f64,
    pub avg_correction_rate: f64,
    pub session_count: i64,
}

/// Recommendation produced by a generator, before it gets an id.
#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub category: String,
    pub title: String,
    pub description: String,
    pub evidence: String,
    pub confidence: f64,
}

/// One generated recommendation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PrescriptionRow {
    pub id: i64,
    pub category: String,
    pub title: String,
    pub description: String,
    /// Machine-readable pointer to the data behind the recommendation.
    pub evidence: String,
    pub confidence: f64,
    pub dismissed: bool,
    pub created_at: String,
}

/// Full LLM judgment for one session.
///
/// List-valued fields are stored as JSON text. `raw_analysis` keeps the
/// unparsed model output so degraded records stay inspectable.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct JudgmentRecord {
    pub session_id: String,
    pub outcome: String,
    pub outcome_confidence: f64,
    pub outcome_reasoning: String,
    pub prompt_clarity: f64,
    pub prompt_completeness: f64,
    pub prompt_missing: String,
    pub prompt_summary: String,
    pub trajectory_summary: String,
    pub underspecified_parts: String,
    pub misalignment_count: i64,
    pub misalignments: String,
    pub correction_count: i64,
    pub corrections: String,
    pub productive_turns: i64,
    pub waste_turns: i64,
    pub productivity_ratio: f64,
    pub waste_breakdown: String,
    pub narrative: String,
    pub what_worked: String,
    pub what_failed: String,
    pub user_quote: String,
    pub claude_md_suggestion: String,
    pub claude_md_rationale: String,
    pub raw_analysis: String,
}

/// Per-session skill detection result, ten dimensions.
#[derive(Debug, Clone)]
pub struct SkillAssessment {
    pub session_id: String,
    /// Observed level per dimension, 0 when not detected.
    pub levels: [i64; 10],
    /// Missed-opportunity level per dimension, 0 when none.
    pub opportunities: [i64; 10],
    /// Fraction of dimensions with any signal.
    pub detection_confidence: f64,
}

/// Decay-weighted skill profile over recent sessions.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SkillProfileRow {
    pub scores: [f64; 10],
    /// Up to three dimension ids with the largest opportunity gap.
    pub gaps: Vec<String>,
    pub session_count: i64,
    pub computed_at: String,
}

/// Nudge produced from a profile gap, before it gets an id.
#[derive(Debug, Clone)]
pub struct NewNudge {
    pub dimension: String,
    pub current_level: i64,
    pub target_level: i64,
    pub nudge_text: String,
    pub evidence: String,
}

/// One actionable skill nudge derived from the profile gaps.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SkillNudgeRow {
    pub id: i64,
    pub dimension: String,
    pub current_level: i64,
    pub target_level: i64,
    pub nudge_text: String,
    pub evidence: String,
    pub frequency: i64,
    pub dismissed: bool,
    pub created_at: String,
}

/// Synthesis content to persist; the store stamps generated_at.
#[derive(Debug, Clone)]
pub struct NewSynthesis {
    pub at_a_glance: String,
    pub usage_narrative: String,
    pub top_wins: String,
    pub top_friction: String,
    pub claude_md_additions: String,
    pub fun_headline: String,
}

/// Cross-session synthesis report. Object and list fields are JSON text.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SynthesisRow {
    pub at_a_glance: String,
    pub usage_narrative: String,
    pub top_wins: String,
    pub top_friction: String,
    pub claude_md_additions: String,
    pub fun_headline: String,
    pub generated_at: String,
}

/// Ingestion ledger row for one source file.
#[derive(Debug, Clone)]
pub struct LedgerRow {
    pub file_path: String,
    /// Source file mtime (seconds since epoch) at ingest time.
    pub mtime: f64,
    pub entry_count: i64,
    pub ingested_at: String,
}

/// Quarantine row for a file that failed to ingest.
#[derive(Debug, Clone)]
pub struct SkipRow {
    pub file_path: String,
    /// Source file mtime when the failure was recorded. The file is
    /// retried as soon as its mtime advances past this.
    pub mtime: f64,
    pub error_type: String,
    pub error_message: String,
    pub skip_until: String,
}

/// Full-text search hit.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub session_id: String,
    pub entry_type: String,
    /// Highlighted snippet around the match.
    pub snippet: String,
}

/// Configuration suggestion paired with the project directory it targets.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SuggestionRow {
    pub cwd: String,
    pub suggestion: String,
}
