//! LLM judgment pass and cross-session synthesis.
//!
//! The heuristic stages under [`crate::stages`] score sessions from
//! structural signals alone. This module adds the slow, optional second
//! opinion: each session's raw entries are compressed into a transcript,
//! sent to an Anthropic-compatible messages endpoint, and the reply is
//! validated into a `session_judgments` row. Judged rows then feed the
//! judgment-aware prescription generators and the synthesis report.
//!
//! Judgment is incremental by default (only sessions without a row are
//! sent) and runs on a bounded worker pool. Workers write their own
//! results through the store writer; nothing is funneled through a
//! collector thread.

mod client;
mod prompts;
mod record;
mod runner;
mod summary;
mod synthesis;

pub use client::{HttpJudgeClient, JudgeClient};
pub use runner::{DEFAULT_CONCURRENCY, JudgeOutcome, JudgeProgress, judge_sessions};
pub use synthesis::generate_synthesis;
