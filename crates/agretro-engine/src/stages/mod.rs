//! Ordered derived-data stages over the normalized store.
//!
//! Stage order is a dependency order: sessions first, tool usage and
//! features read sessions, skills and scores read features, intents reads
//! both, baselines and prescriptions read everything above. Each stage
//! rebuilds its own tables inside one transaction, so an error leaves the
//! previous complete output in place.

pub mod baselines;
pub mod features;
pub mod intents;
pub mod prescriptions;
pub mod scores;
pub mod sessions;
pub mod skills;
pub mod tool_usage;

use agretro_store::{Store, search};
use anyhow::Result;

/// One recomputation step. `label` doubles as the worker status line;
/// `count_noun` completes the "  {n} {noun}" progress print.
pub struct Stage {
    pub label: &'static str,
    pub count_noun: &'static str,
    pub run: fn(&Store) -> Result<i64>,
}

/// Every local-heuristic stage in execution order. The LLM judgment pass is
/// not listed here; it is optional, slow, and sequenced by the caller.
pub const ANALYSIS_STAGES: &[Stage] = &[
    Stage {
        label: "Building sessions",
        count_noun: "sessions built",
        run: sessions::build_sessions,
    },
    Stage {
        label: "Analyzing tool usage",
        count_noun: "tool usage records",
        run: tool_usage::build_tool_usage,
    },
    Stage {
        label: "Extracting features",
        count_noun: "sessions processed",
        run: features::extract_features,
    },
    Stage {
        label: "Assessing skills",
        count_noun: "sessions assessed",
        run: skills::assess_skills,
    },
    Stage {
        label: "Computing scores",
        count_noun: "sessions scored",
        run: scores::compute_scores,
    },
    Stage {
        label: "Classifying intents",
        count_noun: "sessions classified",
        run: intents::classify_intents,
    },
    Stage {
        label: "Computing baselines",
        count_noun: "baselines computed",
        run: baselines::compute_baselines,
    },
    Stage {
        label: "Generating prescriptions",
        count_noun: "prescriptions generated",
        run: prescriptions::generate_prescriptions,
    },
];

/// Rebuilds the full-text index over message text. Kept out of
/// [`ANALYSIS_STAGES`] because it indexes raw entries, not a derived table,
/// and callers sequence it last.
pub fn rebuild_search_index(store: &Store) -> Result<i64> {
    let count = store.with_writer(|conn| {
        let indexed = search::rebuild(conn)?;
        Ok(indexed as i64)
    })?;
    Ok(count)
}

/// Runs every local stage in order, reporting `(label, count)` after each.
pub fn run_all(store: &Store, mut on_stage: impl FnMut(&Stage, i64)) -> Result<()> {
    for stage in ANALYSIS_STAGES {
        let count = (stage.run)(store)?;
        on_stage(stage, count);
    }
    Ok(())
}
