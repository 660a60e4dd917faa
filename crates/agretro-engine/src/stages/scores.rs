//! Composite convergence, drift, and thrash scores plus the trajectory
//! label derived from them.

use agretro_store::Store;
use anyhow::Result;
use rusqlite::params;

use crate::config;

struct ScoreInputs {
    session_id: String,
    duration: f64,
    tool_errors: i64,
    tool_uses: i64,
    prompt_trend: f64,
    decisions: i64,
    correction_rate: f64,
    response_cv: f64,
    has_pr: bool,
    keyword_entropy: f64,
    sidechain_ratio: f64,
    branch_switches: i64,
    oscillation: f64,
    api_errors: i64,
    rephrasing: i64,
    abandoned: bool,
    prompt_count: i64,
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Score every session that has extracted features and stamp its
/// trajectory. Returns the number of sessions scored.
pub fn compute_scores(store: &Store) -> Result<i64> {
    let count = store.with_writer(|conn| {
        let rows = {
            let mut stmt = conn.prepare(
                "SELECT
                    s.session_id, s.duration_seconds, s.tool_error_count, s.tool_use_count,
                    f.prompt_length_trend, f.decision_marker_count, f.correction_rate,
                    f.response_length_cv, f.has_pr_link,
                    f.topic_keyword_entropy, f.sidechain_ratio, f.branch_switch_count,
                    f.prompt_length_oscillation, f.api_error_count, f.rephrasing_count,
                    f.abandoned, s.user_prompt_count
                 FROM sessions s
                 JOIN session_features f ON s.session_id = f.session_id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ScoreInputs {
                        session_id: row.get(0)?,
                        duration: row.get(1)?,
                        tool_errors: row.get(2)?,
                        tool_uses: row.get(3)?,
                        prompt_trend: row.get(4)?,
                        decisions: row.get(5)?,
                        correction_rate: row.get(6)?,
                        response_cv: row.get(7)?,
                        has_pr: row.get(8)?,
                        keyword_entropy: row.get(9)?,
                        sidechain_ratio: row.get(10)?,
                        branch_switches: row.get(11)?,
                        oscillation: row.get(12)?,
                        api_errors: row.get(13)?,
                        rephrasing: row.get(14)?,
                        abandoned: row.get(15)?,
                        prompt_count: row.get(16)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let tx = conn.transaction()?;
        for r in &rows {
            let prompts = r.prompt_count.max(1) as f64;
            let error_rate = r.tool_errors as f64 / r.tool_uses.max(1) as f64;

            // Convergence components: shrinking prompts, decisions being
            // made, few corrections and tool errors, a PR, steady output.
            let c_prompt = clamp01((-r.prompt_trend).max(0.0) / 0.5);
            let c_decisions = clamp01(r.decisions as f64 / prompts / 0.5);
            let c_correction = clamp01(1.0 - r.correction_rate * 3.0);
            let c_tool_error = clamp01(1.0 - error_rate * 5.0);
            let c_pr = if r.has_pr { 1.0 } else { 0.0 };
            let c_stable = clamp01(1.0 - r.response_cv);

            let convergence = clamp01(
                config::CONV_W_PROMPT_DECREASE * c_prompt
                    + config::CONV_W_DECISIONS * c_decisions
                    + config::CONV_W_LOW_CORRECTION * c_correction
                    + config::CONV_W_LOW_TOOL_ERROR * c_tool_error
                    + config::CONV_W_HAS_PR * c_pr
                    + config::CONV_W_STABLE_RESPONSE * c_stable,
            );

            // Drift components: topic churn, growing prompts, branch and
            // sidechain hopping, no decisions, sessions that run long.
            let d_entropy = clamp01(r.keyword_entropy / 0.7);
            let d_prompt_inc = clamp01(r.prompt_trend.max(0.0) / 0.5);
            let d_branch = clamp01(r.branch_switches as f64 / 3.0);
            let d_sidechain = clamp01(r.sidechain_ratio / 0.3);
            let d_no_decisions = clamp01(1.0 - r.decisions as f64 / prompts / 0.3);
            let d_long = if r.duration > 1800.0 {
                clamp01((r.duration - 1800.0) / 3600.0)
            } else {
                0.0
            };

            let drift = clamp01(
                config::DRIFT_W_ENTROPY * d_entropy
                    + config::DRIFT_W_PROMPT_INCREASE * d_prompt_inc
                    + config::DRIFT_W_BRANCH_SWITCHES * d_branch
                    + config::DRIFT_W_SIDECHAIN * d_sidechain
                    + config::DRIFT_W_NO_DECISIONS * d_no_decisions
                    + config::DRIFT_W_LONG_SESSION * d_long,
            );

            // Thrash components: corrections, tool errors, rephrasing,
            // oscillating prompt lengths, API errors.
            let t_correction = clamp01(r.correction_rate * 3.0);
            let t_tool_error = clamp01(error_rate * 5.0);
            let t_rephrasing = clamp01(r.rephrasing as f64 / prompts / 0.3);
            let t_oscillation = clamp01(r.oscillation);
            let t_api_errors = clamp01(r.api_errors as f64 / prompts);

            let thrash = clamp01(
                config::THRASH_W_CORRECTION * t_correction
                    + config::THRASH_W_TOOL_ERROR * t_tool_error
                    + config::THRASH_W_REPHRASING * t_rephrasing
                    + config::THRASH_W_OSCILLATION * t_oscillation
                    + config::THRASH_W_API_ERRORS * t_api_errors,
            );

            let trajectory = classify_trajectory(convergence, drift, thrash, r.abandoned);

            tx.execute(
                "UPDATE sessions SET
                    convergence_score = ?1, drift_score = ?2, thrash_score = ?3,
                    trajectory = ?4
                 WHERE session_id = ?5",
                params![convergence, drift, thrash, trajectory, r.session_id],
            )?;
        }
        tx.commit()?;
        Ok(rows.len() as i64)
    })?;
    Ok(count)
}

fn classify_trajectory(convergence: f64, drift: f64, thrash: f64, abandoned: bool) -> &'static str {
    if abandoned {
        return "abandoned";
    }
    if convergence >= config::CONVERGED_MIN_CONVERGENCE
        && drift <= config::CONVERGED_MAX_DRIFT
        && thrash <= config::CONVERGED_MAX_THRASH
    {
        return "converged";
    }
    if drift >= config::DRIFTED_MIN_DRIFT && convergence <= config::DRIFTED_MAX_CONVERGENCE {
        return "drifted";
    }
    if thrash >= config::THRASHED_MIN_THRASH && convergence <= config::THRASHED_MAX_CONVERGENCE {
        return "thrashed";
    }
    if convergence >= config::MIXED_MIN_CONVERGENCE {
        return "mixed";
    }
    "unknown"
}
