//! Rolling session-window baselines.

use agretro_store::{BaselineRow, Store, insights};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};

use crate::config;

/// Recompute the baseline averages over the most recent N sessions for
/// each configured window. Windows with no sessions get no row.
/// Returns the number of windows considered.
pub fn compute_baselines(store: &Store) -> Result<i64> {
    let computed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let windows = store.with_writer(|conn| {
        let tx = conn.transaction()?;
        insights::clear_baselines(&tx)?;

        for window_size in config::BASELINE_WINDOWS {
            let (conv, drift, thrash, duration, turns, tool_errors, count) = tx.query_row(
                "SELECT AVG(convergence_score), AVG(drift_score), AVG(thrash_score),
                        AVG(duration_seconds), AVG(turn_count), AVG(tool_error_count),
                        COUNT(*)
                 FROM (SELECT * FROM sessions ORDER BY started_at DESC LIMIT ?1)",
                [window_size],
                |row| {
                    Ok((
                        row.get::<_, Option<f64>>(0)?,
                        row.get::<_, Option<f64>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                        row.get::<_, Option<f64>>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )?;
            if count == 0 {
                continue;
            }

            let avg_correction_rate = tx
                .query_row(
                    "SELECT AVG(f.correction_rate) FROM session_features f
                     JOIN (SELECT session_id FROM sessions
                           ORDER BY started_at DESC LIMIT ?1) s
                       ON f.session_id = s.session_id",
                    [window_size],
                    |row| row.get::<_, Option<f64>>(0),
                )?
                .unwrap_or(0.0);

            insights::insert_baseline(
                &tx,
                &BaselineRow {
                    window_size,
                    computed_at: computed_at.clone(),
                    avg_convergence: conv.unwrap_or(0.0),
                    avg_drift: drift.unwrap_or(0.0),
                    avg_thrash: thrash.unwrap_or(0.0),
                    avg_duration: duration.unwrap_or(0.0),
                    avg_turns: turns.unwrap_or(0.0),
                    avg_tool_errors: tool_errors.unwrap_or(0.0),
                    avg_correction_rate,
                    session_count: count,
                },
            )?;
        }
        tx.commit()?;
        Ok(config::BASELINE_WINDOWS.len() as i64)
    })?;
    Ok(windows)
}
