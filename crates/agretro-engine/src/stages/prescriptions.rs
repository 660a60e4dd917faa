//! Prescription generators. Each one looks for a single statistically
//! grounded pattern and writes at most a handful of rows; every generator
//! gates on both sample size and effect size so a sparse store stays quiet
//! instead of producing noise.

use std::collections::BTreeMap;

use agretro_store::{NewPrescription, Store, insights};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use crate::config;
use crate::text;

/// Opening of the judge's own analysis prompt. A session whose first prompt
/// starts with this was the user feeding a transcript back into the agent,
/// not real project work, so project statistics exclude it.
pub(crate) const SELF_ANALYSIS_PREFIX: &str = "You are analyzing a Claude Code session";

/// Regenerates all non-dismissed prescriptions from current session,
/// judgment, and skill-profile state. Returns the number written.
pub fn generate_prescriptions(store: &Store) -> Result<i64> {
    let count = store.with_writer(|conn| {
        let tx = conn.transaction()?;
        insights::clear_active_prescriptions(&tx)?;

        let mut count = 0;
        count += time_of_day(&tx)?;
        count += first_prompt_quality(&tx)?;
        count += session_length(&tx)?;
        count += project_flags(&tx)?;
        count += trend(&tx)?;
        count += tool_error_hotspot(&tx)?;
        count += judgment_prompt_quality(&tx)?;
        count += judgment_misalignment(&tx)?;
        count += judgment_underspecification(&tx)?;
        count += skill_gaps(&tx)?;

        tx.commit()?;
        Ok(count)
    })?;
    Ok(count)
}

fn time_of_day(conn: &Connection) -> agretro_store::Result<i64> {
    let mut stmt = conn.prepare(
        "SELECT CASE
                    WHEN f.hour_of_day BETWEEN 6 AND 11 THEN 'morning'
                    WHEN f.hour_of_day BETWEEN 12 AND 17 THEN 'afternoon'
                    WHEN f.hour_of_day BETWEEN 18 AND 22 THEN 'evening'
                    ELSE 'night'
                END AS period,
                AVG(s.convergence_score) AS avg_conv,
                COUNT(*) AS n
         FROM sessions s
         JOIN session_features f ON s.session_id = f.session_id
         GROUP BY period
         HAVING n >= 5
         ORDER BY avg_conv DESC",
    )?;
    let periods = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if periods.len() < 2 {
        return Ok(0);
    }

    let (best_period, best_conv, best_n) = &periods[0];
    let (worst_period, worst_conv, worst_n) = &periods[periods.len() - 1];
    let delta = best_conv - worst_conv;
    if delta <= 0.05 {
        return Ok(0);
    }

    insights::insert_prescription(
        conn,
        &NewPrescription {
            category: "scheduling".into(),
            title: format!(
                "Your {} sessions converge {} better",
                best_period,
                text::percent(delta)
            ),
            description: format!(
                "Schedule complex work in the {}. {} sessions converge at {} vs {} for {}.",
                best_period,
                text::capitalize(best_period),
                text::percent(*best_conv),
                text::percent(*worst_conv),
                worst_period
            ),
            evidence: format!(
                "Based on {} {} vs {} {} sessions.",
                best_n, best_period, worst_n, worst_period
            ),
            confidence: (0.5 + delta).min(0.9),
        },
    )?;
    Ok(1)
}

fn first_prompt_quality(conn: &Connection) -> agretro_store::Result<i64> {
    let mut stmt = conn.prepare(
        "SELECT CASE WHEN f.correction_count = 0
                     THEN 'zero_corrections' ELSE 'has_corrections' END AS bucket,
                AVG(s.convergence_score),
                COUNT(*) AS n
         FROM sessions s
         JOIN session_features f ON s.session_id = f.session_id
         GROUP BY bucket
         HAVING n >= 3",
    )?;
    let mut zero = None;
    let mut has = None;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    for row in rows {
        let (bucket, conv, n) = row?;
        if bucket == "zero_corrections" {
            zero = Some((conv, n));
        } else {
            has = Some((conv, n));
        }
    }
    let (Some((zero_conv, zero_n)), Some((has_conv, has_n))) = (zero, has) else {
        return Ok(0);
    };
    let delta = zero_conv - has_conv;
    if delta <= 0.08 {
        return Ok(0);
    }

    insights::insert_prescription(
        conn,
        &NewPrescription {
            category: "prompt_quality".into(),
            title: "Zero-correction sessions vastly outperform".into(),
            description: format!(
                "Sessions with no corrections converge at {} vs {}. \
                 Invest more time crafting your first prompt to avoid back-and-forth.",
                text::percent(zero_conv),
                text::percent(has_conv)
            ),
            evidence: format!(
                "Based on {} zero-correction vs {} sessions with corrections.",
                zero_n, has_n
            ),
            confidence: (0.5 + delta).min(0.92),
        },
    )?;
    Ok(1)
}

fn session_length(conn: &Connection) -> agretro_store::Result<i64> {
    let mut stmt = conn.prepare(
        "SELECT CASE
                    WHEN s.duration_seconds < 900 THEN 'short (<15m)'
                    WHEN s.duration_seconds < 1800 THEN 'medium (15-30m)'
                    WHEN s.duration_seconds < 3600 THEN 'long (30-60m)'
                    ELSE 'marathon (>1h)'
                END AS bucket,
                AVG(s.convergence_score) AS avg_conv,
                COUNT(*) AS n
         FROM sessions s
         GROUP BY bucket
         HAVING n >= 3
         ORDER BY avg_conv DESC",
    )?;
    let buckets = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if buckets.len() < 2 {
        return Ok(0);
    }

    let (best_bucket, best_conv, best_n) = &buckets[0];
    let (worst_bucket, worst_conv, worst_n) = &buckets[buckets.len() - 1];
    let delta = best_conv - worst_conv;
    if delta <= 0.05 {
        return Ok(0);
    }

    insights::insert_prescription(
        conn,
        &NewPrescription {
            category: "session_length".into(),
            title: format!("{} sessions have highest convergence", best_bucket),
            description: format!(
                "{} sessions converge at {} vs {} for {} sessions. \
                 Break complex work into smaller chunks.",
                text::capitalize(best_bucket),
                text::percent(*best_conv),
                text::percent(*worst_conv),
                worst_bucket
            ),
            evidence: format!(
                "Based on {} {} vs {} {} sessions.",
                best_n, best_bucket, worst_n, worst_bucket
            ),
            confidence: (0.5 + delta).min(0.85),
        },
    )?;
    Ok(1)
}

fn project_flags(conn: &Connection) -> agretro_store::Result<i64> {
    let self_analysis = format!("{}%", SELF_ANALYSIS_PREFIX);
    let (avg_prod, avg_mis, avg_errors) = conn.query_row(
        "SELECT AVG(j.productivity_ratio), AVG(j.misalignment_count), AVG(s.tool_error_count)
         FROM sessions s
         LEFT JOIN session_judgments j ON s.session_id = j.session_id
         WHERE s.turn_count >= 1 AND s.first_prompt NOT LIKE ?1",
        [&self_analysis],
        |row| {
            Ok((
                row.get::<_, Option<f64>>(0)?,
                row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
            ))
        },
    )?;

    let mut stmt = conn.prepare(
        "SELECT s.project_name,
                COUNT(*) AS n,
                AVG(j.productivity_ratio) AS avg_prod,
                AVG(j.misalignment_count),
                SUM(s.tool_error_count),
                AVG(s.tool_error_count),
                SUM(CASE WHEN j.outcome = 'completed' THEN 1.0 ELSE 0.0 END)
                    / NULLIF(SUM(CASE WHEN j.outcome IS NOT NULL THEN 1 ELSE 0 END), 0)
         FROM sessions s
         LEFT JOIN session_judgments j ON s.session_id = j.session_id
         WHERE s.turn_count >= 1 AND s.first_prompt NOT LIKE ?1
         GROUP BY s.project_name
         HAVING n >= 3
         ORDER BY avg_prod ASC NULLS LAST",
    )?;
    let projects = stmt
        .query_map([&self_analysis], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, Option<f64>>(6)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut count = 0;
    for (name, n, prod, mis, total_errors, project_avg_errors, completion_rate) in projects {
        let Some(name) = name else { continue };

        let mut problems: Vec<String> = Vec::new();
        let mut advice: Vec<&str> = Vec::new();
        if let (Some(prod), Some(avg)) = (prod, avg_prod)
            && prod < avg * 0.8
        {
            problems.push(format!(
                "productivity {} vs {} avg",
                text::percent(prod),
                text::percent(avg)
            ));
            advice.push("break tasks into smaller, well-scoped prompts");
        }
        if let Some(mis) = mis
            && mis > avg_mis * 1.5
            && mis >= 2.0
        {
            problems.push(format!(
                "{:.1} misalignments/session vs {:.1} avg",
                mis, avg_mis
            ));
            advice.push("add explicit constraints and expected behavior to your prompts");
        }
        if project_avg_errors > avg_errors * 1.5 && total_errors >= 3 {
            problems.push(format!(
                "{} tool errors ({:.1}/session vs {:.1} avg)",
                total_errors, project_avg_errors, avg_errors
            ));
            advice.push("check if there's a recurring environment or config issue");
        }
        if problems.is_empty() {
            continue;
        }

        let mut diagnosis = text::capitalize(&problems.join("; "));
        if let Some(rate) = completion_rate {
            diagnosis.push_str(&format!(". Completion rate: {}", text::percent(rate)));
        }
        let action_text = advice
            .iter()
            .map(|a| text::capitalize(a))
            .collect::<Vec<_>>()
            .join(". ");

        // ||SPLIT|| lets a renderer show diagnosis and advice separately.
        insights::insert_prescription(
            conn,
            &NewPrescription {
                category: "project_health".into(),
                title: format!("Improve '{}' sessions", name),
                description: format!("{}||SPLIT||{}", diagnosis, action_text),
                evidence: format!("project:{}:{}", name, n),
                confidence: 0.8,
            },
        )?;
        count += 1;
        if count >= 3 {
            break;
        }
    }
    Ok(count)
}

fn trend(conn: &Connection) -> agretro_store::Result<i64> {
    let mut stmt = conn.prepare(
        "SELECT convergence_score, thrash_score FROM sessions
         ORDER BY started_at DESC LIMIT 40",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if rows.len() < 30 {
        return Ok(0);
    }

    let recent = &rows[..20];
    let previous = &rows[20..];
    let r_conv = recent.iter().map(|r| r.0).sum::<f64>() / recent.len() as f64;
    let p_conv = previous.iter().map(|r| r.0).sum::<f64>() / previous.len() as f64;
    let r_thrash = recent.iter().map(|r| r.1).sum::<f64>() / recent.len() as f64;
    let p_thrash = previous.iter().map(|r| r.1).sum::<f64>() / previous.len() as f64;

    let conv_delta = r_conv - p_conv;
    let thrash_delta = r_thrash - p_thrash;

    let mut parts = Vec::new();
    if conv_delta.abs() > 0.03 {
        parts.push(format!(
            "convergence {} {}",
            if conv_delta > 0.0 { "up" } else { "down" },
            text::percent(conv_delta.abs())
        ));
    }
    if thrash_delta.abs() > 0.03 {
        parts.push(format!(
            "thrash {} {}",
            if thrash_delta > 0.0 { "up" } else { "down" },
            text::percent(thrash_delta.abs())
        ));
    }
    if parts.is_empty() {
        return Ok(0);
    }

    let is_positive = conv_delta > 0.03 && thrash_delta <= 0.03;
    insights::insert_prescription(
        conn,
        &NewPrescription {
            category: "trend".into(),
            title: format!("Recent trend: {}", parts.join(", ")),
            description: format!(
                "Last 20 sessions: convergence {} (was {}), thrash {} (was {}). {}",
                text::percent(r_conv),
                text::percent(p_conv),
                text::percent(r_thrash),
                text::percent(p_thrash),
                if is_positive {
                    "Keep it up!"
                } else {
                    "Watch the trend."
                }
            ),
            evidence: "Comparing last 20 sessions vs previous 20.".into(),
            confidence: 0.75,
        },
    )?;
    Ok(1)
}

fn tool_error_hotspot(conn: &Connection) -> agretro_store::Result<i64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(error_count), 0) FROM session_tool_usage",
        [],
        |row| row.get(0),
    )?;
    if total < 5 {
        return Ok(0);
    }

    let top = conn
        .query_row(
            "SELECT tool_name, SUM(error_count) AS errors
             FROM session_tool_usage
             GROUP BY tool_name
             HAVING errors > 0
             ORDER BY errors DESC
             LIMIT 1",
            [],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;
    let Some((tool_name, tool_errors)) = top else {
        return Ok(0);
    };

    let ratio = tool_errors as f64 / total as f64;
    if ratio <= 0.4 {
        return Ok(0);
    }

    insights::insert_prescription(
        conn,
        &NewPrescription {
            category: "tool_errors".into(),
            title: format!(
                "'{}' accounts for {} of all tool errors",
                tool_name,
                text::percent(ratio)
            ),
            description: format!(
                "The {} tool generated {} of {} total errors. \
                 Check if you're hitting a recurring issue with this tool.",
                tool_name, tool_errors, total
            ),
            evidence: "Based on all session tool usage data.".into(),
            confidence: (0.5 + ratio * 0.5).min(0.85),
        },
    )?;
    Ok(1)
}

fn judgment_prompt_quality(conn: &Connection) -> agretro_store::Result<i64> {
    let (clarity, completeness, n) = conn.query_row(
        "SELECT AVG(prompt_clarity), AVG(prompt_completeness), COUNT(*) FROM session_judgments",
        [],
        |row| {
            Ok((
                row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                row.get::<_, i64>(2)?,
            ))
        },
    )?;
    if n < 5 || clarity >= 0.6 {
        return Ok(0);
    }

    insights::insert_prescription(
        conn,
        &NewPrescription {
            category: "prompt_quality".into(),
            title: format!(
                "AI analysis: prompt clarity averaging {}",
                text::percent(clarity)
            ),
            description: format!(
                "LLM analysis of your sessions finds average prompt clarity at {} \
                 and completeness at {}. Consider including more context, \
                 specific requirements, and expected outcomes in your initial prompts.",
                text::percent(clarity),
                text::percent(completeness)
            ),
            evidence: format!("Based on AI analysis of {} sessions.", n),
            confidence: (0.5 + (0.6 - clarity)).min(0.85),
        },
    )?;
    Ok(1)
}

fn judgment_misalignment(conn: &Connection) -> agretro_store::Result<i64> {
    let mut stmt = conn.prepare(
        "SELECT s.project_name,
                COUNT(*) AS n,
                SUM(CASE WHEN j.misalignment_count > 0 THEN 1 ELSE 0 END)
         FROM sessions s
         JOIN session_judgments j ON s.session_id = j.session_id
         GROUP BY s.project_name
         HAVING n >= 3",
    )?;
    let projects = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut count = 0;
    for (name, n, misaligned) in projects {
        let Some(name) = name else { continue };
        let rate = misaligned as f64 / n as f64;
        if rate <= 0.3 {
            continue;
        }

        insights::insert_prescription(
            conn,
            &NewPrescription {
                category: "project_health".into(),
                title: format!(
                    "AI analysis: '{}' has {} misalignment rate",
                    name,
                    text::percent(rate)
                ),
                description: format!(
                    "LLM analysis found that {} of {} sessions in '{}' had misalignments \
                     where Claude went off-track and needed correction. \
                     Consider writing more detailed prompts for this project.",
                    misaligned, n, name
                ),
                evidence: format!("Based on AI analysis of {} sessions.", n),
                confidence: (0.5 + rate * 0.5).min(0.85),
            },
        )?;
        count += 1;
        if count >= 2 {
            break;
        }
    }
    Ok(count)
}

fn judgment_underspecification(conn: &Connection) -> agretro_store::Result<i64> {
    let mut stmt = conn.prepare(
        "SELECT underspecified_parts FROM session_judgments
         WHERE underspecified_parts IS NOT NULL AND underspecified_parts != '[]'",
    )?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if rows.len() < 5 {
        return Ok(0);
    }

    // BTreeMap keeps tie-breaking deterministic across runs.
    let mut aspect_counts: BTreeMap<String, i64> = BTreeMap::new();
    for parts_json in &rows {
        let Ok(parts) = serde_json::from_str::<Vec<serde_json::Value>>(parts_json) else {
            continue;
        };
        for part in parts {
            let aspect = match &part {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Object(map) => map
                    .get("aspect")
                    .and_then(|a| a.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| part.to_string()),
                other => other.to_string(),
            };
            let key = aspect.to_lowercase().trim().to_string();
            *aspect_counts.entry(key).or_insert(0) += 1;
        }
    }
    if aspect_counts.is_empty() {
        return Ok(0);
    }

    let threshold = rows.len() as f64 * 0.2;
    let mut recurring: Vec<(String, i64)> = aspect_counts
        .into_iter()
        .filter(|(_, c)| *c as f64 >= threshold && *c >= 3)
        .collect();
    if recurring.is_empty() {
        return Ok(0);
    }
    recurring.sort_by(|a, b| b.1.cmp(&a.1));

    let aspects: Vec<String> = recurring
        .iter()
        .take(3)
        .map(|(aspect, c)| format!("'{}' ({}x)", aspect, c))
        .collect();

    insights::insert_prescription(
        conn,
        &NewPrescription {
            category: "prompt_quality".into(),
            title: "AI analysis: recurring underspecification patterns".into(),
            description: format!(
                "LLM analysis found these aspects are frequently underspecified in your \
                 prompts: {}. Including these details upfront could reduce back-and-forth.",
                aspects.join(", ")
            ),
            evidence: format!(
                "Based on analysis of {} sessions with underspecified elements.",
                rows.len()
            ),
            confidence: 0.75,
        },
    )?;
    Ok(1)
}

fn skill_gaps(conn: &Connection) -> agretro_store::Result<i64> {
    let Some(profile) = insights::skill_profile(conn)? else {
        return Ok(0);
    };

    let mut count = 0;
    for gap_id in &profile.gaps {
        let Some(dim) = config::dimension_number(gap_id) else {
            continue;
        };
        let current_level = profile.scores[dim - 1] as i64;
        let target_level = current_level + 1;
        let Some(nudge_text) = config::nudge_for(dim, target_level) else {
            continue;
        };

        insights::insert_prescription(
            conn,
            &NewPrescription {
                category: "skill_gap".into(),
                title: format!(
                    "Level up {} (L{} -> L{})",
                    config::dimension_name(dim),
                    current_level,
                    target_level
                ),
                description: nudge_text.to_string(),
                evidence: format!("Skill assessment across {} sessions.", profile.session_count),
                confidence: 0.7,
            },
        )?;
        count += 1;
    }
    Ok(count)
}
