//! Weekly terminal digest.
//!
//! One formatted report over the last seven days of sessions, leaning on
//! judgment rows where they exist. A store with no recent sessions falls
//! back to all-time numbers so the command always prints something.

use agretro_store::Store;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::text;

const WEEK: &str = "strftime('%Y-%m-%dT%H:%M:%SZ', 'now', '-7 days')";
const FORTNIGHT: &str = "strftime('%Y-%m-%dT%H:%M:%SZ', 'now', '-14 days')";

/// Keyword buckets for recurring prompt gaps, checked first match wins.
const GAP_CATEGORIES: &[(&str, &[&str])] = &[
    ("context", &["repo", "codebase", "file", "directory", "structure", "existing", "path"]),
    ("requirements", &["expected", "behavior", "output", "format", "specific", "requirement"]),
    ("constraints", &["environment", "version", "dependency", "platform", "setup"]),
    ("error_details", &["error", "message", "stack", "trace", "log", "exception"]),
    ("scope", &["which", "where", "boundary", "limit", "priority"]),
];

#[derive(Default)]
struct PeriodTotals {
    sessions: i64,
    hours: f64,
}

#[derive(Default)]
struct JudgmentTotals {
    judged: i64,
    avg_productivity: f64,
    completed: i64,
    partial: i64,
    failed: i64,
    abandoned: i64,
    avg_misalignment: f64,
}

pub fn weekly_digest(store: &Store) -> Result<String> {
    let digest = store.with_reader(|conn| build(conn))?;
    Ok(digest)
}

fn build(conn: &Connection) -> agretro_store::Result<String> {
    let rule = "=".repeat(60);
    let mut lines: Vec<String> = vec![rule.clone(), "  AGRETRO WEEKLY DIGEST".to_string(), rule.clone()];

    let mut totals = period_totals(conn, &format!("WHERE started_at >= {}", WEEK))?;
    let last_week = period_totals(
        conn,
        &format!("WHERE started_at >= {} AND started_at < {}", FORTNIGHT, WEEK),
    )?;
    let mut judgments = judgment_totals(conn, &format!("WHERE s.started_at >= {}", WEEK))?;
    let prior_judgments =
        judgment_totals(conn, &format!("WHERE s.started_at >= {} AND s.started_at < {}", FORTNIGHT, WEEK))?;

    let use_alltime = totals.sessions == 0;
    if use_alltime {
        lines.push("\n  No sessions in the last 7 days. Showing all-time stats.\n".to_string());
        totals = period_totals(conn, "")?;
        judgments = judgment_totals(conn, "")?;
    }

    let completion_rate = if judgments.judged > 0 {
        judgments.completed as f64 / judgments.judged as f64
    } else {
        0.0
    };

    let period = if use_alltime { "All-time" } else { "This Week" };
    lines.push(format!("\n  {} Summary", period));
    lines.push(divider());
    lines.push(format!("  Sessions:        {}  ({:.1}h)", totals.sessions, totals.hours));
    lines.push(format!(
        "  Outcomes:        {} completed, {} partial, {} failed, {} abandoned",
        judgments.completed, judgments.partial, judgments.failed, judgments.abandoned
    ));
    lines.push(format!("  Completion Rate: {}", text::percent(completion_rate)));
    lines.push(if judgments.avg_productivity > 0.0 {
        format!("  Avg Productivity:{}", text::percent(judgments.avg_productivity))
    } else {
        "  Avg Productivity: N/A".to_string()
    });
    lines.push(format!("  Avg Misalign:    {:.1} per session", judgments.avg_misalignment));

    if !use_alltime && last_week.sessions > 0 && prior_judgments.judged > 0 {
        let prior_completion = prior_judgments.completed as f64 / prior_judgments.judged as f64;
        let prod_delta = judgments.avg_productivity - prior_judgments.avg_productivity;
        let comp_delta = completion_rate - prior_completion;
        let mis_delta = judgments.avg_misalignment - prior_judgments.avg_misalignment;

        lines.push(format!("\n  vs Last Week ({} sessions)", last_week.sessions));
        lines.push(divider());
        lines.push(format!(
            "  Productivity:    {}{} ({} -> {})",
            sign(prod_delta),
            text::percent(prod_delta),
            text::percent(prior_judgments.avg_productivity),
            text::percent(judgments.avg_productivity)
        ));
        lines.push(format!(
            "  Completion Rate: {}{} ({} -> {})",
            sign(comp_delta),
            text::percent(comp_delta),
            text::percent(prior_completion),
            text::percent(completion_rate)
        ));
        let trend = if mis_delta < 0.0 { "fewer" } else { "more" };
        lines.push(format!("  Misalignments:   {}{:.1}/session ({})", sign(mis_delta), mis_delta, trend));
    }

    let top_gaps = prompt_gaps(conn, use_alltime)?;
    if !top_gaps.is_empty() {
        lines.push("\n  Top Prompt Gaps".to_string());
        lines.push(divider());
        for (category, count) in top_gaps {
            lines.push(format!("    {:<20} {:>3} occurrences", category, count));
        }
    }

    if let Some((session_id, misalignments, outcome, preview)) = worst_session(conn, use_alltime)? {
        if misalignments > 0 {
            let short_id: String = session_id.chars().take(16).collect();
            lines.push("\n  Worst Session".to_string());
            lines.push(divider());
            lines.push(format!("    {} misalignments | outcome: {}", misalignments, outcome));
            lines.push(format!("    Prompt: {}...", preview));
            lines.push(format!("    ID: {}...", short_id));
        }
    }

    let insights = active_insights(conn)?;
    if !insights.is_empty() {
        lines.push("\n  Active Insights".to_string());
        lines.push(divider());
        for (title, confidence) in insights {
            lines.push(format!("    [{}] {}", text::percent(confidence), title));
        }
    }

    lines.push("\n  Top Projects (by sessions)".to_string());
    lines.push(divider());
    for (project, count, productivity, completion) in top_projects(conn)? {
        let short: String = project.chars().take(30).collect();
        let prod = match productivity {
            Some(p) if p > 0.0 => format!("prod={}", text::percent(p)),
            _ => "prod=N/A".to_string(),
        };
        let comp = match completion {
            Some(c) if c > 0.0 => format!("comp={}", text::percent(c)),
            _ => "comp=N/A".to_string(),
        };
        lines.push(format!("    {:<30} {:>3} sessions  {}  {}", short, count, prod, comp));
    }

    lines.push(format!("\n{}", rule));
    Ok(lines.join("\n"))
}

fn divider() -> String {
    format!("  {}", "-".repeat(40))
}

fn sign(delta: f64) -> &'static str {
    if delta > 0.0 { "+" } else { "" }
}

fn period_totals(conn: &Connection, filter: &str) -> agretro_store::Result<PeriodTotals> {
    let sql = format!(
        "SELECT COUNT(*), SUM(duration_seconds) / 3600.0 FROM sessions {}",
        filter
    );
    let totals = conn.query_row(&sql, [], |row| {
        Ok(PeriodTotals {
            sessions: row.get(0)?,
            hours: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
        })
    })?;
    Ok(totals)
}

fn judgment_totals(conn: &Connection, filter: &str) -> agretro_store::Result<JudgmentTotals> {
    let sql = format!(
        r#"
        SELECT COUNT(*),
               AVG(j.productivity_ratio),
               SUM(CASE WHEN j.outcome = 'completed' THEN 1 ELSE 0 END),
               SUM(CASE WHEN j.outcome = 'partially_completed' THEN 1 ELSE 0 END),
               SUM(CASE WHEN j.outcome = 'failed' THEN 1 ELSE 0 END),
               SUM(CASE WHEN j.outcome = 'abandoned' THEN 1 ELSE 0 END),
               AVG(j.misalignment_count)
        FROM sessions s
        JOIN session_judgments j ON s.session_id = j.session_id
        {}
        "#,
        filter
    );
    let totals = conn.query_row(&sql, [], |row| {
        Ok(JudgmentTotals {
            judged: row.get(0)?,
            avg_productivity: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
            completed: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
            partial: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
            failed: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
            abandoned: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
            avg_misalignment: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
        })
    })?;
    Ok(totals)
}

fn prompt_gaps(conn: &Connection, use_alltime: bool) -> agretro_store::Result<Vec<(&'static str, i64)>> {
    let sql = if use_alltime {
        "SELECT prompt_missing FROM session_judgments
         WHERE prompt_missing IS NOT NULL AND prompt_missing != '[]'"
            .to_string()
    } else {
        format!(
            "SELECT j.prompt_missing FROM session_judgments j
             JOIN sessions s ON j.session_id = s.session_id
             WHERE s.started_at >= {}",
            WEEK
        )
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, Option<String>>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut counts = vec![0i64; GAP_CATEGORIES.len()];
    for raw in rows.into_iter().flatten() {
        let Ok(items) = serde_json::from_str::<Vec<Value>>(&raw) else {
            continue;
        };
        for item in items {
            let text = match &item {
                Value::String(s) => s.to_lowercase(),
                other => other.to_string().to_lowercase(),
            };
            for (i, (_, keywords)) in GAP_CATEGORIES.iter().enumerate() {
                if keywords.iter().any(|kw| text.contains(kw)) {
                    counts[i] += 1;
                    break;
                }
            }
        }
    }

    let mut top: Vec<(&'static str, i64)> = GAP_CATEGORIES
        .iter()
        .zip(counts)
        .filter(|(_, n)| *n > 0)
        .map(|((name, _), n)| (*name, n))
        .collect();
    top.sort_by(|a, b| b.1.cmp(&a.1));
    top.truncate(3);
    Ok(top)
}

fn worst_session(
    conn: &Connection,
    use_alltime: bool,
) -> agretro_store::Result<Option<(String, i64, String, String)>> {
    let mut sql = String::from(
        "SELECT j.session_id, j.misalignment_count, j.outcome, substr(s.first_prompt, 1, 80)
         FROM session_judgments j
         JOIN sessions s ON j.session_id = s.session_id",
    );
    if !use_alltime {
        sql.push_str(&format!(" WHERE s.started_at >= {}", WEEK));
    }
    sql.push_str(" ORDER BY j.misalignment_count DESC LIMIT 1");

    let worst = conn
        .query_row(&sql, [], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            ))
        })
        .optional()?;
    Ok(worst)
}

fn active_insights(conn: &Connection) -> agretro_store::Result<Vec<(String, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT title, confidence FROM prescriptions
         WHERE dismissed = 0
         ORDER BY confidence DESC LIMIT 5",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[allow(clippy::type_complexity)]
fn top_projects(
    conn: &Connection,
) -> agretro_store::Result<Vec<(String, i64, Option<f64>, Option<f64>)>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT s.project_name, COUNT(*) AS n,
               AVG(j.productivity_ratio),
               SUM(CASE WHEN j.outcome = 'completed' THEN 1.0 ELSE 0.0 END)
                   / NULLIF(COUNT(j.session_id), 0)
        FROM sessions s
        LEFT JOIN session_judgments j ON s.session_id = j.session_id
        GROUP BY s.project_name
        ORDER BY n DESC LIMIT 5
        "#,
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
