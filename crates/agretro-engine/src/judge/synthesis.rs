//! Cross-session synthesis report.
//!
//! Folds the most recent judged sessions into one LLM call and stores
//! the structured reply in the single-row `synthesis` table. Sessions
//! whose first prompt is the judge's own analysis prompt are excluded;
//! those are transcripts being fed back in, not project work.

use agretro_store::{NewSynthesis, Store, insights};
use anyhow::Result;
use tracing::warn;

use super::client::JudgeClient;
use super::prompts::{self, SynthesisStats};
use super::record;
use super::summary::clip_chars;
use crate::stages::prescriptions::SELF_ANALYSIS_PREFIX;
use crate::text;

/// Newest judged sessions folded into the report.
const SESSION_WINDOW: i64 = 50;
/// Below this there is no pattern to report on.
const MIN_JUDGED: usize = 3;

struct JudgedLine {
    outcome: String,
    productivity_ratio: f64,
    misalignment_count: i64,
    narrative: String,
    what_worked: String,
    what_failed: String,
    user_quote: String,
    claude_md_suggestion: String,
    prompt_summary: String,
    project_name: String,
    duration_seconds: f64,
    turn_count: i64,
}

/// Regenerates the synthesis report. Returns false when there are too
/// few judged sessions or the reply could not be parsed.
pub fn generate_synthesis(store: &Store, client: &dyn JudgeClient) -> Result<bool> {
    let input = store.with_reader(collect_input)?;
    let Some((session_data, stats)) = input else {
        return Ok(false);
    };

    let prompt = prompts::synthesis_prompt(&session_data, &stats);
    let raw = client.complete(&prompt)?;
    let Some(parsed) = record::parse_reply(&raw) else {
        let snippet: String = raw.chars().take(200).collect();
        warn!(reply = %snippet, "synthesis reply was not valid JSON");
        return Ok(false);
    };

    let report = NewSynthesis {
        at_a_glance: record::dump(&parsed, "at_a_glance", "{}"),
        usage_narrative: record::get_str(&parsed, "usage_narrative"),
        top_wins: record::dump(&parsed, "top_wins", "[]"),
        top_friction: record::dump(&parsed, "top_friction", "[]"),
        claude_md_additions: record::dump(&parsed, "claude_md_additions", "[]"),
        fun_headline: record::get_str(&parsed, "fun_headline"),
    };
    store.with_writer(|conn| insights::replace_synthesis(conn, &report))?;
    Ok(true)
}

fn collect_input(
    conn: &rusqlite::Connection,
) -> agretro_store::Result<Option<(String, SynthesisStats)>> {
    let filter = format!("{}%", SELF_ANALYSIS_PREFIX);

    let mut stmt = conn.prepare(
        r#"
        SELECT j.outcome, j.productivity_ratio, j.misalignment_count,
               j.narrative, j.what_worked, j.what_failed, j.user_quote,
               j.claude_md_suggestion, j.prompt_summary,
               s.project_name, s.duration_seconds, s.turn_count
        FROM session_judgments j
        JOIN sessions s ON j.session_id = s.session_id
        WHERE s.turn_count >= 1
          AND s.first_prompt NOT LIKE ?1
        ORDER BY s.started_at DESC
        LIMIT ?2
        "#,
    )?;
    let rows = stmt
        .query_map(rusqlite::params![filter, SESSION_WINDOW], |row| {
            Ok(JudgedLine {
                outcome: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                productivity_ratio: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                misalignment_count: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                narrative: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                what_worked: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                what_failed: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                user_quote: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                claude_md_suggestion: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                prompt_summary: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                project_name: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                duration_seconds: row.get::<_, Option<f64>>(10)?.unwrap_or(0.0),
                turn_count: row.get::<_, Option<i64>>(11)?.unwrap_or(0),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if rows.len() < MIN_JUDGED {
        return Ok(None);
    }

    let session_data = rows.iter().map(session_line).collect::<Vec<_>>().join("\n\n");

    let stats = conn.query_row(
        r#"
        SELECT COUNT(*),
               SUM(CASE WHEN j.outcome = 'completed' THEN 1.0 ELSE 0.0 END) / COUNT(*),
               AVG(j.productivity_ratio),
               SUM(s.duration_seconds) / 3600.0,
               SUM(CASE WHEN j.misalignment_count > 0 THEN 1 ELSE 0 END)
        FROM session_judgments j
        JOIN sessions s ON j.session_id = s.session_id
        WHERE s.turn_count >= 1
          AND s.first_prompt NOT LIKE ?1
        "#,
        [&filter],
        |row| {
            Ok(SynthesisStats {
                total_sessions: row.get::<_, Option<i64>>(0)?.unwrap_or(0),
                completion_rate: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                avg_productivity: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                total_hours: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                misaligned_sessions: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
            })
        },
    )?;

    Ok(Some((session_data, stats)))
}

fn session_line(row: &JudgedLine) -> String {
    let summary = if row.prompt_summary.is_empty() {
        "(no summary)"
    } else {
        &row.prompt_summary
    };
    let mut line = format!("- [{}] {}: {}", row.outcome, row.project_name, summary);
    if !row.narrative.is_empty() {
        line.push_str(&format!("\n  Narrative: {}", clip_chars(&row.narrative, 200)));
    }
    if !row.what_worked.is_empty() {
        line.push_str(&format!("\n  Worked: {}", clip_chars(&row.what_worked, 100)));
    }
    if !row.what_failed.is_empty() {
        line.push_str(&format!("\n  Failed: {}", clip_chars(&row.what_failed, 100)));
    }
    if !row.user_quote.is_empty() {
        line.push_str(&format!("\n  User said: \"{}\"", clip_chars(&row.user_quote, 100)));
    }
    if !row.claude_md_suggestion.is_empty() {
        line.push_str(&format!(
            "\n  CLAUDE.md suggestion: {}",
            clip_chars(&row.claude_md_suggestion, 100)
        ));
    }
    line.push_str(&format!(
        "\n  ({} turns, {}m, {} productive, {} misalignments)",
        row.turn_count,
        (row.duration_seconds / 60.0) as i64,
        text::percent(row.productivity_ratio),
        row.misalignment_count
    ));
    line
}
