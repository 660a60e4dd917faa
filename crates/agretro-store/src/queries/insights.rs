//! Derived-insight tables: baselines, prescriptions, judgments, skills,
//! and the cross-session synthesis.
//!
//! Regeneration contract: each rebuild deletes only non-dismissed rows,
//! so a dismissal is permanent until the user resets the store.

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::Result;
use crate::records::{
    BaselineRow, JudgmentRecord, NewNudge, NewPrescription, NewSynthesis, PrescriptionRow,
    SkillAssessment, SkillNudgeRow, SkillProfileRow, SuggestionRow, SynthesisRow,
};

// --- baselines ---

pub fn baselines(conn: &Connection) -> Result<Vec<BaselineRow>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT window_size, computed_at, avg_convergence, avg_drift, avg_thrash,
               avg_duration, avg_turns, avg_tool_errors, avg_correction_rate, session_count
        FROM baselines
        ORDER BY window_size
        "#,
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(BaselineRow {
                window_size: row.get(0)?,
                computed_at: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                avg_convergence: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                avg_drift: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                avg_thrash: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                avg_duration: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                avg_turns: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                avg_tool_errors: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
                avg_correction_rate: row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
                session_count: row.get::<_, Option<i64>>(9)?.unwrap_or(0),
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn clear_baselines(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM baselines", [])?;
    Ok(())
}

/// Inserts with id = window_size so each window keeps a single row.
pub fn insert_baseline(conn: &Connection, row: &BaselineRow) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO baselines (id, window_size, computed_at, avg_convergence, avg_drift,
                               avg_thrash, avg_duration, avg_turns, avg_tool_errors,
                               avg_correction_rate, session_count)
        VALUES (?1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            row.window_size,
            row.computed_at,
            row.avg_convergence,
            row.avg_drift,
            row.avg_thrash,
            row.avg_duration,
            row.avg_turns,
            row.avg_tool_errors,
            row.avg_correction_rate,
            row.session_count,
        ],
    )?;
    Ok(())
}

// --- prescriptions ---

pub fn prescriptions(conn: &Connection, include_dismissed: bool) -> Result<Vec<PrescriptionRow>> {
    let filter = if include_dismissed {
        ""
    } else {
        "WHERE dismissed = 0"
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT id, category, title, description, evidence, confidence, dismissed, created_at \
         FROM prescriptions {} ORDER BY confidence DESC, id",
        filter
    ))?;

    let rows = stmt
        .query_map([], prescription_from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

fn prescription_from_row(row: &Row<'_>) -> std::result::Result<PrescriptionRow, rusqlite::Error> {
    Ok(PrescriptionRow {
        id: row.get(0)?,
        category: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        evidence: row.get(4)?,
        confidence: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
        dismissed: row.get::<_, i64>(6)? != 0,
        created_at: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
    })
}

/// Clears everything the user has not dismissed, ahead of regeneration.
pub fn clear_active_prescriptions(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM prescriptions WHERE dismissed = 0", [])?;
    Ok(())
}

pub fn insert_prescription(conn: &Connection, p: &NewPrescription) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO prescriptions (category, title, description, evidence, confidence)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![p.category, p.title, p.description, p.evidence, p.confidence],
    )?;
    Ok(())
}

pub fn dismiss_prescription(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("UPDATE prescriptions SET dismissed = 1 WHERE id = ?1", [id])?;
    Ok(changed > 0)
}

// --- judgments ---

/// Replaces any previous judgment for the session.
pub fn upsert_judgment(conn: &Connection, rec: &JudgmentRecord) -> Result<()> {
    conn.execute(
        "DELETE FROM session_judgments WHERE session_id = ?1",
        [&rec.session_id],
    )?;
    conn.execute(
        r#"
        INSERT INTO session_judgments (
            session_id, outcome, outcome_confidence, outcome_reasoning,
            prompt_clarity, prompt_completeness, prompt_missing, prompt_summary,
            trajectory_summary, underspecified_parts,
            misalignment_count, misalignments, correction_count, corrections,
            productive_turns, waste_turns, productivity_ratio, waste_breakdown,
            narrative, what_worked, what_failed, user_quote,
            claude_md_suggestion, claude_md_rationale, raw_analysis
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                  ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)
        "#,
        params![
            rec.session_id,
            rec.outcome,
            rec.outcome_confidence,
            rec.outcome_reasoning,
            rec.prompt_clarity,
            rec.prompt_completeness,
            rec.prompt_missing,
            rec.prompt_summary,
            rec.trajectory_summary,
            rec.underspecified_parts,
            rec.misalignment_count,
            rec.misalignments,
            rec.correction_count,
            rec.corrections,
            rec.productive_turns,
            rec.waste_turns,
            rec.productivity_ratio,
            rec.waste_breakdown,
            rec.narrative,
            rec.what_worked,
            rec.what_failed,
            rec.user_quote,
            rec.claude_md_suggestion,
            rec.claude_md_rationale,
            rec.raw_analysis,
        ],
    )?;
    Ok(())
}

pub fn judgment(conn: &Connection, session_id: &str) -> Result<Option<JudgmentRecord>> {
    let rec = conn
        .query_row(
            r#"
            SELECT session_id, outcome, outcome_confidence, outcome_reasoning,
                   prompt_clarity, prompt_completeness, prompt_missing, prompt_summary,
                   trajectory_summary, underspecified_parts,
                   misalignment_count, misalignments, correction_count, corrections,
                   productive_turns, waste_turns, productivity_ratio, waste_breakdown,
                   narrative, what_worked, what_failed, user_quote,
                   claude_md_suggestion, claude_md_rationale, raw_analysis
            FROM session_judgments WHERE session_id = ?1
            "#,
            [session_id],
            judgment_from_row,
        )
        .optional()?;
    Ok(rec)
}

fn judgment_from_row(row: &Row<'_>) -> std::result::Result<JudgmentRecord, rusqlite::Error> {
    fn text(row: &Row<'_>, idx: usize) -> std::result::Result<String, rusqlite::Error> {
        Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
    }

    Ok(JudgmentRecord {
        session_id: row.get(0)?,
        outcome: text(row, 1)?,
        outcome_confidence: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
        outcome_reasoning: text(row, 3)?,
        prompt_clarity: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
        prompt_completeness: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
        prompt_missing: text(row, 6)?,
        prompt_summary: text(row, 7)?,
        trajectory_summary: text(row, 8)?,
        underspecified_parts: text(row, 9)?,
        misalignment_count: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
        misalignments: text(row, 11)?,
        correction_count: row.get::<_, Option<i64>>(12)?.unwrap_or(0),
        corrections: text(row, 13)?,
        productive_turns: row.get::<_, Option<i64>>(14)?.unwrap_or(0),
        waste_turns: row.get::<_, Option<i64>>(15)?.unwrap_or(0),
        productivity_ratio: row.get::<_, Option<f64>>(16)?.unwrap_or(0.0),
        waste_breakdown: text(row, 17)?,
        narrative: text(row, 18)?,
        what_worked: text(row, 19)?,
        what_failed: text(row, 20)?,
        user_quote: text(row, 21)?,
        claude_md_suggestion: text(row, 22)?,
        claude_md_rationale: text(row, 23)?,
        raw_analysis: text(row, 24)?,
    })
}

pub fn judged_count(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM session_judgments", [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

// --- skills ---

pub fn clear_session_skills(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM session_skills", [])?;
    Ok(())
}

pub fn insert_skill_assessment(conn: &Connection, a: &SkillAssessment) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO session_skills (
            session_id,
            d1_level, d1_opportunity, d2_level, d2_opportunity,
            d3_level, d3_opportunity, d4_level, d4_opportunity,
            d5_level, d5_opportunity, d6_level, d6_opportunity,
            d7_level, d7_opportunity, d8_level, d8_opportunity,
            d9_level, d9_opportunity, d10_level, d10_opportunity,
            detection_confidence
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                  ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
        "#,
        params![
            a.session_id,
            a.levels[0],
            a.opportunities[0],
            a.levels[1],
            a.opportunities[1],
            a.levels[2],
            a.opportunities[2],
            a.levels[3],
            a.opportunities[3],
            a.levels[4],
            a.opportunities[4],
            a.levels[5],
            a.opportunities[5],
            a.levels[6],
            a.opportunities[6],
            a.levels[7],
            a.opportunities[7],
            a.levels[8],
            a.opportunities[8],
            a.levels[9],
            a.opportunities[9],
            a.detection_confidence,
        ],
    )?;
    Ok(())
}

pub fn replace_skill_profile(
    conn: &Connection,
    scores: &[f64; 10],
    gaps: &[String],
    session_count: i64,
) -> Result<()> {
    conn.execute("DELETE FROM skill_profile", [])?;
    conn.execute(
        r#"
        INSERT INTO skill_profile (
            id, d1_score, d2_score, d3_score, d4_score, d5_score,
            d6_score, d7_score, d8_score, d9_score, d10_score,
            gap_1, gap_2, gap_3, session_count
        ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
        params![
            scores[0],
            scores[1],
            scores[2],
            scores[3],
            scores[4],
            scores[5],
            scores[6],
            scores[7],
            scores[8],
            scores[9],
            gaps.first(),
            gaps.get(1),
            gaps.get(2),
            session_count,
        ],
    )?;
    Ok(())
}

pub fn skill_profile(conn: &Connection) -> Result<Option<SkillProfileRow>> {
    let profile = conn
        .query_row(
            r#"
            SELECT d1_score, d2_score, d3_score, d4_score, d5_score,
                   d6_score, d7_score, d8_score, d9_score, d10_score,
                   gap_1, gap_2, gap_3, session_count, computed_at
            FROM skill_profile WHERE id = 1
            "#,
            [],
            |row| {
                let mut scores = [0.0; 10];
                for (i, score) in scores.iter_mut().enumerate() {
                    *score = row.get::<_, Option<f64>>(i)?.unwrap_or(0.0);
                }
                let gaps = (10usize..13)
                    .filter_map(|i| row.get::<_, Option<String>>(i).transpose())
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(SkillProfileRow {
                    scores,
                    gaps,
                    session_count: row.get::<_, Option<i64>>(13)?.unwrap_or(0),
                    computed_at: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
                })
            },
        )
        .optional()?;
    Ok(profile)
}

pub fn clear_active_nudges(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM skill_nudges WHERE dismissed = 0", [])?;
    Ok(())
}

pub fn insert_nudge(conn: &Connection, n: &NewNudge) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO skill_nudges (dimension, current_level, target_level,
                                  nudge_text, evidence, frequency)
        VALUES (?1, ?2, ?3, ?4, ?5, 1)
        "#,
        params![
            n.dimension,
            n.current_level,
            n.target_level,
            n.nudge_text,
            n.evidence,
        ],
    )?;
    Ok(())
}

pub fn nudges(conn: &Connection, include_dismissed: bool) -> Result<Vec<SkillNudgeRow>> {
    let filter = if include_dismissed {
        ""
    } else {
        "WHERE dismissed = 0"
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT id, dimension, current_level, target_level, nudge_text, evidence, \
                frequency, dismissed, created_at \
         FROM skill_nudges {} ORDER BY id",
        filter
    ))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(SkillNudgeRow {
                id: row.get(0)?,
                dimension: row.get(1)?,
                current_level: row.get(2)?,
                target_level: row.get(3)?,
                nudge_text: row.get(4)?,
                evidence: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                frequency: row.get::<_, Option<i64>>(6)?.unwrap_or(1),
                dismissed: row.get::<_, i64>(7)? != 0,
                created_at: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn dismiss_nudge(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("UPDATE skill_nudges SET dismissed = 1 WHERE id = ?1", [id])?;
    Ok(changed > 0)
}

// --- synthesis ---

pub fn replace_synthesis(conn: &Connection, s: &NewSynthesis) -> Result<()> {
    conn.execute("DELETE FROM synthesis", [])?;
    conn.execute(
        r#"
        INSERT INTO synthesis (id, at_a_glance, usage_narrative, top_wins,
                               top_friction, claude_md_additions, fun_headline)
        VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            s.at_a_glance,
            s.usage_narrative,
            s.top_wins,
            s.top_friction,
            s.claude_md_additions,
            s.fun_headline,
        ],
    )?;
    Ok(())
}

pub fn synthesis(conn: &Connection) -> Result<Option<SynthesisRow>> {
    let row = conn
        .query_row(
            r#"
            SELECT at_a_glance, usage_narrative, top_wins, top_friction,
                   claude_md_additions, fun_headline, generated_at
            FROM synthesis WHERE id = 1
            "#,
            [],
            |row| {
                fn text(row: &Row<'_>, idx: usize) -> std::result::Result<String, rusqlite::Error> {
                    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
                }
                Ok(SynthesisRow {
                    at_a_glance: text(row, 0)?,
                    usage_narrative: text(row, 1)?,
                    top_wins: text(row, 2)?,
                    top_friction: text(row, 3)?,
                    claude_md_additions: text(row, 4)?,
                    fun_headline: text(row, 5)?,
                    generated_at: text(row, 6)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Per-session config suggestions joined to the project directories they
/// came from, for external application tooling.
pub fn claude_md_suggestions(conn: &Connection) -> Result<Vec<SuggestionRow>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT r.cwd, j.claude_md_suggestion
        FROM session_judgments j
        JOIN sessions s ON j.session_id = s.session_id
        JOIN raw_entries r ON s.session_id = r.session_id
        WHERE j.claude_md_suggestion IS NOT NULL AND j.claude_md_suggestion != ''
          AND r.cwd IS NOT NULL AND r.cwd != ''
        GROUP BY r.cwd, j.claude_md_suggestion
        ORDER BY r.cwd
        "#,
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(SuggestionRow {
                cwd: row.get(0)?,
                suggestion: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}
