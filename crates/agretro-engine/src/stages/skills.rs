//! Per-session skill assessment across ten practice dimensions, plus the
//! decayed aggregate profile and the nudges derived from its gaps.
//!
//! Each detector reads observable signals (slash commands, tool mix, prompt
//! shape) and reports a demonstrated level alongside a missed-opportunity
//! level for the same dimension. Levels are heuristic floors: absence of a
//! signal never scores above baseline, it just leaves the level at 1.

use std::collections::HashMap;

use agretro_store::{NewNudge, SkillAssessment, Store, insights};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use crate::config;
use crate::text;

/// Tool names shipped with the agent CLI. Anything outside this list (and not
/// a Task variant) is treated as an MCP or plugin tool for D5.
const STANDARD_TOOLS: &[&str] = &[
    "Edit",
    "Write",
    "Read",
    "Grep",
    "Glob",
    "Bash",
    "Task",
    "WebFetch",
    "WebSearch",
    "NotebookEdit",
    "AskUserQuestion",
    "EnterPlanMode",
    "ExitPlanMode",
    "Skill",
    "TaskCreate",
    "TaskUpdate",
    "TaskList",
    "TaskGet",
    "TaskOutput",
    "TaskStop",
    "ListMcpResourcesTool",
    "ReadMcpResourceTool",
];

/// Everything the detectors look at for one session.
struct SessionSignals {
    duration: f64,
    turn_count: i64,
    first_prompt: String,
    user_texts: Vec<String>,
    tool_names: Vec<String>,
    tool_sequence: Vec<String>,
    files_modified: i64,
    features: FeatureSignals,
    judgment_clarity: Option<f64>,
}

#[derive(Default)]
struct FeatureSignals {
    topic_entropy: f64,
    correction_rate: f64,
    correction_count: i64,
    unique_tools: i64,
    bash_ratio: f64,
    task_ratio: f64,
    edit_write_ratio: f64,
    has_pr: bool,
}

/// Rebuilds `session_skills` for every session, then recomputes the decayed
/// profile and regenerates active nudges from its top gaps. Returns the
/// number of sessions assessed.
pub fn assess_skills(store: &Store) -> Result<i64> {
    let count = store.with_writer(|conn| {
        let session_ids: Vec<String> = {
            let mut stmt = conn.prepare("SELECT session_id FROM sessions")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            ids
        };

        let tx = conn.transaction()?;
        insights::clear_session_skills(&tx)?;
        for session_id in &session_ids {
            if let Some(signals) = gather(&tx, session_id)? {
                insights::insert_skill_assessment(&tx, &assess(session_id, &signals))?;
            }
        }
        compute_profile(&tx)?;
        generate_nudges(&tx)?;
        tx.commit()?;
        Ok(session_ids.len() as i64)
    })?;
    Ok(count)
}

fn gather(
    conn: &Connection,
    session_id: &str,
) -> rusqlite::Result<Option<SessionSignals>> {
    let session = conn
        .query_row(
            "SELECT duration_seconds, turn_count, COALESCE(first_prompt, '')
             FROM sessions WHERE session_id = ?1",
            [session_id],
            |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((duration, turn_count, first_prompt)) = session else {
        return Ok(None);
    };

    let features = conn
        .query_row(
            "SELECT topic_keyword_entropy, correction_rate, correction_count,
                    unique_tools_used, bash_ratio, task_ratio, edit_write_ratio,
                    has_pr_link
             FROM session_features WHERE session_id = ?1",
            [session_id],
            |row| {
                Ok(FeatureSignals {
                    topic_entropy: row.get(0)?,
                    correction_rate: row.get(1)?,
                    correction_count: row.get(2)?,
                    unique_tools: row.get(3)?,
                    bash_ratio: row.get(4)?,
                    task_ratio: row.get(5)?,
                    edit_write_ratio: row.get(6)?,
                    has_pr: row.get(7)?,
                })
            },
        )
        .optional()?
        .unwrap_or_default();

    let mut stmt = conn.prepare_cached(
        "SELECT user_text FROM raw_entries
         WHERE session_id = ?1 AND entry_type = 'user'
           AND NOT is_tool_result AND user_text_length > 0
         ORDER BY timestamp_utc",
    )?;
    let user_texts = stmt
        .query_map([session_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT tool_name, use_count FROM session_tool_usage WHERE session_id = ?1",
    )?;
    let usage: HashMap<String, i64> = stmt
        .query_map([session_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;
    let tool_names: Vec<String> = usage.keys().cloned().collect();
    let files_modified = ["Edit", "Write", "NotebookEdit"]
        .iter()
        .filter_map(|t| usage.get(*t))
        .sum();

    // Tool calls in issue order, for test-before-edit detection.
    let mut stmt = conn.prepare_cached(
        "SELECT tool_names FROM raw_entries
         WHERE session_id = ?1 AND entry_type = 'assistant' AND tool_names IS NOT NULL
         ORDER BY timestamp_utc",
    )?;
    let batches = stmt
        .query_map([session_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut tool_sequence = Vec::new();
    for batch in &batches {
        tool_sequence.extend(serde_json::from_str::<Vec<String>>(batch).unwrap_or_default());
    }

    let judgment_clarity = conn
        .query_row(
            "SELECT prompt_clarity FROM session_judgments WHERE session_id = ?1",
            [session_id],
            |row| row.get::<_, Option<f64>>(0),
        )
        .optional()?
        .flatten();

    Ok(Some(SessionSignals {
        duration,
        turn_count,
        first_prompt,
        user_texts,
        tool_names,
        tool_sequence,
        files_modified,
        features,
        judgment_clarity,
    }))
}

fn assess(session_id: &str, signals: &SessionSignals) -> SkillAssessment {
    let pairs = [
        detect_context_management(signals),
        detect_planning(signals),
        detect_prompt_craft(signals),
        detect_memory_setup(signals),
        detect_tool_leverage(signals),
        detect_verification(signals),
        detect_git_workflow(signals),
        detect_error_recovery(signals),
        detect_session_strategy(signals),
        detect_automation(signals),
    ];

    let mut levels = [0i64; 10];
    let mut opportunities = [0i64; 10];
    let mut observed = 0;
    for (i, (level, opportunity)) in pairs.iter().enumerate() {
        levels[i] = *level;
        opportunities[i] = *opportunity;
        if *level > 0 || *opportunity > 0 {
            observed += 1;
        }
    }

    SkillAssessment {
        session_id: session_id.to_string(),
        levels,
        opportunities,
        detection_confidence: observed as f64 / 10.0,
    }
}

/// D1: does the user manage the context window deliberately?
fn detect_context_management(s: &SessionSignals) -> (i64, i64) {
    let has_clear = text::contains_any(&s.user_texts, &["/clear"]);
    let has_compact = text::contains_any(&s.user_texts, &["/compact"]);
    let has_focus = text::contains_any(&s.user_texts, config::SKILL_COMPACT_FOCUS);
    let has_context_cmd = text::contains_any(&s.user_texts, config::SKILL_CONTEXT_COMMANDS);
    let entropy = s.features.topic_entropy;

    let mut level = 1;
    if has_compact || has_clear {
        level = 2;
    }
    if has_compact && has_focus {
        level = 3;
    }
    if has_clear && has_compact {
        level = level.max(3);
    }

    let opportunity = if entropy > 0.5 && !has_clear && !has_compact {
        2
    } else if s.duration > 1800.0 && !has_context_cmd {
        2
    } else if has_compact && !has_focus && entropy > 0.3 {
        3
    } else {
        0
    };
    (level, opportunity)
}

/// D2: planning before building.
fn detect_planning(s: &SessionSignals) -> (i64, i64) {
    let has_plan_mode = text::contains_any(&s.user_texts, &["plan mode", "enterplanmode"]);
    let has_numbered = text::has_numbered_steps(&s.user_texts);
    let has_spec = text::contains_any(&s.user_texts, &["spec.md", "implementation plan"]);
    let has_task_tool = s.tool_names.iter().any(|t| t == "Task");

    let mut level = 1;
    if has_numbered || has_spec {
        level = 2;
    }
    if has_plan_mode {
        level = level.max(3);
    }
    if has_task_tool && has_plan_mode {
        level = level.max(4);
    }

    let opportunity = if s.files_modified >= 5 && !has_plan_mode && !has_numbered {
        3
    } else if s.turn_count >= 10 && !has_numbered {
        2
    } else {
        0
    };
    (level, opportunity)
}

/// D3: prompt craft. Judge clarity, when available, can lift the level.
fn detect_prompt_craft(s: &SessionSignals) -> (i64, i64) {
    let has_file_ref = text::contains_any(&s.user_texts, config::SKILL_PROMPT_REFS);
    let has_acceptance = text::contains_any(&s.user_texts, config::SKILL_ACCEPTANCE_CRITERIA);
    let has_thinking = text::contains_any(&s.user_texts, config::SKILL_THINKING_TRIGGERS);
    let has_error_context =
        text::contains_any(&s.user_texts, &["stack trace", "traceback", "error:"]);
    let first_prompt_len = s.first_prompt.chars().count();

    let mut level = 1;
    if first_prompt_len > 200 || has_error_context {
        level = 2;
    }
    if has_file_ref || has_acceptance {
        level = level.max(3);
    }
    if has_thinking && has_acceptance {
        level = level.max(4);
    }
    if let Some(clarity) = s.judgment_clarity
        && clarity >= 0.8
    {
        level = level.max(3);
    }

    let opportunity = if s.features.correction_rate > 0.3 && !has_acceptance {
        3
    } else if first_prompt_len < 100 && s.turn_count > 5 {
        2
    } else if s.judgment_clarity.is_some_and(|c| c < 0.5) {
        2
    } else {
        0
    };
    (level, opportunity)
}

/// D4: CLAUDE.md and /init usage. Only the command itself is observable from
/// the log, so this detector never reports an opportunity.
fn detect_memory_setup(s: &SessionSignals) -> (i64, i64) {
    let has_init = text::contains_any(&s.user_texts, config::SKILL_INIT_COMMANDS);
    (if has_init { 2 } else { 0 }, 0)
}

/// D5: breadth of tool leverage, including MCP servers.
fn detect_tool_leverage(s: &SessionSignals) -> (i64, i64) {
    let unique_tools = s.features.unique_tools;
    let task_ratio = s.features.task_ratio;
    let has_mcp = s.tool_names.iter().any(|t| {
        t.starts_with("mcp__")
            || (!STANDARD_TOOLS.contains(&t.as_str()) && !t.starts_with("Task"))
    });

    let mut level = 1;
    if unique_tools >= 4 {
        level = 2;
    }
    if unique_tools >= 6 && task_ratio > 0.0 {
        level = 3;
    }
    if has_mcp {
        level = level.max(4);
    }

    let opportunity = if s.features.bash_ratio > 0.5 && unique_tools < 4 {
        2
    } else if unique_tools >= 4 && task_ratio == 0.0 && s.files_modified >= 3 {
        3
    } else {
        0
    };
    (level, opportunity)
}

/// D6: verification habits. Test-first means Bash ran before any Edit/Write.
fn detect_verification(s: &SessionSignals) -> (i64, i64) {
    let mut all_texts = s.user_texts.clone();
    all_texts.push(s.first_prompt.clone());
    let has_test_mention = text::contains_any(&all_texts, config::SKILL_TEST_COMMANDS);
    let has_test_run = text::contains_any(
        &all_texts,
        &["run the test", "run tests", "npm test", "pytest"],
    );

    let mut test_first = false;
    if !s.tool_sequence.is_empty() && (has_test_mention || has_test_run) {
        let first_bash = s.tool_sequence.iter().position(|t| t == "Bash");
        let first_edit = s
            .tool_sequence
            .iter()
            .position(|t| t == "Edit" || t == "Write");
        if let (Some(bash), Some(edit)) = (first_bash, first_edit) {
            test_first = bash < edit;
        }
    }

    let mut level = 1;
    if has_test_mention || has_test_run {
        level = 2;
    }
    if test_first {
        level = level.max(3);
    }

    let opportunity = if s.features.edit_write_ratio > 0.2 && !has_test_mention {
        2
    } else if has_test_mention && !test_first && s.files_modified >= 3 {
        3
    } else {
        0
    };
    (level, opportunity)
}

/// D7: git workflow integration.
fn detect_git_workflow(s: &SessionSignals) -> (i64, i64) {
    let has_commit = text::contains_any(&s.user_texts, &["/commit"]);
    let has_gh = text::contains_any(&s.user_texts, &["gh pr", "gh issue"]);
    let has_worktree = text::contains_any(&s.user_texts, &["worktree"]);
    let has_pr = s.features.has_pr;

    let mut level = 1;
    if has_commit {
        level = 2;
    }
    if has_gh || has_pr {
        level = level.max(3);
    }
    if has_worktree {
        level = level.max(4);
    }

    let opportunity = if s.files_modified >= 3 && !has_commit && !has_pr {
        2
    } else {
        0
    };
    (level, opportunity)
}

/// D8: recovery from errors and missteps.
fn detect_error_recovery(s: &SessionSignals) -> (i64, i64) {
    let has_error_context = text::contains_any(
        &s.user_texts,
        &["stack trace", "traceback", "error:", "exception"],
    );
    let has_root_cause = text::contains_any(&s.user_texts, config::SKILL_ROOT_CAUSE);
    let has_checkpoint = text::contains_any(
        &s.user_texts,
        &["checkpoint", "git stash", "save state", "rewind"],
    );
    let corrections = s.features.correction_count;

    let mut level = 1;
    if has_error_context {
        level = 2;
    }
    if has_root_cause {
        level = level.max(3);
    }
    if has_checkpoint {
        level = level.max(4);
    }

    let opportunity = if corrections >= 3 && !has_root_cause {
        3
    } else if corrections >= 1 && !has_error_context {
        2
    } else {
        0
    };
    (level, opportunity)
}

/// D9: session scoping. Short focused sessions score above long meandering
/// ones, resume/background usage above both.
fn detect_session_strategy(s: &SessionSignals) -> (i64, i64) {
    let has_resume = text::contains_any(&s.user_texts, config::SKILL_SESSION_RESUME);
    let has_background = text::contains_any(
        &s.user_texts,
        &[
            "background agent",
            "run in background",
            "parallel session",
            "multiple sessions",
            "headless",
            "run_in_background",
        ],
    );

    let mut level = 1;
    if s.duration < 1800.0 && s.turn_count <= 20 {
        level = 2;
    }
    if has_resume {
        level = level.max(3);
    }
    if has_background {
        level = level.max(4);
    }

    let opportunity = if s.duration > 3600.0 && s.features.topic_entropy > 0.5 {
        2
    } else if s.duration > 1800.0 && s.turn_count > 20 && !has_resume {
        3
    } else {
        0
    };
    (level, opportunity)
}

/// D10: hooks and headless automation leave no trace in session logs, so
/// nothing is detectable yet.
fn detect_automation(_s: &SessionSignals) -> (i64, i64) {
    (0, 0)
}

/// Exponentially decayed average over the most recent assessments, newest
/// first. Gaps come from the last 20 sessions only, so a closed gap clears
/// within a few weeks of use.
fn compute_profile(conn: &Connection) -> agretro_store::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT sk.d1_level, sk.d1_opportunity, sk.d2_level, sk.d2_opportunity,
                sk.d3_level, sk.d3_opportunity, sk.d4_level, sk.d4_opportunity,
                sk.d5_level, sk.d5_opportunity, sk.d6_level, sk.d6_opportunity,
                sk.d7_level, sk.d7_opportunity, sk.d8_level, sk.d8_opportunity,
                sk.d9_level, sk.d9_opportunity, sk.d10_level, sk.d10_opportunity
         FROM session_skills sk
         JOIN sessions s ON sk.session_id = s.session_id
         ORDER BY s.started_at DESC
         LIMIT 100",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let mut levels = [0i64; 10];
            let mut opportunities = [0i64; 10];
            for i in 0..10 {
                levels[i] = row.get(i * 2)?;
                opportunities[i] = row.get(i * 2 + 1)?;
            }
            Ok((levels, opportunities))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if rows.is_empty() {
        return Ok(());
    }

    let weights: Vec<f64> = (0..rows.len()).map(|i| 0.95f64.powi(i as i32)).collect();
    let total_weight: f64 = weights.iter().sum();

    let mut scores = [0.0f64; 10];
    for (dim, score) in scores.iter_mut().enumerate() {
        let weighted: f64 = rows
            .iter()
            .zip(&weights)
            .map(|((levels, _), w)| levels[dim] as f64 * w)
            .sum();
        *score = (weighted / total_weight * 100.0).round() / 100.0;
    }

    let recent = &rows[..rows.len().min(20)];
    let mut gaps: Vec<(String, f64)> = Vec::new();
    for dim in 0..10 {
        let avg_level = recent.iter().map(|(l, _)| l[dim] as f64).sum::<f64>() / recent.len() as f64;
        let avg_opportunity =
            recent.iter().map(|(_, o)| o[dim] as f64).sum::<f64>() / recent.len() as f64;
        let gap = avg_opportunity - avg_level;
        if gap > 0.0 {
            gaps.push((format!("D{}", dim + 1), gap));
        }
    }
    gaps.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let gap_ids: Vec<String> = gaps.into_iter().take(3).map(|(id, _)| id).collect();

    insights::replace_skill_profile(conn, &scores, &gap_ids, rows.len() as i64)
}

/// One nudge per profile gap, pointing at the next level up. Dismissed nudges
/// stay dismissed across rebuilds.
fn generate_nudges(conn: &Connection) -> agretro_store::Result<()> {
    insights::clear_active_nudges(conn)?;
    let Some(profile) = insights::skill_profile(conn)? else {
        return Ok(());
    };

    for gap_id in &profile.gaps {
        let Some(dim) = config::dimension_number(gap_id) else {
            continue;
        };
        let current_level = profile.scores[dim - 1] as i64;
        let target_level = current_level + 1;
        let Some(nudge_text) = config::nudge_for(dim, target_level) else {
            continue;
        };
        insights::insert_nudge(
            conn,
            &NewNudge {
                dimension: gap_id.clone(),
                current_level,
                target_level,
                nudge_text: nudge_text.to_string(),
                evidence: format!(
                    "{}: currently at L{}, aiming for L{}",
                    config::dimension_name(dim),
                    current_level,
                    target_level
                ),
            },
        )?;
    }
    Ok(())
}
