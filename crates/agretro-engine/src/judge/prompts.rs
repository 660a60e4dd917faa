//! Prompt templates for session judgment and the synthesis report.
//!
//! Templates carry `{name}` markers filled by plain string replacement.
//! Markers are substituted before the transcript is spliced in, so user
//! text can never trigger a second substitution.

pub(crate) const SESSION_PROMPT: &str = r#"You are analyzing a Claude Code session transcript. Evaluate the outcome, trajectory, and write a narrative.

SESSION TRANSCRIPT:
{summary}

This session has {turn_count} turns total. Each "TURN N" in the transcript is one turn.

Respond with ONLY a JSON object (no markdown, no backticks):
{
  "outcome": "completed" | "partially_completed" | "failed" | "abandoned" | "exploratory",
  "outcome_confidence": 0.0-1.0,
  "outcome_reasoning": "brief explanation",
  "prompt_clarity": 0.0-1.0,
  "prompt_completeness": 0.0-1.0,
  "prompt_missing": ["list of things missing or underspecified in the initial prompt"],
  "prompt_summary": "one sentence summary of what the user wanted",
  "trajectory_summary": "2-3 sentence narrative of how the session evolved",
  "underspecified_parts": [
    {"aspect": "what was underspecified", "impact": "what problem it caused"}
  ],
  "misalignment_count": 0,
  "misalignments": [
    {"turn": 1, "description": "what Claude did wrong"}
  ],
  "correction_count": 0,
  "corrections": [
    {"turn": 2, "type": "clarification|redirect|fix", "description": "what the user said to fix it"}
  ],
  "productive_turns": 0,
  "waste_turns": 0,
  "productivity_ratio": 0.0-1.0,
  "waste_breakdown": {"misalignment": 0, "errors": 0, "rework": 0},
  "narrative": "3-4 paragraph story of what happened in this session. Be specific — reference actual prompts, tool calls, errors. Write in past tense, third person. Include what went well and what went wrong.",
  "what_worked": "1-2 sentences on what went well, with specific examples from the transcript",
  "what_failed": "1-2 sentences on what went wrong, with specific examples from the transcript. If nothing failed, say so.",
  "user_quote": "the most notable thing the user said, verbatim from the transcript (copy the exact text)",
  "claude_md_suggestion": "A specific CLAUDE.md rule that would prevent this session's friction or improve future sessions. Format as a single line starting with '- '. If the session was perfect, suggest a rule that reinforces what worked.",
  "claude_md_rationale": "Why this rule matters, referencing what happened in this session"
}

Rules:
- outcome: completed=finished successfully, partially_completed=some progress, failed=didn't succeed, abandoned=gave up, exploratory=no specific goal
- productive_turns + waste_turns MUST equal {turn_count}
- A turn is "waste" if wrong, redundant, or caused by misalignment
- misalignment_count must equal length of misalignments array
- correction_count must equal length of corrections array
- narrative: Write a SPECIFIC story. Don't say "the user asked Claude to do X". Say "the user asked Claude to fix the flaky test in auth.py". Reference actual filenames, error messages, tool names.
- user_quote: Copy the most interesting/revealing user message verbatim. Pick the one that best shows the user's intent or frustration.
- claude_md_suggestion: Must be actionable and specific. Bad: "Be more careful". Good: "- Always run tests after editing test files before reporting success"."#;

pub(crate) const SYNTHESIS_PROMPT: &str = r#"You are analyzing a collection of Claude Code session analyses to produce a comprehensive user report.

SESSION SUMMARIES:
{session_data}

OVERALL STATS:
- Total sessions: {total_sessions}
- Completion rate: {completion_rate}
- Average productivity: {avg_productivity}
- Total hours: {total_hours}
- Sessions with misalignments: {misalignment_sessions}/{total_sessions}

Respond with ONLY a JSON object (no markdown, no backticks):
{
  "at_a_glance": {
    "whats_working": "2-3 sentences on patterns that lead to successful sessions",
    "whats_hindering": "2-3 sentences on recurring friction points",
    "quick_wins": "2-3 specific, actionable things the user could do today",
    "ambitious_workflows": "1-2 sentences on the most complex/impressive things the user has accomplished"
  },
  "usage_narrative": "2-3 paragraph behavioral profile of how this user works with Claude Code. Be specific — reference actual project names, common patterns, time-of-day preferences. Write in second person ('you'). Mention specific strengths and blind spots.",
  "top_wins": [
    {"title": "short title", "description": "1-2 sentences with specific examples from sessions"}
  ],
  "top_friction": [
    {"title": "short title", "description": "1-2 sentences explaining the pattern", "examples": ["specific example from a session"]}
  ],
  "claude_md_additions": [
    {"rule": "the CLAUDE.md rule text (start with '- ')", "rationale": "why this matters", "evidence": "specific session examples that support this"}
  ],
  "fun_headline": "A witty, humorous one-liner about a notable moment from the sessions (reference something specific)"
}

Guidelines:
- top_wins: 2-4 items. Focus on impressive accomplishments and effective patterns.
- top_friction: 2-4 items. Focus on recurring problems, not one-off issues.
- claude_md_additions: 3-5 rules. Each must be specific and actionable. Bad: "Write better prompts". Good: "- When debugging, always include the full error message and stack trace in your first prompt".
- fun_headline: Be genuinely funny. Reference something specific from the sessions.
- usage_narrative: Paint a picture of the user's working style. Are they a debugger or a builder? Do they work in bursts or steady sessions? Do they give Claude freedom or micromanage?"#;

pub(crate) fn session_prompt(summary: &str, turn_count: i64) -> String {
    SESSION_PROMPT
        .replace("{turn_count}", &turn_count.to_string())
        .replace("{summary}", summary)
}

pub(crate) struct SynthesisStats {
    pub total_sessions: i64,
    pub completion_rate: f64,
    pub avg_productivity: f64,
    pub total_hours: f64,
    pub misaligned_sessions: i64,
}

pub(crate) fn synthesis_prompt(session_data: &str, stats: &SynthesisStats) -> String {
    let completion = if stats.completion_rate > 0.0 {
        crate::text::percent(stats.completion_rate)
    } else {
        "N/A".to_string()
    };
    let productivity = if stats.avg_productivity > 0.0 {
        crate::text::percent(stats.avg_productivity)
    } else {
        "N/A".to_string()
    };
    let hours = if stats.total_hours > 0.0 {
        format!("{:.1}", stats.total_hours)
    } else {
        "0".to_string()
    };
    SYNTHESIS_PROMPT
        .replace("{total_sessions}", &stats.total_sessions.to_string())
        .replace("{completion_rate}", &completion)
        .replace("{avg_productivity}", &productivity)
        .replace("{total_hours}", &hours)
        .replace("{misalignment_sessions}", &stats.misaligned_sessions.to_string())
        .replace("{session_data}", session_data)
}
