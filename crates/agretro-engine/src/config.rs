//! Scoring weights, classification thresholds, and marker vocabularies
//! shared by the analysis stages.

// Convergence component weights. Each weight group sums to 1.0.
pub const CONV_W_PROMPT_DECREASE: f64 = 0.25;
pub const CONV_W_DECISIONS: f64 = 0.20;
pub const CONV_W_LOW_CORRECTION: f64 = 0.20;
pub const CONV_W_LOW_TOOL_ERROR: f64 = 0.15;
pub const CONV_W_HAS_PR: f64 = 0.10;
pub const CONV_W_STABLE_RESPONSE: f64 = 0.10;

// Drift component weights.
pub const DRIFT_W_ENTROPY: f64 = 0.25;
pub const DRIFT_W_PROMPT_INCREASE: f64 = 0.20;
pub const DRIFT_W_BRANCH_SWITCHES: f64 = 0.15;
pub const DRIFT_W_SIDECHAIN: f64 = 0.15;
pub const DRIFT_W_NO_DECISIONS: f64 = 0.15;
pub const DRIFT_W_LONG_SESSION: f64 = 0.10;

// Thrash component weights.
pub const THRASH_W_CORRECTION: f64 = 0.30;
pub const THRASH_W_TOOL_ERROR: f64 = 0.25;
pub const THRASH_W_REPHRASING: f64 = 0.20;
pub const THRASH_W_OSCILLATION: f64 = 0.15;
pub const THRASH_W_API_ERRORS: f64 = 0.10;

// Trajectory classification cutoffs, checked in order: converged,
// drifted, thrashed, mixed.
pub const CONVERGED_MIN_CONVERGENCE: f64 = 0.6;
pub const CONVERGED_MAX_DRIFT: f64 = 0.3;
pub const CONVERGED_MAX_THRASH: f64 = 0.3;
pub const DRIFTED_MIN_DRIFT: f64 = 0.5;
pub const DRIFTED_MAX_CONVERGENCE: f64 = 0.4;
pub const THRASHED_MIN_THRASH: f64 = 0.5;
pub const THRASHED_MAX_CONVERGENCE: f64 = 0.4;
pub const MIXED_MIN_CONVERGENCE: f64 = 0.4;

/// Rolling-window sizes for baseline rows, in sessions.
pub const BASELINE_WINDOWS: [i64; 2] = [14, 60];

/// Intent labels with their trigger keywords. Order is the tie-break
/// order when two intents score equally.
pub const INTENT_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "debug",
        &[
            "bug",
            "error",
            "fix",
            "broken",
            "crash",
            "fail",
            "issue",
            "wrong",
            "traceback",
            "exception",
            "debug",
            "stack trace",
        ],
    ),
    (
        "implement",
        &[
            "add",
            "create",
            "build",
            "implement",
            "new feature",
            "write",
            "make",
            "generate",
        ],
    ),
    (
        "refactor",
        &[
            "refactor",
            "clean up",
            "restructure",
            "reorganize",
            "rename",
            "extract",
            "simplify",
            "move",
        ],
    ),
    (
        "research",
        &[
            "how does",
            "what is",
            "explain",
            "understand",
            "look at",
            "find",
            "search",
            "where is",
            "show me",
        ],
    ),
    (
        "brainstorm",
        &[
            "idea",
            "think about",
            "consider",
            "brainstorm",
            "design",
            "plan",
            "approach",
            "strategy",
            "option",
        ],
    ),
    (
        "review",
        &[
            "review",
            "check",
            "audit",
            "look over",
            "examine",
            "inspect",
            "pr",
            "pull request",
        ],
    ),
    (
        "prototype",
        &[
            "prototype",
            "proof of concept",
            "poc",
            "experiment",
            "try",
            "test",
            "spike",
            "explore",
        ],
    ),
];

/// Phrases that signal a decision was reached.
pub const DECISION_MARKERS: &[&str] = &[
    "let's go with",
    "i'll use",
    "decided to",
    "going with",
    "chosen",
    "the approach",
    "final",
    "commit",
    "ship",
    "merge",
    "lgtm",
    "looks good",
    "that works",
    "perfect",
    "done",
    "complete",
];

/// Phrases that signal the user is correcting the assistant.
pub const CORRECTION_MARKERS: &[&str] = &[
    "actually",
    "wait",
    "no,",
    "sorry",
    "wrong",
    "instead",
    "not that",
    "undo",
    "revert",
    "go back",
    "try again",
    "that's not",
    "that didn't",
    "doesn't work",
    "not working",
];

/// Phrases that signal the user is restating an earlier request.
pub const REPHRASING_MARKERS: &[&str] = &[
    "i mean",
    "what i meant",
    "to clarify",
    "in other words",
    "let me rephrase",
    "more specifically",
    "to be clear",
];

// Tool categories for usage ratios.
pub const EDIT_WRITE_TOOLS: &[&str] = &["Edit", "Write", "NotebookEdit"];
pub const READ_GREP_TOOLS: &[&str] = &["Read", "Grep", "Glob"];
pub const BASH_TOOLS: &[&str] = &["Bash"];
pub const TASK_TOOLS: &[&str] = &["Task"];
pub const WEB_TOOLS: &[&str] = &["WebFetch", "WebSearch"];

/// Skill dimension names, indexed D1 through D10.
pub const SKILL_DIMENSIONS: [&str; 10] = [
    "Context Management",
    "Planning & Decomposition",
    "Prompt Craft",
    "CLAUDE.md Configuration",
    "Tool Leverage",
    "Verification & QA",
    "Git Workflow",
    "Error Recovery",
    "Session Strategy",
    "Codebase Design",
];

/// Display name for a 1-based dimension number.
pub fn dimension_name(dimension: usize) -> &'static str {
    SKILL_DIMENSIONS
        .get(dimension.wrapping_sub(1))
        .copied()
        .unwrap_or("Unknown")
}

/// Parse a "D3" style dimension id into its 1-based number.
pub fn dimension_number(id: &str) -> Option<usize> {
    let n: usize = id.strip_prefix('D')?.parse().ok()?;
    (1..=10).contains(&n).then_some(n)
}

// Detection vocabularies for the skill detectors. Matching is
// case-insensitive substring containment.
pub const SKILL_CONTEXT_COMMANDS: &[&str] = &["/clear", "/compact", "/context"];
pub const SKILL_COMPACT_FOCUS: &[&str] = &["focus on", "only keep", "retain context"];
pub const SKILL_PROMPT_REFS: &[&str] = &["@file", "@folder", "@url"];
pub const SKILL_ACCEPTANCE_CRITERIA: &[&str] = &[
    "should pass",
    "don't change",
    "do not change",
    "must pass",
    "acceptance criteria",
    "expected output",
    "expected behavior",
];
pub const SKILL_THINKING_TRIGGERS: &[&str] = &[
    "think hard",
    "think carefully",
    "ultrathink",
    "think step by step",
    "reason through",
];
pub const SKILL_TEST_COMMANDS: &[&str] = &[
    "pytest",
    "npm test",
    "yarn test",
    "make test",
    "cargo test",
    "go test",
    "jest",
    "vitest",
    "mocha",
    "rspec",
    "unittest",
    "test_",
];
pub const SKILL_ROOT_CAUSE: &[&str] = &[
    "explain why",
    "don't fix yet",
    "do not fix",
    "root cause",
    "why is this",
    "what caused",
    "diagnose",
    "investigate first",
];
pub const SKILL_SESSION_RESUME: &[&str] = &["--continue", "--resume", "background"];
pub const SKILL_INIT_COMMANDS: &[&str] = &["/init", "claude.md"];

/// Nudge copy for lifting one dimension to the given target level.
pub fn nudge_for(dimension: usize, target_level: i64) -> Option<&'static str> {
    let text = match (dimension, target_level) {
        (1, 2) => {
            "Try using /compact when your context gets large. Add focus instructions like '/compact focus on the auth module'."
        }
        (1, 3) => {
            "Use /clear between distinct subtasks to reset context. Watch for topic drift in long sessions."
        }
        (1, 4) => {
            "Structure large tasks to front-load file reads. Use @file references to bring specific context in."
        }
        (2, 2) => {
            "For multi-file changes, describe your plan before asking Claude to implement. List the files and changes needed."
        }
        (2, 3) => {
            "Use Plan Mode (ask Claude to plan first) for complex tasks. Reference spec files for shared understanding."
        }
        (2, 4) => {
            "Use the Task tool to parallelize independent subtasks. Break work into focused sub-agents."
        }
        (3, 2) => {
            "Include file paths and error messages in your prompts. Be specific about what 'working' means."
        }
        (3, 3) => {
            "Add acceptance criteria: 'should pass tests', 'don't change the API'. Use @file to reference context."
        }
        (3, 4) => {
            "Use thinking triggers ('think hard about edge cases') for complex problems. Include constraints explicitly."
        }
        (4, 2) => {
            "Create a CLAUDE.md with your project's coding conventions. Run /init to generate a starter."
        }
        (5, 2) => {
            "Claude has dedicated Read/Edit/Glob/Grep tools. High Bash usage for file ops suggests underuse of built-in tools."
        }
        (5, 3) => {
            "Use the Task tool for parallel research. Leverage subagents for independent code searches."
        }
        (6, 2) => {
            "Ask Claude to run tests after making changes. Add 'run the tests' to your workflow."
        }
        (6, 3) => {
            "Write tests first, then implement. Claude can run test suites and iterate until they pass."
        }
        (6, 4) => {
            "Set up pre-commit hooks that Claude respects. Use /commit for atomic, well-messaged commits."
        }
        (7, 2) => {
            "Use /commit instead of manual git commands. Let Claude craft commit messages from the diff."
        }
        (7, 3) => {
            "Use 'gh pr create' through Claude for PR creation. Reference issues in commits."
        }
        (8, 2) => "Paste full error messages with stack traces. Include reproduction steps.",
        (8, 3) => {
            "Before fixing, ask Claude to explain the root cause. Say 'explain why this happens, don't fix yet'."
        }
        (8, 4) => {
            "After fixing, ask Claude to add regression tests. Create checkpoints with git commits before risky changes."
        }
        (9, 2) => {
            "Keep sessions focused on one task. Start new sessions for new tasks instead of continuing long ones."
        }
        (9, 3) => {
            "Use --continue to resume interrupted sessions. Use --resume for picking up where you left off."
        }
        (9, 4) => {
            "Run multiple Claude sessions in parallel for independent tasks. Use background agents for CI-like workflows."
        }
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_groups_sum_to_one() {
        let conv = CONV_W_PROMPT_DECREASE
            + CONV_W_DECISIONS
            + CONV_W_LOW_CORRECTION
            + CONV_W_LOW_TOOL_ERROR
            + CONV_W_HAS_PR
            + CONV_W_STABLE_RESPONSE;
        let drift = DRIFT_W_ENTROPY
            + DRIFT_W_PROMPT_INCREASE
            + DRIFT_W_BRANCH_SWITCHES
            + DRIFT_W_SIDECHAIN
            + DRIFT_W_NO_DECISIONS
            + DRIFT_W_LONG_SESSION;
        let thrash = THRASH_W_CORRECTION
            + THRASH_W_TOOL_ERROR
            + THRASH_W_REPHRASING
            + THRASH_W_OSCILLATION
            + THRASH_W_API_ERRORS;
        assert!((conv - 1.0).abs() < 1e-9);
        assert!((drift - 1.0).abs() < 1e-9);
        assert!((thrash - 1.0).abs() < 1e-9);
    }

    #[test]
    fn dimension_names_resolve() {
        assert_eq!(dimension_name(1), "Context Management");
        assert_eq!(dimension_name(10), "Codebase Design");
        assert_eq!(dimension_name(0), "Unknown");
        assert_eq!(dimension_name(11), "Unknown");
    }

    #[test]
    fn dimension_ids_parse() {
        assert_eq!(dimension_number("D1"), Some(1));
        assert_eq!(dimension_number("D10"), Some(10));
        assert_eq!(dimension_number("D11"), None);
        assert_eq!(dimension_number("d3"), None);
        assert_eq!(dimension_number("3"), None);
    }

    #[test]
    fn nudges_cover_every_gap_target() {
        assert!(nudge_for(1, 2).is_some());
        assert!(nudge_for(4, 2).is_some());
        assert!(nudge_for(9, 4).is_some());
        // D4 only has copy for the first step, D10 has none.
        assert!(nudge_for(4, 3).is_none());
        assert!(nudge_for(10, 2).is_none());
        assert!(nudge_for(1, 5).is_none());
    }
}
