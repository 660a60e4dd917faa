//! Heuristic intent classification.

use agretro_store::Store;
use anyhow::Result;
use rusqlite::params;

use crate::config;

/// Label a session from its first prompt and tool mix. Keyword hits in
/// the prompt score 2.0 each; tool ratios nudge the related intents.
/// Ties go to the earlier intent in the keyword table.
fn classify_intent(
    first_prompt: &str,
    edit_ratio: f64,
    read_ratio: f64,
    bash_ratio: f64,
) -> &'static str {
    if first_prompt.is_empty() {
        return "unknown";
    }
    let prompt_lower = first_prompt.to_lowercase();

    let mut scores: Vec<(&'static str, f64)> = config::INTENT_KEYWORDS
        .iter()
        .map(|(intent, keywords)| {
            let hits = keywords
                .iter()
                .filter(|kw| prompt_lower.contains(*kw))
                .count();
            (*intent, hits as f64 * 2.0)
        })
        .collect();

    for (intent, score) in scores.iter_mut() {
        match *intent {
            "implement" => *score += edit_ratio * 3.0,
            "debug" => *score += bash_ratio * 2.0,
            "research" => *score += read_ratio * 2.0,
            "refactor" => *score += edit_ratio * 2.0,
            "review" => *score += read_ratio * 1.5,
            _ => {}
        }
    }

    let mut best = ("unknown", 0.0);
    for (intent, score) in scores {
        if score > best.1 {
            best = (intent, score);
        }
    }
    best.0
}

/// Classify every session's intent. Sessions without features fall back
/// to zero tool ratios. Returns the number of sessions classified.
pub fn classify_intents(store: &Store) -> Result<i64> {
    let count = store.with_writer(|conn| {
        let rows = {
            let mut stmt = conn.prepare(
                "SELECT s.session_id, s.first_prompt,
                        COALESCE(f.edit_write_ratio, 0), COALESCE(f.read_grep_ratio, 0),
                        COALESCE(f.bash_ratio, 0)
                 FROM sessions s
                 LEFT JOIN session_features f ON s.session_id = f.session_id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let tx = conn.transaction()?;
        for (session_id, first_prompt, edit_r, read_r, bash_r) in &rows {
            let intent = classify_intent(
                first_prompt.as_deref().unwrap_or(""),
                *edit_r,
                *read_r,
                *bash_r,
            );
            tx.execute(
                "UPDATE sessions SET intent = ?1 WHERE session_id = ?2",
                params![intent, session_id],
            )?;
        }
        tx.commit()?;
        Ok(rows.len() as i64)
    })?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_drive_the_label() {
        assert_eq!(classify_intent("fix the login bug", 0.0, 0.0, 0.0), "debug");
        assert_eq!(
            classify_intent("refactor the session module", 0.0, 0.0, 0.0),
            "refactor"
        );
        assert_eq!(
            classify_intent("how does the scheduler work", 0.0, 0.0, 0.0),
            "research"
        );
        assert_eq!(classify_intent("", 0.5, 0.5, 0.5), "unknown");
        assert_eq!(classify_intent("hello there", 0.0, 0.0, 0.0), "unknown");
    }

    #[test]
    fn keyword_ties_break_by_table_order() {
        // "fix" scores debug, "build" scores implement, both 2.0;
        // debug comes first.
        assert_eq!(classify_intent("fix and build it", 0.0, 0.0, 0.0), "debug");
    }

    #[test]
    fn tool_ratios_tip_the_balance() {
        // No keywords at all: only the ratio adjustments score.
        assert_eq!(classify_intent("tidy this up", 0.5, 0.0, 0.0), "implement");
        assert_eq!(classify_intent("tidy this up", 0.0, 0.8, 0.0), "research");
        // Equal edit contribution lands on implement (3x vs 2x).
        assert_eq!(classify_intent("hmm", 0.4, 0.0, 0.3), "implement");
    }

    #[test]
    fn stamps_every_session() {
        let store = agretro_store::Store::open_in_memory().unwrap();
        store
            .with_writer(|conn| {
                conn.execute(
                    "INSERT INTO sessions (session_id, first_prompt)
                     VALUES ('s1', 'fix the broken test'), ('s2', NULL)",
                    [],
                )?;
                // Features only for s1; s2 must still classify.
                conn.execute(
                    "INSERT INTO session_features (session_id, bash_ratio) VALUES ('s1', 0.4)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        assert_eq!(classify_intents(&store).unwrap(), 2);
        assert_eq!(store.get_session("s1").unwrap().unwrap().intent, "debug");
        assert_eq!(store.get_session("s2").unwrap().unwrap().intent, "unknown");
    }
}
