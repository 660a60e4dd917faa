//! Parallel judgment pass over unjudged sessions.
//!
//! Summaries are pre-built on one reader connection so the worker pool
//! only waits on the LLM. Each worker writes its finished judgment row
//! through the store writer itself; the channel back to the caller
//! carries progress events only. A failed session is counted and logged,
//! never propagated, so one bad reply cannot sink the pass.

use std::sync::Mutex;
use std::sync::mpsc;

use agretro_store::{Store, insights};
use anyhow::Result;
use tracing::warn;

use super::client::JudgeClient;
use super::prompts;
use super::record;
use super::summary;

/// Matched to typical messages-endpoint rate limits.
pub const DEFAULT_CONCURRENCY: usize = 12;

/// Zero-turn sessions are trivial Q&A; not worth a judge call.
const MIN_TURNS: i64 = 1;

/// Totals for one judgment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JudgeOutcome {
    pub judged: i64,
    pub errors: i64,
}

/// Snapshot handed to the progress callback after every completion, and
/// once up front so a UI can show the queue size before work starts.
#[derive(Debug, Clone, Copy)]
pub struct JudgeProgress {
    pub done: usize,
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

enum Event {
    Judged,
    Failed { session_id: String, error: String },
}

struct Job {
    session_id: String,
    summary: String,
    turn_count: i64,
}

pub fn judge_sessions(
    store: &Store,
    client: &dyn JudgeClient,
    force: bool,
    concurrency: usize,
    mut on_progress: impl FnMut(JudgeProgress),
) -> Result<JudgeOutcome> {
    let jobs = store.with_reader(|conn| {
        let sql = if force {
            "SELECT session_id FROM sessions WHERE turn_count >= ?1 ORDER BY started_at"
        } else {
            "SELECT s.session_id
             FROM sessions s
             LEFT JOIN session_judgments j ON s.session_id = j.session_id
             WHERE j.session_id IS NULL AND s.turn_count >= ?1
             ORDER BY s.started_at"
        };
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
            .query_map([MIN_TURNS], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        let mut jobs = Vec::with_capacity(ids.len());
        for session_id in ids {
            let (summary, turn_count) = summary::build_session_summary(conn, &session_id)?;
            if summary.is_empty() {
                continue;
            }
            jobs.push(Job { session_id, summary, turn_count });
        }
        Ok(jobs)
    })?;

    let total = jobs.len();
    if total == 0 {
        on_progress(JudgeProgress { done: 0, total: 0, ok: 0, errors: 0 });
        return Ok(JudgeOutcome::default());
    }
    on_progress(JudgeProgress { done: 0, total, ok: 0, errors: 0 });

    let queue = Mutex::new(jobs.into_iter());
    let (events_tx, events_rx) = mpsc::channel::<Event>();
    let workers = concurrency.clamp(1, total);

    let (ok, errors) = std::thread::scope(|scope| {
        for _ in 0..workers {
            let events = events_tx.clone();
            let queue = &queue;
            let store = store.clone();
            scope.spawn(move || {
                loop {
                    let job = queue
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .next();
                    let Some(job) = job else { break };
                    let event = match judge_one(&store, client, &job) {
                        Ok(()) => Event::Judged,
                        Err(error) => Event::Failed {
                            session_id: job.session_id,
                            error: error.to_string(),
                        },
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
            });
        }
        drop(events_tx);

        let mut ok = 0usize;
        let mut errors = 0usize;
        for event in events_rx {
            match event {
                Event::Judged => ok += 1,
                Event::Failed { session_id, error } => {
                    errors += 1;
                    warn!(%session_id, %error, "session judgment failed");
                }
            }
            on_progress(JudgeProgress { done: ok + errors, total, ok, errors });
        }
        (ok, errors)
    });

    Ok(JudgeOutcome { judged: ok as i64, errors: errors as i64 })
}

fn judge_one(store: &Store, client: &dyn JudgeClient, job: &Job) -> Result<()> {
    let prompt = prompts::session_prompt(&job.summary, job.turn_count);
    let raw = client.complete(&prompt)?;
    let rec = record::record_from_reply(&job.session_id, job.turn_count, &raw);
    store.with_writer(|conn| insights::upsert_judgment(conn, &rec))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use agretro_store::entries;
    use agretro_types::{EntryKind, RawEntry};

    use super::*;
    use crate::stages;

    struct ScriptedJudge {
        reply: String,
    }

    impl JudgeClient for ScriptedJudge {
        fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.reply.clone())
        }
    }

    /// Fails whenever the prompt mentions the poisoned marker.
    struct FlakyJudge {
        marker: String,
        reply: String,
    }

    impl JudgeClient for FlakyJudge {
        fn complete(&self, prompt: &str) -> Result<String> {
            if prompt.contains(&self.marker) {
                anyhow::bail!("endpoint unavailable");
            }
            Ok(self.reply.clone())
        }
    }

    fn prompt(id: &str, session: &str, ts: &str, words: &str) -> RawEntry {
        let mut e = RawEntry::new(id, session, "demo", EntryKind::User, ts);
        e.user_text = Some(words.to_string());
        e
    }

    fn reply(id: &str, session: &str, ts: &str, tools: &[&str]) -> RawEntry {
        let mut e = RawEntry::new(id, session, "demo", EntryKind::Assistant, ts);
        e.tool_names = tools.iter().map(|t| t.to_string()).collect();
        e
    }

    fn turn_marker(id: &str, session: &str, ts: &str) -> RawEntry {
        let mut e = RawEntry::new(id, session, "demo", EntryKind::System, ts);
        e.system_subtype = Some("turn_duration".to_string());
        e
    }

    fn seeded_store(sessions: &[(&str, &str)]) -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .with_writer(|conn| {
                for (i, (session, words)) in sessions.iter().enumerate() {
                    let base = i * 10;
                    let hour = 10 + i;
                    entries::upsert_raw_entry(
                        conn,
                        &prompt(
                            &format!("e{}", base),
                            session,
                            &format!("2026-06-01T{:02}:00:00Z", hour),
                            words,
                        ),
                    )?;
                    entries::upsert_raw_entry(
                        conn,
                        &reply(
                            &format!("e{}", base + 1),
                            session,
                            &format!("2026-06-01T{:02}:05:00Z", hour),
                            &["Read"],
                        ),
                    )?;
                    entries::upsert_raw_entry(
                        conn,
                        &turn_marker(
                            &format!("e{}", base + 2),
                            session,
                            &format!("2026-06-01T{:02}:06:00Z", hour),
                        ),
                    )?;
                }
                Ok(())
            })
            .unwrap();
        stages::sessions::build_sessions(&store).unwrap();
        store
    }

    fn completed_reply() -> String {
        r#"{"outcome": "completed", "outcome_confidence": 0.9, "productive_turns": 2, "waste_turns": 0, "prompt_summary": "did the thing"}"#
            .to_string()
    }

    #[test]
    fn empty_store_reports_an_empty_pass() {
        let store = Store::open_in_memory().unwrap();
        let judge = ScriptedJudge { reply: completed_reply() };
        let mut snapshots = Vec::new();
        let outcome =
            judge_sessions(&store, &judge, false, 4, |p| snapshots.push(p)).unwrap();
        assert_eq!(outcome, JudgeOutcome::default());
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].total, 0);
    }

    #[test]
    fn workers_judge_every_session_and_write_their_own_rows() {
        let store = seeded_store(&[("s1", "fix the login bug"), ("s2", "add retry logic")]);
        let judge = ScriptedJudge { reply: completed_reply() };
        let mut snapshots = Vec::new();
        let outcome =
            judge_sessions(&store, &judge, false, 3, |p| snapshots.push(p)).unwrap();

        assert_eq!(outcome, JudgeOutcome { judged: 2, errors: 0 });
        let (count, rec) = store
            .with_reader(|conn| {
                Ok((insights::judged_count(conn)?, insights::judgment(conn, "s1")?))
            })
            .unwrap();
        assert_eq!(count, 2);
        let rec = rec.unwrap();
        assert_eq!(rec.outcome, "completed");
        assert_eq!(rec.prompt_summary, "did the thing");

        let last = snapshots.last().unwrap();
        assert_eq!(last.done, 2);
        assert_eq!(last.total, 2);
        assert_eq!(last.ok, 2);
    }

    #[test]
    fn second_pass_skips_already_judged_sessions() {
        let store = seeded_store(&[("s1", "fix the login bug")]);
        let judge = ScriptedJudge { reply: completed_reply() };

        let first = judge_sessions(&store, &judge, false, 2, |_| {}).unwrap();
        assert_eq!(first.judged, 1);
        let second = judge_sessions(&store, &judge, false, 2, |_| {}).unwrap();
        assert_eq!(second.judged, 0);
        let forced = judge_sessions(&store, &judge, true, 2, |_| {}).unwrap();
        assert_eq!(forced.judged, 1);
    }

    #[test]
    fn a_failing_session_is_counted_but_does_not_sink_the_pass() {
        let store = seeded_store(&[("s1", "fix the login bug"), ("s2", "touch the cursed file")]);
        let judge = FlakyJudge {
            marker: "cursed".to_string(),
            reply: completed_reply(),
        };
        let outcome = judge_sessions(&store, &judge, false, 2, |_| {}).unwrap();

        assert_eq!(outcome, JudgeOutcome { judged: 1, errors: 1 });
        let (good, bad) = store
            .with_reader(|conn| {
                Ok((insights::judgment(conn, "s1")?, insights::judgment(conn, "s2")?))
            })
            .unwrap();
        assert!(good.is_some());
        assert!(bad.is_none());
    }
}
