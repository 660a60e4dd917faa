//! Full refresh: the local pipeline plus the LLM judge, a recompute of
//! the judgment-aware tables, and the synthesis report.

use agretro_engine::judge::{self, HttpJudgeClient};
use agretro_engine::stages;
use agretro_ingest::IngestService;
use anyhow::Result;

use crate::context::ExecutionContext;

pub fn handle(ctx: &ExecutionContext, concurrency: usize, force: bool) -> Result<()> {
    let store = ctx.store()?;

    println!("Ingesting source files...");
    let stats = IngestService::new(store, &ctx.config().sources).run(false, |_| {})?;
    println!(
        "  Files: {} total, {} ingested, {} skipped",
        stats.total_files, stats.ingested_files, stats.skipped_files
    );
    println!(
        "  Entries: {} new, {} total in DB",
        stats.new_entries, stats.store_entries
    );

    for stage in stages::ANALYSIS_STAGES {
        println!("{}...", stage.label);
        let n = (stage.run)(store)?;
        println!("  {} {}", n, stage.count_noun);
    }

    let client = HttpJudgeClient::from_env()?;

    println!("Judging sessions (LLM analysis)...");
    let outcome = judge::judge_sessions(store, &client, force, concurrency, |p| {
        if p.done == 0 && p.total > 0 {
            println!("  Judging {} sessions ({} parallel)...", p.total, concurrency);
        } else if p.done > 0 && (p.done % 10 == 0 || p.done == p.total) {
            println!(
                "  Progress: {}/{} ({} ok, {} errors)",
                p.done, p.total, p.ok, p.errors
            );
        }
    })?;
    println!("  {} sessions judged", outcome.judged);
    if outcome.errors > 0 {
        println!("  {} sessions failed (will retry next pass)", outcome.errors);
    }

    println!("Recomputing baselines...");
    let n = stages::baselines::compute_baselines(store)?;
    println!("  {} baselines computed", n);

    println!("Regenerating prescriptions...");
    let n = stages::prescriptions::generate_prescriptions(store)?;
    println!("  {} prescriptions generated", n);

    println!("Synthesizing usage report...");
    if judge::generate_synthesis(store, &client)? {
        println!("  Done");
    } else {
        println!("  Skipped (fewer than 3 judged sessions)");
    }

    println!("Building search index...");
    let indexed = stages::rebuild_search_index(store)?;
    println!("  {} entries indexed", indexed);

    println!("\nRefresh complete!");
    Ok(())
}
