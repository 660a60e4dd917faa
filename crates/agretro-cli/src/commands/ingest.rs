//! Blocking local pipeline: ingest, heuristic stages, search index.

use agretro_engine::stages;
use agretro_ingest::{IngestProgress, IngestService};
use anyhow::Result;

use crate::context::ExecutionContext;

pub fn handle(ctx: &ExecutionContext, force: bool) -> Result<()> {
    let store = ctx.store()?;

    println!("Ingesting source files...");
    let stats = IngestService::new(store, &ctx.config().sources).run(force, |event| {
        if let IngestProgress::FileQuarantined {
            path, error_type, ..
        } = event
        {
            eprintln!(
                "  warning: quarantined {} ({})",
                path.display(),
                error_type
            );
        }
    })?;

    println!(
        "  Files: {} total, {} ingested, {} skipped",
        stats.total_files, stats.ingested_files, stats.skipped_files
    );
    if stats.failed_files > 0 {
        println!("  Quarantined: {}", stats.failed_files);
    }
    println!(
        "  Entries: {} new, {} total in DB",
        stats.new_entries, stats.store_entries
    );
    println!("  Sessions found: {}", stats.store_sessions);
    println!("  Projects: {}", stats.store_projects);

    for stage in stages::ANALYSIS_STAGES {
        println!("{}...", stage.label);
        let n = (stage.run)(store)?;
        println!("  {} {}", n, stage.count_noun);
    }

    println!("Building search index...");
    let indexed = stages::rebuild_search_index(store)?;
    println!("  {} entries indexed", indexed);

    println!("\nIngestion complete!");
    Ok(())
}
