//! Store overview: totals, judge coverage, active prescriptions.

use agretro_store::insights;
use anyhow::Result;
use serde_json::json;

use crate::context::ExecutionContext;

pub fn handle(ctx: &ExecutionContext, json_mode: bool) -> Result<()> {
    let db_path = &ctx.config().db_path;
    let Some(store) = ctx.open_existing()? else {
        println!("No database at {}. Run 'agretro ingest' first.", db_path.display());
        return Ok(());
    };

    let totals = store.totals()?;
    let analyzed = store.session_count()?;
    let judged = store.with_reader(insights::judged_count)?;
    let active = store.prescriptions(false)?.len();

    if json_mode {
        let payload = json!({
            "db_path": db_path,
            "entries": totals.entries,
            "progress_entries": totals.progress_entries,
            "sessions_seen": totals.sessions,
            "sessions_analyzed": analyzed,
            "projects": totals.projects,
            "judged_sessions": judged,
            "active_prescriptions": active,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("Database: {}", db_path.display());
    println!(
        "  Entries: {} conversation, {} progress",
        totals.entries, totals.progress_entries
    );
    println!(
        "  Sessions: {} analyzed, {} seen across {} projects",
        analyzed, totals.sessions, totals.projects
    );
    println!("  Judged: {} of {}", judged, analyzed);
    println!("  Active prescriptions: {}", active);
    Ok(())
}
