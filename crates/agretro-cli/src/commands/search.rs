//! Full-text search over ingested transcripts.

use anyhow::Result;

use crate::context::ExecutionContext;

pub fn handle(ctx: &ExecutionContext, query: &str, limit: usize) -> Result<()> {
    let Some(store) = ctx.open_existing()? else {
        println!(
            "No database at {}. Run 'agretro ingest' first.",
            ctx.config().db_path.display()
        );
        return Ok(());
    };

    let hits = store.search(query, limit)?;
    if hits.is_empty() {
        println!("No matches.");
        return Ok(());
    }

    for hit in &hits {
        let id: String = hit.session_id.chars().take(16).collect();
        println!("{}  [{}]", id, hit.entry_type);
        println!("    {}", hit.snippet.replace('\n', " "));
    }
    println!("\n{} matches", hits.len());
    Ok(())
}
