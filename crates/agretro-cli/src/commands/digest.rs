//! Weekly digest on stdout.

use agretro_engine::digest::weekly_digest;
use anyhow::Result;

use crate::context::ExecutionContext;

pub fn handle(ctx: &ExecutionContext) -> Result<()> {
    let Some(store) = ctx.open_existing()? else {
        println!(
            "No database at {}. Run 'agretro ingest' first.",
            ctx.config().db_path.display()
        );
        return Ok(());
    };

    println!("{}", weekly_digest(store)?);
    Ok(())
}
