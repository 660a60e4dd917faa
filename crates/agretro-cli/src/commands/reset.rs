//! Delete the database, WAL and all.

use agretro_store::Store;
use anyhow::Result;

use crate::context::ExecutionContext;

pub fn handle(ctx: &ExecutionContext) -> Result<()> {
    let db_path = &ctx.config().db_path;
    if !db_path.exists() {
        println!("No database to reset.");
        return Ok(());
    }

    Store::destroy(db_path)?;
    println!("Deleted {}", db_path.display());
    Ok(())
}
