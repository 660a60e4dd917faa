//! Sessions table as CSV, to stdout or a file.

use std::fs::File;
use std::path::Path;

use agretro_engine::export::export_sessions_csv;
use anyhow::{Context, Result};

use crate::context::ExecutionContext;

pub fn handle(ctx: &ExecutionContext, output: Option<&Path>) -> Result<()> {
    let Some(store) = ctx.open_existing()? else {
        println!(
            "No database at {}. Run 'agretro ingest' first.",
            ctx.config().db_path.display()
        );
        return Ok(());
    };

    match output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("create {}", path.display()))?;
            let n = export_sessions_csv(store, file)?;
            println!("Exported {} sessions to {}", n, path.display());
        }
        None => {
            let stdout = std::io::stdout();
            export_sessions_csv(store, stdout.lock())?;
        }
    }
    Ok(())
}
