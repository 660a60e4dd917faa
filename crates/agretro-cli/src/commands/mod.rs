mod digest;
mod export;
mod ingest;
mod refresh;
mod reset;
mod search;
mod sessions;
mod status;
mod watch;

use anyhow::Result;

use crate::args::{Cli, Command};
use crate::context::ExecutionContext;

pub fn run(cli: Cli) -> Result<()> {
    let ctx = ExecutionContext::new(cli.db.as_deref(), &cli.sources)?;

    match cli.command {
        Command::Ingest { force } => ingest::handle(&ctx, force),
        Command::Refresh { concurrency, force } => refresh::handle(&ctx, concurrency, force),
        Command::Watch => watch::handle(&ctx),
        Command::Status { json } => status::handle(&ctx, json),
        Command::Sessions {
            project,
            limit,
            json,
        } => sessions::handle(&ctx, project.as_deref(), limit, json),
        Command::Search { query, limit } => search::handle(&ctx, &query, limit),
        Command::Export { output } => export::handle(&ctx, output.as_deref()),
        Command::Digest => digest::handle(&ctx),
        Command::Reset => reset::handle(&ctx),
    }
}
