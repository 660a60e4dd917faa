use std::path::PathBuf;

use agretro_engine::judge::DEFAULT_CONCURRENCY;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "agretro")]
#[command(about = "Retrospective analytics for AI coding-agent session logs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path (default: platform data directory)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Source root as `agent=path` or a bare path; repeatable
    #[arg(long = "source", global = true)]
    pub sources: Vec<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(about = "Ingest source logs and rebuild the derived tables")]
    Ingest {
        /// Re-ingest files even when unchanged
        #[arg(long)]
        force: bool,
    },

    #[command(about = "Full refresh: ingest, LLM judge, recompute, synthesis")]
    Refresh {
        /// Parallel judge requests
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Re-judge sessions that already have a judgment
        #[arg(long)]
        force: bool,
    },

    #[command(about = "Run the background worker in the foreground")]
    Watch,

    #[command(about = "Show store totals and judge coverage")]
    Status {
        #[arg(long)]
        json: bool,
    },

    #[command(about = "List recent sessions")]
    Sessions {
        /// Filter to one project (e.g. `claude:myrepo`)
        #[arg(long)]
        project: Option<String>,

        #[arg(long, default_value = "20")]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    #[command(about = "Full-text search across ingested transcripts")]
    Search {
        query: String,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    #[command(about = "Export the sessions table as CSV")]
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    #[command(about = "Print the weekly digest")]
    Digest,

    #[command(about = "Delete the database")]
    Reset,
}
