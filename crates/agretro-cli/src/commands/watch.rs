//! Foreground worker: ingest on source changes until Ctrl+C.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use agretro_runtime::{Worker, WorkerConfig, WorkerState, WorkerStatus};
use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

use crate::context::ExecutionContext;

pub fn handle(ctx: &ExecutionContext) -> Result<()> {
    let store = ctx.store()?.clone();
    let config = ctx.config();

    let mut worker_config = WorkerConfig::new(config.sources.clone());
    worker_config.run_immediately = store.totals()?.entries == 0;

    println!("Watching {} source roots", config.sources.len());
    for spec in &config.sources {
        println!("  {}: {}", spec.agent, spec.root.display());
    }
    println!("Database: {}", config.db_path.display());
    if worker_config.run_immediately {
        println!("No data found. Running first ingest...");
    }
    println!("Press Ctrl+C to stop.");

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.store(true, Ordering::SeqCst))
        .context("install Ctrl+C handler")?;

    let worker = Worker::spawn(worker_config, store)?;
    let color = std::io::stdout().is_terminal();

    let mut last = worker.status();
    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(250));
        let status = worker.status();
        if *status != *last {
            print_status(&status, color);
            last = status;
        }
    }

    println!("Stopping...");
    worker.join();
    println!("Stopped.");
    Ok(())
}

fn print_status(status: &WorkerStatus, color: bool) {
    let state = match status.state {
        WorkerState::Idle => "idle",
        WorkerState::Ingesting => "ingesting",
        WorkerState::Judging => "judging",
    };
    let tag = if color {
        match status.state {
            WorkerState::Idle => state.green().to_string(),
            WorkerState::Ingesting => state.cyan().to_string(),
            WorkerState::Judging => state.yellow().to_string(),
        }
    } else {
        state.to_string()
    };

    if status.ready {
        println!("[{}]", tag);
    } else if status.total > 0 {
        println!(
            "[{}] {} ({}/{})",
            tag, status.step, status.current, status.total
        );
    } else {
        println!("[{}] {}", tag, status.step);
    }
}
