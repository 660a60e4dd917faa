//! Recent sessions, newest first.

use agretro_store::SessionRow;
use anyhow::Result;
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

use crate::context::ExecutionContext;
use crate::render::{clip, fmt_duration, fmt_when};

pub fn handle(
    ctx: &ExecutionContext,
    project: Option<&str>,
    limit: usize,
    json_mode: bool,
) -> Result<()> {
    let Some(store) = ctx.open_existing()? else {
        println!(
            "No database at {}. Run 'agretro ingest' first.",
            ctx.config().db_path.display()
        );
        return Ok(());
    };

    let rows = store.list_sessions(project, limit)?;

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    let color = std::io::stdout().is_terminal();
    println!(
        "{:<18} {:<22} {:<17} {:>6} {:>6}  {:<9} {:<11} {}",
        "SESSION", "PROJECT", "STARTED", "DUR", "TURNS", "INTENT", "TRAJECTORY", "FIRST PROMPT"
    );
    for row in &rows {
        println!("{}", render_row(row, color));
    }
    Ok(())
}

fn render_row(row: &SessionRow, color: bool) -> String {
    let id: String = row.session_id.chars().take(16).collect();
    let project = clip(row.project_name.as_deref().unwrap_or("-"), 22);
    let started = row
        .started_at
        .as_deref()
        .map(fmt_when)
        .unwrap_or_else(|| "-".to_string());
    let prompt = clip(row.first_prompt.as_deref().unwrap_or(""), 40);

    // Pad before coloring; ANSI escapes would otherwise count into the
    // column width.
    let trajectory = format!("{:<11}", row.trajectory);
    let trajectory = if color {
        match row.trajectory.as_str() {
            "converged" => trajectory.green().to_string(),
            "drifted" => trajectory.yellow().to_string(),
            "thrashed" => trajectory.red().to_string(),
            _ => trajectory,
        }
    } else {
        trajectory
    };

    format!(
        "{:<18} {:<22} {:<17} {:>6} {:>6}  {:<9} {} {}",
        id,
        project,
        started,
        fmt_duration(row.duration_seconds),
        row.turn_count,
        row.intent,
        trajectory,
        prompt
    )
}
