//! Plain-text transcript format used by agents that log chat as prose.
//!
//! A `user:` / `assistant:` / `system:` marker at the start of a line
//! opens a block; following lines belong to the open block until the next
//! marker. Text before the first marker is ignored. The format carries no
//! ids or timestamps, so ids are derived from path, position, and content,
//! and every block shares the file mtime.

use std::path::Path;

use agretro_types::{EntryKind, Parsed, RawEntry};

use crate::io::{file_timestamp, read_utf8};
use crate::{ids, Result};

pub fn parse_file(path: &Path, project: &str) -> Result<Vec<Parsed>> {
    let text = read_utf8(path)?;
    let timestamp = file_timestamp(path);
    let path_key = path.to_string_lossy();
    let session_id = ids::stable_id(&["transcript-session", &path_key]);

    let mut blocks: Vec<(EntryKind, Vec<&str>)> = Vec::new();
    for line in text.lines() {
        if let Some((kind, rest)) = role_marker(line) {
            blocks.push((kind, vec![rest]));
        } else if let Some((_, lines)) = blocks.last_mut() {
            lines.push(line);
        }
    }

    Ok(blocks
        .into_iter()
        .enumerate()
        .map(|(index, (kind, lines))| {
            let body = lines.join("\n").trim().to_string();
            let entry_id = ids::stable_id(&[
                "transcript-entry",
                &path_key,
                &index.to_string(),
                &ids::content_digest(&body),
            ]);
            let mut entry = RawEntry::new(
                entry_id,
                session_id.as_str(),
                project,
                kind,
                timestamp.as_str(),
            );
            if !body.is_empty() {
                match kind {
                    EntryKind::User => entry.user_text = Some(body),
                    _ => entry.text_content = Some(body),
                }
            }
            entry.content_types = vec!["text".to_string()];
            Parsed::raw(entry)
        })
        .collect())
}

fn role_marker(line: &str) -> Option<(EntryKind, &str)> {
    let trimmed = line.trim_start();
    for (marker, kind) in [
        ("user:", EntryKind::User),
        ("assistant:", EntryKind::Assistant),
        ("system:", EntryKind::System),
    ] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return Some((kind, rest.trim_start()));
        }
    }
    None
}
