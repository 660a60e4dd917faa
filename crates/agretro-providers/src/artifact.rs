//! Markdown artifact format: one assistant-authored document per file,
//! grouped into a session per parent directory.
//!
//! A `<stem>.json` sidecar supplies the timestamp. A missing sidecar falls
//! back to the file mtime; a sidecar that exists but is not valid JSON
//! fails the whole file so the skip cache can quarantine it.

use std::path::Path;

use agretro_types::{EntryKind, Parsed, RawEntry};
use serde::Deserialize;

use crate::io::{file_timestamp, read_utf8};
use crate::{ids, Error, Result};

#[derive(Debug, Deserialize)]
struct Sidecar {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default, rename = "createdAt")]
    created_at: Option<String>,
}

pub fn parse_file(path: &Path, project: &str) -> Result<Vec<Parsed>> {
    let text = read_utf8(path)?;
    let timestamp = sidecar_timestamp(path)?.unwrap_or_else(|| file_timestamp(path));

    let parent = path
        .parent()
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str())
        .unwrap_or("artifacts");
    let session_id = ids::stable_id(&["artifact-session", project, parent]);
    let entry_id = ids::stable_id(&[
        "artifact-entry",
        &path.to_string_lossy(),
        &ids::content_digest(&text),
    ]);

    let mut entry = RawEntry::new(
        entry_id,
        session_id.as_str(),
        project,
        EntryKind::Assistant,
        timestamp.as_str(),
    );
    entry.content_types = vec!["text".to_string()];
    if !text.trim().is_empty() {
        entry.text_content = Some(text);
    }
    Ok(vec![Parsed::raw(entry)])
}

fn sidecar_timestamp(path: &Path) -> Result<Option<String>> {
    let sidecar_path = path.with_extension("json");
    if !sidecar_path.exists() {
        return Ok(None);
    }
    let raw = read_utf8(&sidecar_path)?;
    let sidecar: Sidecar =
        serde_json::from_str(&raw).map_err(|source| Error::MalformedSidecar {
            path: sidecar_path,
            source,
        })?;
    Ok(sidecar.timestamp.or(sidecar.created_at))
}
