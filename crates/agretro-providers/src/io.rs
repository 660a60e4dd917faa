use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Read a whole file, requiring valid UTF-8. Invalid bytes fail the file
/// rather than being lossily replaced, so the skip cache records the real
/// cause.
pub(crate) fn read_utf8(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8 {
        path: path.to_path_buf(),
    })
}

/// File mtime as RFC 3339 UTC. Falls back to now when metadata is
/// unreadable, which only happens if the file vanishes mid-parse.
pub(crate) fn file_timestamp(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(|mtime| DateTime::<Utc>::from(mtime).to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|_| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
}
