use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// File-level parse failures.
///
/// Per-record problems never surface here: a line or block that cannot be
/// modeled parses to nothing. Only conditions that poison the whole file
/// (unreadable, non-UTF-8 bytes, a sidecar that exists but is broken) are
/// errors, because those are the cases the skip cache quarantines.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    InvalidUtf8 { path: PathBuf },
    MalformedSidecar { path: PathBuf, source: serde_json::Error },
}

impl Error {
    /// Stable machine-readable name recorded in the skip cache.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io_error",
            Error::InvalidUtf8 { .. } => "invalid_utf8",
            Error::MalformedSidecar { .. } => "malformed_sidecar",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "failed to read source file: {}", e),
            Error::InvalidUtf8 { path } => {
                write!(f, "source file is not valid UTF-8: {}", path.display())
            }
            Error::MalformedSidecar { path, source } => {
                write!(f, "malformed sidecar {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::MalformedSidecar { source, .. } => Some(source),
            Error::InvalidUtf8 { .. } => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
