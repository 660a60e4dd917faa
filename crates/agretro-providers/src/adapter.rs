use std::path::Path;

use agretro_types::Parsed;

use crate::{artifact, claude, codex, transcript, Result};

/// On-disk format family of one source root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// JSON-per-line envelope with a top-level `type` discriminator
    ClaudeJsonl,
    /// JSON-per-line `response_item` wrapper with call-id-joined tools
    CodexJsonl,
    /// Plain-text transcript with role line markers
    Transcript,
    /// Markdown artifact tree with JSON sidecars
    Artifact,
}

impl SourceFormat {
    /// File extensions discovered for this format.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            SourceFormat::ClaudeJsonl | SourceFormat::CodexJsonl => &["jsonl"],
            SourceFormat::Transcript => &["txt", "log"],
            SourceFormat::Artifact => &["md"],
        }
    }

    /// Parse one source file into normalized entries.
    ///
    /// Errors only for conditions that poison the whole file; individual
    /// unparseable records are dropped silently.
    pub fn parse_file(&self, path: &Path, project: &str) -> Result<Vec<Parsed>> {
        match self {
            SourceFormat::ClaudeJsonl => claude::parse_file(path, project),
            SourceFormat::CodexJsonl => codex::parse_file(path, project),
            SourceFormat::Transcript => transcript::parse_file(path, project),
            SourceFormat::Artifact => artifact::parse_file(path, project),
        }
    }
}

/// Bind an agent label to the format its log tree uses.
///
/// Most agents write the envelope format or something close enough that
/// its unmodeled records parse to nothing, so it doubles as the fallback
/// for labels we have never heard of.
pub fn format_for_agent(agent: &str) -> SourceFormat {
    match agent {
        "codex" => SourceFormat::CodexJsonl,
        "aider" => SourceFormat::Transcript,
        "antigravity" => SourceFormat::Artifact,
        _ => SourceFormat::ClaudeJsonl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_agents_map_to_their_formats() {
        assert_eq!(format_for_agent("claude"), SourceFormat::ClaudeJsonl);
        assert_eq!(format_for_agent("codex"), SourceFormat::CodexJsonl);
        assert_eq!(format_for_agent("aider"), SourceFormat::Transcript);
        assert_eq!(format_for_agent("antigravity"), SourceFormat::Artifact);
        assert_eq!(format_for_agent("cursor"), SourceFormat::ClaudeJsonl);
    }

    #[test]
    fn unknown_agents_fall_back_to_the_envelope_format() {
        assert_eq!(format_for_agent("mystery-agent"), SourceFormat::ClaudeJsonl);
    }

    #[test]
    fn extensions_per_format() {
        assert_eq!(SourceFormat::ClaudeJsonl.extensions(), &["jsonl"]);
        assert_eq!(SourceFormat::Transcript.extensions(), &["txt", "log"]);
        assert_eq!(SourceFormat::Artifact.extensions(), &["md"]);
    }
}
