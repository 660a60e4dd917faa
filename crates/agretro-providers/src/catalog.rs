//! Source catalog: configured log roots, their discovery walk, and the
//! project labels that carry agent identity through the store.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::adapter::{format_for_agent, SourceFormat};

/// One configured log root bound to an agent label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub agent: String,
    pub root: PathBuf,
}

impl SourceSpec {
    pub fn new(agent: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            agent: agent.into(),
            root: root.into(),
        }
    }

    pub fn format(&self) -> SourceFormat {
        format_for_agent(&self.agent)
    }
}

/// A discovered candidate file with its derived project label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub agent: String,
    pub project: String,
    pub format: SourceFormat,
}

pub const KNOWN_AGENTS: [&str; 12] = [
    "claude",
    "codex",
    "cursor",
    "copilot",
    "windsurf",
    "cline",
    "roo",
    "aider",
    "gemini",
    "continue",
    "antigravity",
    "opencode",
];

/// Curated default roots for common coding agents. Roots that do not
/// exist are skipped at discovery time, so listing all of them is free.
pub fn default_source_specs() -> Vec<SourceSpec> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    vec![
        SourceSpec::new("claude", home.join(".claude").join("projects")),
        SourceSpec::new("codex", home.join(".codex").join("sessions")),
        SourceSpec::new("cursor", home.join(".cursor").join("projects")),
        SourceSpec::new("copilot", home.join(".copilot").join("sessions")),
        SourceSpec::new("windsurf", home.join(".windsurf").join("sessions")),
        SourceSpec::new("cline", home.join(".cline").join("sessions")),
        SourceSpec::new("roo", home.join(".roo").join("sessions")),
        SourceSpec::new("aider", home.join(".aider").join("sessions")),
        SourceSpec::new("gemini", home.join(".gemini").join("sessions")),
        SourceSpec::new("continue", home.join(".continue").join("sessions")),
        SourceSpec::new("antigravity", home.join(".gemini").join("antigravity")),
        SourceSpec::new("opencode", home.join(".opencode").join("sessions")),
    ]
}

/// Parse `name=/path` or bare-path specs, deduplicating repeats.
///
/// A bare path takes its directory name as the agent label (lowercased,
/// spaces to hyphens). Empty names fall back to "unknown"; empty values
/// are skipped.
pub fn parse_source_specs(raw_values: &[String]) -> Vec<SourceSpec> {
    let mut seen: HashSet<(String, PathBuf)> = HashSet::new();
    let mut specs = Vec::new();

    for raw in raw_values {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }

        let (agent, root) = match value.split_once('=') {
            Some((name, path)) => {
                let name = name.trim().to_lowercase();
                let agent = if name.is_empty() {
                    "unknown".to_string()
                } else {
                    name
                };
                (agent, expand_home(path.trim()))
            }
            None => {
                let root = expand_home(value);
                let agent = root
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.to_lowercase().replace(' ', "-"))
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| "unknown".to_string());
                (agent, root)
            }
        };

        if seen.insert((agent.clone(), root.clone())) {
            specs.push(SourceSpec { agent, root });
        }
    }

    specs
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// Walk every source root and yield candidate files matching its format's
/// extensions, in stable path order per root.
pub fn discover(specs: &[SourceSpec]) -> Vec<SourceFile> {
    let mut files = Vec::new();
    for spec in specs {
        if !spec.root.is_dir() {
            continue;
        }
        let format = spec.format();
        let mut in_root: Vec<SourceFile> = WalkDir::new(&spec.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| matches_extension(entry.path(), format))
            .map(|entry| SourceFile {
                project: project_label(&spec.agent, &spec.root, entry.path()),
                agent: spec.agent.clone(),
                path: entry.into_path(),
                format,
            })
            .collect();
        in_root.sort_by(|a, b| a.path.cmp(&b.path));
        files.extend(in_root);
    }
    files
}

fn matches_extension(path: &Path, format: SourceFormat) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| format.extensions().contains(&ext))
}

/// Project label for a discovered file: the agent alone for files sitting
/// directly under the root, `agent:first_segment` for nested files.
pub fn project_label(agent: &str, root: &Path, path: &Path) -> String {
    let Ok(rel) = path.strip_prefix(root) else {
        return agent.to_string();
    };
    let mut components = rel.components();
    let first = components.next();
    if components.next().is_none() {
        return agent.to_string();
    }
    match first {
        Some(Component::Normal(name)) => match name.to_str() {
            Some(segment) => format!("{agent}:{segment}"),
            None => agent.to_string(),
        },
        _ => agent.to_string(),
    }
}

/// Agent type encoded in a project label: the prefix before `:` when
/// present, else the label itself when it names a known agent, else
/// "unknown".
pub fn agent_type_for(label: &str) -> &str {
    if let Some((prefix, _)) = label.split_once(':') {
        return prefix;
    }
    if KNOWN_AGENTS.contains(&label) {
        label
    } else {
        "unknown"
    }
}
