use serde::{Deserialize, Serialize};

use crate::errors::ToolErrorKind;

/// Conversation role of a normalized entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    User,
    Assistant,
    System,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::User => "user",
            EntryKind::Assistant => "assistant",
            EntryKind::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(EntryKind::User),
            "assistant" => Some(EntryKind::Assistant),
            "system" => Some(EntryKind::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized conversation entry, shared by every source format.
///
/// String lengths for the text fields are derived at persist time, so the
/// struct carries only the text itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntry {
    /// Stable unique id; re-parsing unchanged bytes must yield the same id
    pub entry_id: String,
    pub session_id: String,
    pub project_name: String,
    pub kind: EntryKind,
    /// RFC 3339 UTC timestamp
    pub timestamp_utc: String,
    pub parent_uuid: Option<String>,
    pub is_sidechain: bool,
    /// User-authored text, including appended tool-result snippets
    pub user_text: Option<String>,
    pub is_tool_result: bool,
    pub tool_result_error: bool,
    pub tool_result_error_type: Option<ToolErrorKind>,
    pub model: Option<String>,
    /// Content block kinds in first-occurrence order, deduplicated
    pub content_types: Vec<String>,
    /// Tool names invoked by this entry, in order
    pub tool_names: Vec<String>,
    /// File paths referenced by file-oriented tool invocations
    pub tool_file_paths: Vec<String>,
    /// First line of the first free-text tool input, capped at 200 chars
    pub tool_input_preview: Option<String>,
    /// Assistant-authored text
    pub text_content: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub system_subtype: Option<String>,
    pub duration_ms: Option<i64>,
    pub git_branch: Option<String>,
    pub cwd: Option<String>,
}

impl RawEntry {
    /// Skeleton with the identity fields set and everything else empty.
    pub fn new(
        entry_id: impl Into<String>,
        session_id: impl Into<String>,
        project_name: impl Into<String>,
        kind: EntryKind,
        timestamp_utc: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            session_id: session_id.into(),
            project_name: project_name.into(),
            kind,
            timestamp_utc: timestamp_utc.into(),
            parent_uuid: None,
            is_sidechain: false,
            user_text: None,
            is_tool_result: false,
            tool_result_error: false,
            tool_result_error_type: None,
            model: None,
            content_types: Vec::new(),
            tool_names: Vec::new(),
            tool_file_paths: Vec::new(),
            tool_input_preview: None,
            text_content: None,
            input_tokens: None,
            output_tokens: None,
            system_subtype: None,
            duration_ms: None,
            git_branch: None,
            cwd: None,
        }
    }
}

/// Subagent and shell lifecycle kinds tracked from progress records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    AgentProgress,
    BashProgress,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::AgentProgress => "agent_progress",
            ProgressKind::BashProgress => "bash_progress",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "agent_progress" => Some(ProgressKind::AgentProgress),
            "bash_progress" => Some(ProgressKind::BashProgress),
            _ => None,
        }
    }
}

/// Subagent or shell progress heartbeat, kept separate from conversation rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub entry_id: String,
    pub session_id: String,
    pub progress_type: ProgressKind,
    /// Id of the tool invocation this progress record belongs to
    pub parent_tool_id: Option<String>,
    /// Tool the subagent invoked, when the record carries one
    pub tool_name: Option<String>,
    pub has_result: bool,
    pub result_error: bool,
    pub timestamp_utc: String,
}

/// Outcome of parsing one source record. Exactly one variant can claim a
/// record; anything unrecognized parses to `None` at the call site.
#[derive(Debug, Clone)]
pub enum Parsed {
    Raw(Box<RawEntry>),
    Progress(ProgressEntry),
}

impl Parsed {
    pub fn raw(entry: RawEntry) -> Self {
        Parsed::Raw(Box::new(entry))
    }

    pub fn as_raw(&self) -> Option<&RawEntry> {
        match self {
            Parsed::Raw(e) => Some(e),
            Parsed::Progress(_) => None,
        }
    }

    pub fn as_progress(&self) -> Option<&ProgressEntry> {
        match self {
            Parsed::Progress(p) => Some(p),
            Parsed::Raw(_) => None,
        }
    }
}
