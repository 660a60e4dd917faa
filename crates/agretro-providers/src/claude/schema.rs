//! Wire shapes for the JSON-per-line envelope format.
//!
//! Every record carries a top-level `type` discriminator. Conversation
//! records (`user`, `assistant`, `system`) share one envelope around an
//! optional `message`; `progress` records nest a second discriminated
//! payload under `data`. Anything else is unmodeled and parses to nothing.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "kebab-case")]
pub(crate) enum Envelope {
    User(ConversationRecord),
    Assistant(ConversationRecord),
    System(SystemRecord),
    Progress(ProgressRecord),
    FileHistorySnapshot,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConversationRecord {
    pub uuid: String,
    pub session_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    #[serde(default)]
    pub is_sidechain: bool,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SystemRecord {
    pub uuid: String,
    pub session_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    #[serde(default)]
    pub is_sidechain: bool,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Message {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Usage {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
}

/// Message content is either a bare string or a list of typed blocks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Content {
    Text(String),
    Blocks(Vec<Block>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub(crate) enum Block {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        content: Option<Value>,
        #[serde(default)]
        is_error: bool,
    },
    Thinking,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProgressRecord {
    pub uuid: String,
    pub session_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    #[serde(default)]
    pub data: Option<ProgressData>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub(crate) enum ProgressData {
    AgentProgress {
        #[serde(default)]
        message: Option<AgentMessage>,
    },
    BashProgress,
    #[serde(other)]
    Unknown,
}

/// Nested message relayed from a subagent. `kind` is "assistant" when the
/// subagent issued a tool call and "user" when a result came back.
#[derive(Debug, Deserialize)]
pub(crate) struct AgentMessage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: Option<InnerMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InnerMessage {
    #[serde(default)]
    pub content: Vec<Block>,
}
