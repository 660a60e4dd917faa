//! Wire shapes for the Codex rollout format.
//!
//! Each line wraps a `payload` under a `response_item` envelope. Messages
//! carry role plus typed text parts; tool calls and their outputs arrive
//! as separate `function_call` / `function_call_output` records joined by
//! `call_id`.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub(crate) enum Envelope {
    ResponseItem(ResponseItemRecord),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseItemRecord {
    pub timestamp: String,
    pub payload: Payload,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub(crate) enum Payload {
    Message(MessagePayload),
    FunctionCall(FunctionCallPayload),
    FunctionCallOutput(FunctionCallOutputPayload),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagePayload {
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub(crate) enum MessagePart {
    InputText {
        #[serde(default)]
        text: String,
    },
    OutputText {
        #[serde(default)]
        text: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FunctionCallPayload {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
    pub call_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FunctionCallOutputPayload {
    pub call_id: String,
    #[serde(default)]
    pub output: String,
}
