//! Codex rollout format: `response_item` envelopes around role-tagged
//! messages and call-id-joined tool records.

mod parser;
mod schema;

pub use parser::{parse_file, parse_line, session_id_for};
