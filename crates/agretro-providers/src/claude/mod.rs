//! JSON-per-line envelope format used by Claude Code and compatible agents.

mod parser;
mod schema;

pub use parser::{parse_file, parse_line};
