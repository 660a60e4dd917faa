//! Source-format parsers and log-tree discovery.
//!
//! Each format gets one module: a serde schema for the wire shape and a
//! parser that lowers records into the shared `Parsed` sum type. The
//! catalog binds configured roots to agent labels and walks them for
//! candidate files; the adapter maps agent labels to formats. Per-record
//! problems are silent by construction, so only whole-file failures reach
//! callers as errors.

pub mod adapter;
pub mod artifact;
pub mod catalog;
pub mod claude;
pub mod codex;
pub mod error;
pub mod transcript;

mod ids;
mod io;

pub use adapter::{format_for_agent, SourceFormat};
pub use catalog::{
    agent_type_for, default_source_specs, discover, parse_source_specs, project_label, SourceFile,
    SourceSpec, KNOWN_AGENTS,
};
pub use error::{Error, Result};
