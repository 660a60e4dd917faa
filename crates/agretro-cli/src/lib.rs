mod args;
mod commands;
pub mod context;
mod render;

pub use args::{Cli, Command};
pub use commands::run;
