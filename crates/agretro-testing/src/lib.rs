//! Testing infrastructure for agretro integration tests.
//!
//! This crate provides utilities for writing pipeline tests:
//! - `TestWorld`: temp source roots plus a file-backed store, with
//!   one-call ingestion
//! - `fixtures`: line and file builders for each supported log format

pub mod fixtures;
pub mod world;

pub use world::TestWorld;
