//! Derived analytics over the normalized store.
//!
//! Two layers: the heuristic stages, which rebuild the derived tables
//! from raw entries and run on every refresh, and the LLM judge, which
//! is opt-in, incremental, and an order of magnitude slower. Reporting
//! (the weekly digest and CSV export) reads whatever both layers have
//! produced so far.

pub mod config;
pub mod digest;
pub mod export;
pub mod judge;
pub mod stages;

mod text;
