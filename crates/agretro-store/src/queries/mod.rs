pub mod entries;
pub mod insights;
pub mod ledger;
pub mod search;
pub mod sessions;
pub mod stats;
