//! Storage module for persisting crawl data
//!
//! This module handles:
//! - The layered artifact store (raw markup, processed documents and model
//!   judgments, run reports), versioned and append-only
//! - The SQLite run ledger (runs, visits, frontier snapshots)

mod layered;
mod schema;
mod sqlite;
mod traits;

pub use layered::FsLayeredStore;
pub use sqlite::SqliteLedger;
pub use traits::{
    Layer, LayeredStore, RunLedger, RunRecord, SnapshotRow, StorageError, StorageResult,
    StoredArtifact, VisitDetails, VisitRow,
};

use std::path::Path;

/// Artifact names used by the crawl pipeline
pub mod artifacts {
    /// Raw markup (raw layer)
    pub const PAGE: &str = "page";
    /// Extracted page document (processed layer)
    pub const DOCUMENT: &str = "document";
    /// Relevance classification (processed layer)
    pub const CLASSIFICATION: &str = "classification";
    /// Deep analysis (processed layer)
    pub const ANALYSIS: &str = "analysis";
    /// Run summary (report layer)
    pub const SUMMARY: &str = "summary";
    /// Rendered markdown report (report layer)
    pub const REPORT: &str = "report";
}

/// Report layer key of a run
pub fn run_key(run_id: i64) -> String {
    format!("run-{}", run_id)
}

/// Opens the run ledger, creating the database if needed
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_ledger(path: &Path) -> StorageResult<SqliteLedger> {
    SqliteLedger::new(path)
}
