//! Storage traits and error types
//!
//! Two stores back a run: a [`LayeredStore`] that holds the artifacts of every
//! stage (raw markup, processed documents and judgments, the report), and a
//! [`RunLedger`] that records runs, visits and the leftover frontier.

use crate::crawler::FrontierEntry;
use crate::state::{RunPhase, StopReason, VisitCounts, VisitStatus, VisitedRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("No {artifact} in {layer} layer for key {key}")]
    NotFound {
        layer: Layer,
        key: String,
        artifact: String,
    },

    #[error("Invalid storage key or artifact name: {0}")]
    InvalidKey(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Processing stage an artifact belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Fetched markup
    Raw,
    /// Page documents, classifications and analyses
    Processed,
    /// Run summaries
    Report,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Raw, Layer::Processed, Layer::Report];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Processed => "processed",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a `put` landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub layer: Layer,
    pub key: String,
    pub artifact: String,
    pub version: u32,
    pub path: PathBuf,
}

/// Versioned, append-only artifact store addressed by `(layer, key, artifact)`
///
/// A `put` never replaces an earlier write: it adds the next version, and
/// `get` returns the newest one.
pub trait LayeredStore: Send + Sync {
    fn put(
        &self,
        layer: Layer,
        key: &str,
        artifact: &str,
        extension: &str,
        payload: &[u8],
    ) -> StorageResult<StoredArtifact>;

    /// Latest version of an artifact
    fn get(&self, layer: Layer, key: &str, artifact: &str) -> StorageResult<Vec<u8>>;

    /// Versions written so far, ascending
    fn versions(&self, layer: Layer, key: &str, artifact: &str) -> StorageResult<Vec<u32>>;
}

impl<'a> dyn LayeredStore + 'a {
    pub fn put_json<T: Serialize>(
        &self,
        layer: Layer,
        key: &str,
        artifact: &str,
        value: &T,
    ) -> StorageResult<StoredArtifact> {
        let payload = serde_json::to_vec_pretty(value)?;
        self.put(layer, key, artifact, "json", &payload)
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        layer: Layer,
        key: &str,
        artifact: &str,
    ) -> StorageResult<T> {
        let payload = self.get(layer, key, artifact)?;
        Ok(serde_json::from_slice(&payload)?)
    }
}

/// A run as stored in the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: i64,
    pub seed_url: String,
    pub intent: String,
    pub config_hash: String,
    pub phase: RunPhase,
    pub stop_reason: Option<StopReason>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub counts: VisitCounts,
}

/// One visit row, joined with what the pipeline learned about the page
#[derive(Debug, Clone, PartialEq)]
pub struct VisitRow {
    pub url: String,
    pub status: VisitStatus,
    pub depth: u32,
    pub fetched_at: String,
    pub error: Option<String>,
    pub title: Option<String>,
    pub relevance: Option<f64>,
}

/// A frontier entry left over at run end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    pub url: String,
    pub priority: u8,
    pub depth: u32,
    pub discovered_from: Option<String>,
}

/// Page details recorded next to a visit
#[derive(Debug, Clone, Copy, Default)]
pub struct VisitDetails<'a> {
    pub title: Option<&'a str>,
    pub relevance: Option<f64>,
}

/// Trait for run ledger implementations
pub trait RunLedger {
    /// Creates a new run and returns its ID
    fn create_run(&mut self, seed_url: &str, intent: &str, config_hash: &str) -> StorageResult<i64>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Records a visit; a second record for the same URL in one run is ignored
    fn record_visit(
        &mut self,
        run_id: i64,
        record: &VisitedRecord,
        details: VisitDetails<'_>,
    ) -> StorageResult<bool>;

    fn get_visits(&self, run_id: i64) -> StorageResult<Vec<VisitRow>>;

    /// Replaces the stored frontier snapshot of a run
    fn save_frontier_snapshot(&mut self, run_id: i64, entries: &[FrontierEntry]) -> StorageResult<()>;

    fn get_frontier_snapshot(&self, run_id: i64) -> StorageResult<Vec<SnapshotRow>>;

    /// Stores the final phase, stop reason and counts of a run
    fn finish_run(
        &mut self,
        run_id: i64,
        phase: RunPhase,
        stop_reason: StopReason,
        counts: VisitCounts,
    ) -> StorageResult<()>;
}
