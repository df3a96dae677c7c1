//! Report types and output errors

use crate::state::VisitStatus;
use crate::storage::{RunRecord, SnapshotRow, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("No crawl runs found")]
    NoRuns,

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Run-level record kept in the report layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub seed_url: String,
    pub intent: String,
    pub phase: String,
    pub stop_reason: Option<String>,
    pub total_pages: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub skipped_count: u32,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub config_hash: String,
}

impl RunSummary {
    pub fn from_run(run: &RunRecord) -> Self {
        let duration_seconds = run.finished_at.as_deref().and_then(|finished| {
            let started = DateTime::parse_from_rfc3339(&run.started_at).ok()?;
            let finished = DateTime::parse_from_rfc3339(finished).ok()?;
            u64::try_from((finished - started).num_seconds()).ok()
        });

        Self {
            run_id: run.id,
            seed_url: run.seed_url.clone(),
            intent: run.intent.clone(),
            phase: run.phase.to_db_string().to_string(),
            stop_reason: run.stop_reason.map(|r| r.to_db_string().to_string()),
            total_pages: run.counts.total(),
            success_count: run.counts.success,
            failure_count: run.counts.failed,
            skipped_count: run.counts.skipped,
            started_at: run.started_at.clone(),
            ended_at: run.finished_at.clone(),
            duration_seconds,
            config_hash: run.config_hash.clone(),
        }
    }

    /// Share of attempted pages that succeeded, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total_pages == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_pages as f64 * 100.0
    }
}

/// One visited page, joined across the ledger and the processed layer
#[derive(Debug, Clone, PartialEq)]
pub struct PageReport {
    pub url: String,
    pub status: VisitStatus,
    pub depth: u32,
    pub title: Option<String>,
    pub error: Option<String>,
    pub relevance: Option<f64>,
    pub summary: Option<String>,
    pub key_findings: Vec<String>,
    /// "model" or "fallback" when an analysis exists
    pub analysis_source: Option<String>,
}

/// Everything the markdown report is rendered from
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub summary: RunSummary,
    pub pages: Vec<PageReport>,
    /// Frontier entries that were never attempted
    pub pending: Vec<SnapshotRow>,
    pub generated_at: DateTime<Utc>,
}

impl CrawlReport {
    /// Successful pages, most relevant first
    pub fn ranked_pages(&self) -> Vec<&PageReport> {
        let mut pages: Vec<&PageReport> = self
            .pages
            .iter()
            .filter(|p| p.status == VisitStatus::Success)
            .collect();
        pages.sort_by(|a, b| {
            b.relevance
                .unwrap_or(0.0)
                .partial_cmp(&a.relevance.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        pages
    }
}
