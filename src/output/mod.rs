//! Output module for run summaries and reports
//!
//! This module handles:
//! - Joining the ledger and the processed layer into a [`CrawlReport`]
//! - Writing the run summary record to the report layer
//! - Rendering the markdown report
//! - Printing per-run statistics

mod markdown;
pub mod stats;
mod traits;

pub use markdown::{format_markdown_report, generate_report};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use traits::{CrawlReport, OutputError, OutputResult, PageReport, RunSummary};

use crate::model::AnalysisResult;
use crate::state::VisitStatus;
use crate::storage::{artifacts, run_key, Layer, LayeredStore, RunLedger, StorageError, StoredArtifact};
use crate::url::url_key;
use chrono::Utc;
use std::path::Path;

/// Builds the report of a run from the ledger and the processed layer
///
/// # Arguments
///
/// * `ledger` - Run ledger holding the run and its visits
/// * `store` - Layered store holding the per-page analyses
/// * `run_id` - Run to report on
pub fn build_report(
    ledger: &dyn RunLedger,
    store: &dyn LayeredStore,
    run_id: i64,
) -> OutputResult<CrawlReport> {
    let run = ledger.get_run(run_id)?;
    let visits = ledger.get_visits(run_id)?;

    let mut pages = Vec::with_capacity(visits.len());
    for visit in visits {
        let analysis = if visit.status == VisitStatus::Success {
            load_analysis(store, &visit.url)?
        } else {
            None
        };

        pages.push(PageReport {
            relevance: analysis.as_ref().map(|a| a.relevance_score).or(visit.relevance),
            summary: analysis.as_ref().map(|a| a.summary.clone()),
            key_findings: analysis
                .as_ref()
                .map(|a| a.key_findings.clone())
                .unwrap_or_default(),
            analysis_source: analysis.map(|a| a.source),
            url: visit.url,
            status: visit.status,
            depth: visit.depth,
            title: visit.title,
            error: visit.error,
        });
    }

    Ok(CrawlReport {
        summary: RunSummary::from_run(&run),
        pages,
        pending: ledger.get_frontier_snapshot(run_id)?,
        generated_at: Utc::now(),
    })
}

/// Latest analysis of a page, if one was persisted
fn load_analysis(store: &dyn LayeredStore, url: &str) -> OutputResult<Option<AnalysisResult>> {
    let Ok(parsed) = url::Url::parse(url) else {
        return Ok(None);
    };
    match store.get_json::<AnalysisResult>(Layer::Processed, &url_key(&parsed), artifacts::ANALYSIS) {
        Ok(analysis) => Ok(Some(analysis)),
        Err(StorageError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes the run summary record to the report layer
pub fn write_run_summary(store: &dyn LayeredStore, summary: &RunSummary) -> OutputResult<StoredArtifact> {
    Ok(store.put_json(Layer::Report, &run_key(summary.run_id), artifacts::SUMMARY, summary)?)
}

/// Stores the rendered markdown report in the report layer
pub fn write_report_artifact(store: &dyn LayeredStore, report: &CrawlReport) -> OutputResult<StoredArtifact> {
    let markdown = format_markdown_report(report);
    Ok(store.put(
        Layer::Report,
        &run_key(report.summary.run_id),
        artifacts::REPORT,
        "md",
        markdown.as_bytes(),
    )?)
}

/// Regenerates the summary record and markdown report of a run
///
/// Uses the latest run when `run_id` is None.
pub fn export_report(
    ledger: &dyn RunLedger,
    store: &dyn LayeredStore,
    run_id: Option<i64>,
    report_path: &Path,
) -> OutputResult<CrawlReport> {
    let run_id = match run_id {
        Some(id) => id,
        None => ledger.get_latest_run()?.ok_or(OutputError::NoRuns)?.id,
    };
    let report = build_report(ledger, store, run_id)?;
    write_run_summary(store, &report.summary)?;
    write_report_artifact(store, &report)?;
    generate_report(&report, report_path)?;
    tracing::info!(run_id, path = %report_path.display(), "report written");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RunPhase, StopReason, VisitCounts, VisitedRecord};
    use crate::storage::{FsLayeredStore, SqliteLedger, VisitDetails};
    use serde_json::Map;
    use tempfile::TempDir;
    use url::Url;

    #[test]
    fn test_export_joins_ledger_and_store() {
        let dir = TempDir::new().unwrap();
        let store = FsLayeredStore::open(dir.path().join("data")).unwrap();
        let mut ledger = SqliteLedger::new(&dir.path().join("ledger.db")).unwrap();

        let run = ledger.create_run("https://example.edu/", "admissions", "h").unwrap();
        let page = Url::parse("https://example.edu/admissions").unwrap();
        ledger
            .record_visit(run, &VisitedRecord::success(page.clone(), 1), VisitDetails { title: Some("Admissions"), relevance: Some(0.3) })
            .unwrap();
        ledger
            .record_visit(run, &VisitedRecord::failed(Url::parse("https://example.edu/x").unwrap(), 1, "blocked"), VisitDetails::default())
            .unwrap();
        ledger
            .finish_run(run, RunPhase::Completed, StopReason::FrontierExhausted, VisitCounts { success: 1, failed: 1, skipped: 0 })
            .unwrap();

        let analysis = AnalysisResult {
            url: page.to_string(),
            relevance_score: 0.9,
            summary: "Deadlines".to_string(),
            key_findings: vec!["June 1".to_string()],
            structured_data: Map::new(),
            candidate_links: Vec::new(),
            source: "model".to_string(),
            analyzed_at: Utc::now(),
        };
        let store_ref: &dyn LayeredStore = &store;
        store_ref
            .put_json(Layer::Processed, &url_key(&page), artifacts::ANALYSIS, &analysis)
            .unwrap();

        let report_path = dir.path().join("report.md");
        let report = export_report(&ledger, &store, None, &report_path).unwrap();

        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.pages[0].relevance, Some(0.9));
        assert_eq!(report.pages[0].key_findings, vec!["June 1"]);
        assert_eq!(report.pages[1].analysis_source, None);
        assert!(report_path.exists());

        let summary: RunSummary = store_ref
            .get_json(Layer::Report, &run_key(run), artifacts::SUMMARY)
            .unwrap();
        assert_eq!(summary.success_count, 1);

        let stored = store_ref.get(Layer::Report, &run_key(run), artifacts::REPORT).unwrap();
        assert_eq!(String::from_utf8(stored).unwrap(), std::fs::read_to_string(&report_path).unwrap());
        assert_eq!(summary.failure_count, 1);
    }
}
