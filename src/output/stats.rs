//! Statistics generation from the run ledger
//!
//! This module provides functionality for extracting and displaying
//! per-run statistics (the `--stats` command).

use crate::output::traits::{OutputError, OutputResult, RunSummary};
use crate::state::VisitStatus;
use crate::storage::RunLedger;
use std::collections::BTreeMap;

/// Crawl statistics for one run
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub summary: RunSummary,

    /// Visits per depth
    pub pages_by_depth: BTreeMap<u32, u64>,

    /// Visits per host
    pub pages_by_host: BTreeMap<String, u64>,

    /// Mean relevance over pages that have one
    pub average_relevance: Option<f64>,

    /// Leading word of the error (the fetch reason tag) to count, for failed pages
    pub error_summary: BTreeMap<String, u64>,

    /// Frontier entries left when the run stopped
    pub pending_frontier: usize,
}

/// Loads statistics for a run (the latest one when `run_id` is None)
///
/// # Arguments
///
/// * `ledger` - The run ledger to query
/// * `run_id` - Run to describe
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(OutputError::NoRuns)` - The ledger holds no runs
pub fn load_statistics(ledger: &dyn RunLedger, run_id: Option<i64>) -> OutputResult<CrawlStatistics> {
    let run = match run_id {
        Some(id) => ledger.get_run(id)?,
        None => ledger.get_latest_run()?.ok_or(OutputError::NoRuns)?,
    };
    let visits = ledger.get_visits(run.id)?;

    let mut pages_by_depth = BTreeMap::new();
    let mut pages_by_host = BTreeMap::new();
    let mut error_summary = BTreeMap::new();
    let mut relevance_sum = 0.0;
    let mut relevance_count = 0u32;

    for visit in &visits {
        *pages_by_depth.entry(visit.depth).or_insert(0) += 1;

        let host = url::Url::parse(&visit.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        *pages_by_host.entry(host).or_insert(0) += 1;

        if let Some(r) = visit.relevance {
            relevance_sum += r;
            relevance_count += 1;
        }
        if visit.status == VisitStatus::Failed {
            let reason = visit
                .error
                .as_deref()
                .and_then(|e| e.split_whitespace().next())
                .unwrap_or("unknown")
                .to_string();
            *error_summary.entry(reason).or_insert(0) += 1;
        }
    }

    Ok(CrawlStatistics {
        summary: RunSummary::from_run(&run),
        pages_by_depth,
        pages_by_host,
        average_relevance: (relevance_count > 0).then(|| relevance_sum / relevance_count as f64),
        error_summary,
        pending_frontier: ledger.get_frontier_snapshot(run.id)?.len(),
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    let summary = &stats.summary;
    println!("=== Crawl Statistics (run {}) ===\n", summary.run_id);

    println!("Overview:");
    println!("  Intent: {}", summary.intent);
    println!("  Seed: {}", summary.seed_url);
    println!(
        "  Status: {}{}",
        summary.phase,
        summary
            .stop_reason
            .as_deref()
            .map(|r| format!(" ({})", r))
            .unwrap_or_default()
    );
    if let Some(duration) = summary.duration_seconds {
        println!("  Duration: {}s", duration);
    }
    println!("  Pages attempted: {}", summary.total_pages);
    println!("  Frontier left: {}", stats.pending_frontier);
    println!();

    println!("Pages by Status:");
    for (label, count) in [
        ("Success", summary.success_count),
        ("Failed", summary.failure_count),
        ("Skipped", summary.skipped_count),
    ] {
        let percentage = if summary.total_pages > 0 {
            count as f64 / summary.total_pages as f64 * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", label, count, percentage);
    }
    println!();

    if !stats.pages_by_depth.is_empty() {
        println!("Pages by Depth:");
        for (depth, count) in &stats.pages_by_depth {
            println!("  {}: {}", depth, count);
        }
        println!();
    }

    if !stats.pages_by_host.is_empty() {
        println!("Pages by Host:");
        let mut hosts: Vec<_> = stats.pages_by_host.iter().collect();
        hosts.sort_by(|a, b| b.1.cmp(a.1));
        for (host, count) in hosts {
            println!("  {}: {}", host, count);
        }
        println!();
    }

    if !stats.error_summary.is_empty() {
        println!("Error Summary:");
        let mut errors: Vec<_> = stats.error_summary.iter().collect();
        errors.sort_by(|a, b| b.1.cmp(a.1));
        for (reason, count) in errors {
            println!("  {}: {}", reason, count);
        }
        println!();
    }

    if let Some(avg) = stats.average_relevance {
        println!("Average relevance: {:.2}", avg);
    }
    println!(
        "Success Rate: {:.1}% ({} / {} pages)",
        summary.success_rate(),
        summary.success_count,
        summary.total_pages
    );
}
