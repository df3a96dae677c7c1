//! Markdown report generation
//!
//! This module renders a [`CrawlReport`] as a human-readable markdown file:
//! run information, counts, the most relevant pages with their findings,
//! failures, and the frontier left over when the run stopped.

use crate::output::traits::{CrawlReport, OutputResult};
use crate::state::VisitStatus;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Characters of a page summary shown in the report
const SUMMARY_CHARS: usize = 400;

/// Pending frontier entries listed in the report
const PENDING_LISTED: usize = 20;

/// Writes the markdown report, creating parent directories
///
/// # Arguments
///
/// * `report` - The joined crawl report
/// * `output_path` - Path where the markdown file should be written
pub fn generate_report(report: &CrawlReport, output_path: &Path) -> OutputResult<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let markdown = format_markdown_report(report);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl report as markdown
pub fn format_markdown_report(report: &CrawlReport) -> String {
    let summary = &report.summary;
    let mut md = String::new();

    md.push_str("# Intent Crawl Report\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Intent**: {}\n", summary.intent));
    md.push_str(&format!("- **Seed URL**: {}\n", summary.seed_url));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(ended) = &summary.ended_at {
        md.push_str(&format!("- **Ended**: {}\n", ended));
    }
    if let Some(duration) = summary.duration_seconds {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.phase));
    if let Some(reason) = &summary.stop_reason {
        md.push_str(&format!("- **Stop Reason**: {}\n", reason));
    }
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    md.push_str("## Page Counts\n\n");
    md.push_str("| Status | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Success | {} |\n", summary.success_count));
    md.push_str(&format!("| Failed | {} |\n", summary.failure_count));
    md.push_str(&format!("| Skipped | {} |\n", summary.skipped_count));
    md.push_str(&format!("| **Total** | {} |\n\n", summary.total_pages));
    md.push_str(&format!(
        "Success rate: {:.1}%\n\n",
        summary.success_rate()
    ));

    let ranked = report.ranked_pages();
    if !ranked.is_empty() {
        md.push_str("## Findings\n\n");
        for page in ranked {
            let title = page.title.as_deref().unwrap_or(&page.url);
            md.push_str(&format!("### [{}]({})\n\n", escape(title), page.url));
            match page.relevance {
                Some(r) => md.push_str(&format!("- **Relevance**: {:.2}", r)),
                None => md.push_str("- **Relevance**: n/a"),
            }
            if let Some(source) = &page.analysis_source {
                md.push_str(&format!(" ({})", source));
            }
            md.push_str(&format!("\n- **Depth**: {}\n", page.depth));
            if let Some(text) = page.summary.as_deref().filter(|s| !s.is_empty()) {
                let short: String = text.chars().take(SUMMARY_CHARS).collect();
                md.push_str(&format!("\n{}\n", short));
            }
            if !page.key_findings.is_empty() {
                md.push('\n');
                for finding in &page.key_findings {
                    md.push_str(&format!("- {}\n", finding));
                }
            }
            md.push('\n');
        }
    }

    let problems: Vec<_> = report
        .pages
        .iter()
        .filter(|p| p.status != VisitStatus::Success)
        .collect();
    if !problems.is_empty() {
        md.push_str("## Failed and Skipped Pages\n\n");
        md.push_str("| URL | Status | Reason |\n");
        md.push_str("|-----|--------|--------|\n");
        for page in problems {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                page.url,
                page.status,
                escape(page.error.as_deref().unwrap_or("-"))
            ));
        }
        md.push('\n');
    }

    if !report.pending.is_empty() {
        md.push_str(&format!(
            "## Unvisited Frontier ({} entries)\n\n",
            report.pending.len()
        ));
        md.push_str("| URL | Priority | Depth |\n");
        md.push_str("|-----|----------|-------|\n");
        for row in report.pending.iter().take(PENDING_LISTED) {
            md.push_str(&format!("| {} | {} | {} |\n", row.url, row.priority, row.depth));
        }
        if report.pending.len() > PENDING_LISTED {
            md.push_str(&format!(
                "\n... and {} more\n",
                report.pending.len() - PENDING_LISTED
            ));
        }
        md.push('\n');
    }

    md.push_str("---\n\n");
    md.push_str(&format!(
        "*Generated by intent-crawler at {}*\n",
        report.generated_at.to_rfc3339()
    ));

    md
}

/// Keeps table cells and link text intact
fn escape(text: &str) -> String {
    text.replace('|', "\\|").replace(['[', ']'], "").replace('\n', " ")
}
