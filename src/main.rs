//! intent-crawler main entry point
//!
//! This is the command-line interface for the intent-guided crawler.

use anyhow::Context;
use clap::Parser;
use intent_crawler::config::{load_config_with_hash, validate, Config};
use intent_crawler::crawler::run_crawl;
use intent_crawler::output::{export_report, load_statistics, print_statistics};
use intent_crawler::storage::{FsLayeredStore, SqliteLedger};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// intent-crawler: crawl a site for pages that serve a goal
///
/// Starting from a seed URL, the crawler asks a language model how relevant
/// each page is to the stated intent and which links to follow next, and
/// stores what it finds in a layered data directory.
#[derive(Parser, Debug)]
#[command(name = "intent-crawler")]
#[command(version)]
#[command(about = "An intent-guided web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Override the seed URL
    #[arg(long)]
    seed: Option<String>,

    /// Override the crawl intent
    #[arg(long)]
    intent: Option<String>,

    /// Override the page budget
    #[arg(long)]
    max_pages: Option<u32>,

    /// Override the depth budget
    #[arg(long)]
    max_depth: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export_report"])]
    dry_run: bool,

    /// Show statistics of the latest run and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_report"])]
    stats: bool,

    /// Regenerate the report of the latest run and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_report: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(seed) = &self.seed {
            config.crawl.seed_url = seed.clone();
        }
        if let Some(intent) = &self.intent {
            config.crawl.intent = intent.clone();
        }
        if let Some(max_pages) = self.max_pages {
            config.crawl.max_pages = max_pages;
        }
        if let Some(max_depth) = self.max_depth {
            config.crawl.max_depth = max_depth;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.export_report {
        handle_export_report(&config)
    } else {
        handle_crawl(&config, &config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("intent_crawler=info,warn")),
            1 => EnvFilter::new("intent_crawler=debug,info"),
            2 => EnvFilter::new("intent_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    validate(config)?;

    println!("=== intent-crawler Dry Run ===\n");

    println!("Crawl:");
    println!("  Seed: {}", config.crawl.seed_url);
    println!("  Intent: {}", config.crawl.intent);
    println!("  Max pages: {}", config.crawl.max_pages);
    println!("  Max depth: {}", config.crawl.max_depth);
    println!("  Workers: {}", config.crawl.workers);
    println!("  Skip irrelevant: {}", config.crawl.skip_irrelevant);

    println!("\nFilter:");
    if config.filter.allowed_domains.is_empty() {
        println!("  Allowed domains: seed host and its subdomains");
    } else {
        println!("  Allowed domains: {}", config.filter.allowed_domains.join(", "));
    }
    println!("  Exclude patterns: {}", config.filter.exclude_patterns.len());
    println!("  Exclude extensions: {}", config.filter.exclude_extensions.len());

    println!("\nFetch:");
    println!("  Strategy: {:?}", config.fetch.strategy);
    println!("  Timeout: {}s x {} attempts", config.fetch.timeout_secs, config.fetch.max_attempts);
    println!("  Per-host interval: {}ms", config.politeness.min_domain_interval_ms);

    println!("\nModel:");
    println!("  Endpoint: {}", config.model.endpoint);
    println!("  Intent / classifier / analyzer: {} / {} / {}",
        config.model.intent_model, config.model.classifier_model, config.model.analyzer_model);
    println!("  Relevance threshold: {}", config.model.relevance_threshold);

    println!("\nOutput:");
    println!("  Data dir: {}", config.output.data_dir);
    println!("  Database: {}", config.output.database_path);
    println!("  Report: {}", config.output.report_path);

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics of the latest run
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let ledger = SqliteLedger::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&ledger, None)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-report mode: rebuilds the report of the latest run
fn handle_export_report(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Crawl Report ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.report_path);
    println!();

    let ledger = SqliteLedger::new(Path::new(&config.output.database_path))?;
    let store = FsLayeredStore::open(&config.output.data_dir)?;
    let report = export_report(&ledger, &store, None, Path::new(&config.output.report_path))?;

    println!(
        "✓ Report for run {} exported to: {}",
        report.summary.run_id, config.output.report_path
    );

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    tracing::info!(
        "Crawling {} for '{}' (max {} pages, depth {})",
        config.crawl.seed_url,
        config.crawl.intent,
        config.crawl.max_pages,
        config.crawl.max_depth
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, finishing pages in flight");
            flag.store(true, Ordering::SeqCst);
        }
    });

    match run_crawl(config, config_hash, cancel).await {
        Ok(report) => {
            tracing::info!(
                "Crawl run {} finished ({}): {} pages, {:.1}% success",
                report.run_id,
                report.stop_reason,
                report.counts.total(),
                report.summary.success_rate()
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
