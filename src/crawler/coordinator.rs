//! Crawl orchestration - the main crawl loop
//!
//! This module wires a run together and drives it:
//! - Compiling the intent and seeding the frontier
//! - Dispatching waves of frontier entries to concurrent page pipelines
//! - Recording visits, scheduling discovered links, charging the budget
//! - Stopping on budget, empty frontier, interrupt, or a dead backend
//! - Flushing the frontier snapshot, run summary and report

use crate::chunking::Chunker;
use crate::config::{validate, Config, FetchStrategy};
use crate::crawler::browser::BrowserFetcher;
use crate::crawler::fetcher::{Fetcher, HttpFetcher};
use crate::crawler::parser::{Extractor, HtmlExtractor};
use crate::crawler::pipeline::{ExternalHealth, PageOutcome, PagePipeline, UrlClaims};
use crate::crawler::scheduler::DomainGate;
use crate::crawler::{Frontier, FrontierEntry, FrontierStats, Priority};
use crate::intent::{IntentCompiler, IntentProfile};
use crate::model::{DeepAnalyzer, ModelBackend, ModelClient, OllamaBackend, RelevanceClassifier};
use crate::output::{
    build_report, generate_report, write_report_artifact, write_run_summary, RunSummary,
};
use crate::retry::RetryPolicy;
use crate::state::{Budget, CrawlState, RunPhase, StopReason, VisitCounts, VisitStatus};
use crate::storage::{FsLayeredStore, LayeredStore, RunLedger, SqliteLedger, VisitDetails};
use crate::url::{normalize_url, UrlFilter};
use crate::{ConfigError, CrawlerError};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use url::Url;

/// Pages between progress log lines
const PROGRESS_EVERY: u32 = 10;

/// Loop settings taken from the run configuration
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub workers: usize,
    pub max_consecutive_failures: u32,
    pub report_path: Option<PathBuf>,
}

impl CrawlSettings {
    pub fn from_config(config: &Config) -> Self {
        let report_path = Some(config.output.report_path.trim())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        Self {
            workers: config.crawl.workers.max(1) as usize,
            max_consecutive_failures: config.crawl.max_consecutive_failures.max(1),
            report_path,
        }
    }
}

/// External capabilities a run is built from
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn Extractor>,
    pub model: Arc<dyn ModelBackend>,
    pub store: Arc<dyn LayeredStore>,
    pub ledger: Box<dyn RunLedger + Send>,
}

/// What a finished run looks like
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: i64,
    pub phase: RunPhase,
    pub stop_reason: StopReason,
    pub counts: VisitCounts,
    pub frontier_remaining: usize,
    pub frontier_stats: FrontierStats,
    pub summary: RunSummary,
    pub elapsed: Duration,
}

/// Drives one crawl run
pub struct Orchestrator {
    state: CrawlState,
    intent: Arc<IntentProfile>,
    pipeline: Arc<PagePipeline>,
    claims: Arc<UrlClaims>,
    ledger: Box<dyn RunLedger + Send>,
    store: Arc<dyn LayeredStore>,
    settings: CrawlSettings,
    run_id: i64,
    cancel: Arc<AtomicBool>,
    failure_streak: u32,
    last_external_error: Option<String>,
}

impl Orchestrator {
    /// Creates a run: validates the configuration, compiles the intent,
    /// seeds the frontier and registers the run in the ledger
    ///
    /// # Arguments
    ///
    /// * `config` - The run configuration
    /// * `config_hash` - Hash of the configuration text, stored with the run
    /// * `parts` - Fetcher, extractor, model backend and stores to use
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to [`run`](Orchestrator::run)
    /// * `Err(CrawlerError)` - Invalid configuration or unusable stores
    pub async fn new(
        config: &Config,
        config_hash: &str,
        parts: Collaborators,
    ) -> Result<Self, CrawlerError> {
        validate(config)?;
        let seed = normalize_url(&config.crawl.seed_url)?;
        let retry_delay = Duration::from_millis(config.fetch.retry_delay_ms);

        let model = ModelClient::new(
            parts.model,
            Duration::from_secs(config.model.timeout_secs),
            RetryPolicy::new(config.model.max_attempts, retry_delay),
        );
        let verdict = IntentCompiler::new(model.clone())
            .compile(&config.crawl.intent, seed.as_str())
            .await;
        if verdict.is_fallback() {
            tracing::warn!("Intent compiled heuristically; the model gave no usable profile");
        }
        let intent = Arc::new(verdict.into_value());
        tracing::info!(
            category = %intent.category,
            keywords = ?intent.keywords,
            "Intent compiled"
        );

        let mut filter = UrlFilter::from_config(&config.filter, &seed);
        filter.extend_excludes(
            intent
                .exclude_patterns
                .iter()
                .filter(|p| !seed.as_str().contains(p.as_str()))
                .cloned(),
        );

        let mut frontier = Frontier::new(filter.clone(), config.crawl.max_depth);
        if !frontier.push(seed.as_str(), Priority::High, 0, None) {
            return Err(ConfigError::Validation(format!(
                "seed-url {} is rejected by the crawl filter",
                seed
            ))
            .into());
        }
        let state = CrawlState::new(
            frontier,
            Budget {
                max_pages: config.crawl.max_pages,
                max_depth: config.crawl.max_depth,
            },
        );

        let claims = Arc::new(UrlClaims::new());
        let pipeline = PagePipeline::new(
            parts.fetcher,
            parts.extractor,
            Chunker::new(config.chunking.chunk_size, config.chunking.overlap)?,
            RelevanceClassifier::new(model.clone(), config.model.relevance_threshold),
            DeepAnalyzer::new(model, config.chunking.max_chunks_per_page),
            parts.store.clone(),
            Arc::new(DomainGate::new(Duration::from_millis(
                config.politeness.min_domain_interval_ms,
            ))),
            filter,
            claims.clone(),
            RetryPolicy::new(config.fetch.max_attempts, retry_delay),
            Duration::from_secs(config.fetch.timeout_secs),
            config.crawl.skip_irrelevant,
        );

        let mut ledger = parts.ledger;
        let run_id = ledger.create_run(seed.as_str(), &config.crawl.intent, config_hash)?;

        Ok(Self {
            state,
            intent,
            pipeline: Arc::new(pipeline),
            claims,
            ledger,
            store: parts.store,
            settings: CrawlSettings::from_config(config),
            run_id,
            cancel: Arc::new(AtomicBool::new(false)),
            failure_streak: 0,
            last_external_error: None,
        })
    }

    /// Uses `flag` as the interrupt signal; once set, the run stops after
    /// the pages in flight
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn intent(&self) -> &IntentProfile {
        &self.intent
    }

    /// Runs the main crawl loop
    ///
    /// Each iteration takes up to `workers` entries off the frontier (never
    /// more than the remaining page budget), processes them concurrently,
    /// then applies the outcomes in frontier order. On return the frontier
    /// snapshot, run summary and report have been written; a run aborted
    /// because a backend stayed unreachable returns
    /// [`CrawlerError::FatalExternal`] after that flush.
    pub async fn run(&mut self) -> Result<RunReport, CrawlerError> {
        self.state.transition(RunPhase::Running)?;
        tracing::info!(
            "Starting crawl run {} for '{}'",
            self.run_id,
            self.intent.intent
        );

        let start_time = Instant::now();
        let mut last_progress = 0;

        let reason = loop {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::warn!("Interrupt received, stopping crawl");
                break StopReason::Interrupted;
            }
            if self.state.budget_exhausted() {
                tracing::info!("Page budget of {} reached", self.state.budget.max_pages);
                break StopReason::BudgetExhausted;
            }

            let batch = self.next_batch().await;
            if batch.is_empty() {
                tracing::info!("Frontier is empty, crawl complete");
                break StopReason::FrontierExhausted;
            }

            let outcomes = self.dispatch(batch).await;
            self.apply(outcomes).await;

            let crawled = self.state.pages_processed;
            if crawled / PROGRESS_EVERY > last_progress / PROGRESS_EVERY {
                let rate = crawled as f64 / start_time.elapsed().as_secs_f64().max(f64::EPSILON);
                tracing::info!(
                    "Progress: {} pages crawled, {} in frontier, {:.2} pages/sec",
                    crawled,
                    self.state.frontier.size(),
                    rate
                );
            }
            last_progress = crawled;

            if self.failure_streak >= self.settings.max_consecutive_failures {
                tracing::error!(
                    "External backend unreachable for {} consecutive pages, aborting",
                    self.failure_streak
                );
                break StopReason::FatalExternal;
            }
        };

        self.finalize(reason, start_time.elapsed())
    }

    /// Takes the next wave off the frontier, claiming each URL
    async fn next_batch(&mut self) -> Vec<FrontierEntry> {
        let slots = self
            .settings
            .workers
            .min(self.state.remaining_budget() as usize);
        let mut batch = Vec::with_capacity(slots);

        while batch.len() < slots {
            let Some(entry) = self.state.frontier.pop() else {
                break;
            };
            if self.state.frontier.is_visited(&entry.url) || !self.claims.claim(&entry.url).await {
                tracing::debug!("Dropping already handled URL: {}", entry.url);
                continue;
            }
            batch.push(entry);
        }
        batch
    }

    /// Processes a wave concurrently; outcomes come back in dispatch order
    async fn dispatch(&self, batch: Vec<FrontierEntry>) -> Vec<PageOutcome> {
        let mut slots: Vec<Option<PageOutcome>> = (0..batch.len()).map(|_| None).collect();
        let mut workers = JoinSet::new();

        for (slot, entry) in batch.into_iter().enumerate() {
            let pipeline = self.pipeline.clone();
            let intent = self.intent.clone();
            workers.spawn(async move {
                let fallback = entry.clone();
                let outcome = AssertUnwindSafe(pipeline.process(entry, &intent))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        tracing::error!("Page worker panicked on {}", fallback.url);
                        PageOutcome::failed(fallback, "worker panicked", ExternalHealth::Neutral)
                    });
                (slot, outcome)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((slot, outcome)) => slots[slot] = Some(outcome),
                Err(e) => tracing::error!("Page worker failed to complete: {}", e),
            }
        }
        slots.into_iter().flatten().collect()
    }

    /// Records a wave's visits, then schedules its links
    async fn apply(&mut self, outcomes: Vec<PageOutcome>) {
        for outcome in &outcomes {
            if !self.state.record(outcome.record.clone()) {
                tracing::debug!("Visit already recorded: {}", outcome.record.url);
                continue;
            }
            let details = VisitDetails {
                title: outcome.title.as_deref(),
                relevance: outcome.relevance,
            };
            if let Err(e) = self.ledger.record_visit(self.run_id, &outcome.record, details) {
                tracing::error!("Failed to record visit of {}: {}", outcome.record.url, e);
            }

            match &outcome.health {
                ExternalHealth::Healthy => self.failure_streak = 0,
                ExternalHealth::Unreachable(error) => {
                    self.failure_streak += 1;
                    self.last_external_error = Some(error.clone());
                }
                ExternalHealth::Neutral => {}
            }
        }

        for outcome in outcomes {
            if outcome.record.status != VisitStatus::Success {
                continue;
            }
            self.handle_discovered_links(&outcome).await;
        }
    }

    async fn handle_discovered_links(&mut self, outcome: &PageOutcome) {
        let depth = outcome.entry.depth + 1;
        let mut queued = 0;
        for (link, priority) in &outcome.links {
            if let Ok(url) = Url::parse(link) {
                if self.claims.contains(&url).await {
                    continue;
                }
            }
            if self
                .state
                .frontier
                .push(link, *priority, depth, Some(&outcome.entry.url))
            {
                queued += 1;
            }
        }
        tracing::debug!(
            "Queued {} of {} links from {}",
            queued,
            outcome.links.len(),
            outcome.entry.url
        );
    }

    /// Moves the run to its terminal phase and flushes everything it owes
    fn finalize(&mut self, reason: StopReason, elapsed: Duration) -> Result<RunReport, CrawlerError> {
        self.state.finish(reason)?;
        let counts = self.state.counts();
        let pending = self.state.frontier.pending_entries();

        self.ledger.save_frontier_snapshot(self.run_id, &pending)?;
        self.ledger
            .finish_run(self.run_id, self.state.phase(), reason, counts)?;

        let summary = RunSummary::from_run(&self.ledger.get_run(self.run_id)?);
        write_run_summary(self.store.as_ref(), &summary)?;

        let report = build_report(self.ledger.as_ref(), self.store.as_ref(), self.run_id)?;
        write_report_artifact(self.store.as_ref(), &report)?;
        if let Some(path) = &self.settings.report_path {
            generate_report(&report, path)?;
            tracing::info!("Report written to {}", path.display());
        }

        tracing::info!(
            "Crawl run {} {} ({}): {} succeeded, {} failed, {} skipped, {} left in frontier, {:.1}s",
            self.run_id,
            self.state.phase(),
            reason,
            counts.success,
            counts.failed,
            counts.skipped,
            pending.len(),
            elapsed.as_secs_f64()
        );

        if reason == StopReason::FatalExternal {
            return Err(CrawlerError::FatalExternal {
                consecutive: self.failure_streak,
                last_error: self.last_external_error.clone().unwrap_or_default(),
            });
        }

        Ok(RunReport {
            run_id: self.run_id,
            phase: self.state.phase(),
            stop_reason: reason,
            counts,
            frontier_remaining: pending.len(),
            frontier_stats: self.state.frontier.stats().clone(),
            summary,
            elapsed,
        })
    }
}

fn client_error(e: reqwest::Error) -> CrawlerError {
    ConfigError::Validation(format!("failed to build HTTP client: {}", e)).into()
}

/// Builds an orchestrator with the production collaborators: the configured
/// fetch strategy, the Ollama backend, the filesystem store and the SQLite
/// ledger
pub async fn build_orchestrator(config: &Config, config_hash: &str) -> Result<Orchestrator, CrawlerError> {
    let fetcher: Arc<dyn Fetcher> = match config.fetch.strategy {
        FetchStrategy::Http => Arc::new(HttpFetcher::from_config(&config.fetch).map_err(client_error)?),
        FetchStrategy::Browser => Arc::new(BrowserFetcher::launch(&config.fetch.user_agent).await?),
    };
    let model = Arc::new(OllamaBackend::from_config(&config.model).map_err(client_error)?);
    let store = Arc::new(FsLayeredStore::open(&config.output.data_dir)?);
    let ledger = Box::new(SqliteLedger::new(Path::new(&config.output.database_path))?);

    Orchestrator::new(
        config,
        config_hash,
        Collaborators {
            fetcher,
            extractor: Arc::new(HtmlExtractor::new()?),
            model,
            store,
            ledger,
        },
    )
    .await
}

/// Runs a complete crawl
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration text
/// * `cancel` - Set to stop the crawl after the pages in flight
pub async fn run_crawl(
    config: &Config,
    config_hash: &str,
    cancel: Arc<AtomicBool>,
) -> Result<RunReport, CrawlerError> {
    let mut orchestrator = build_orchestrator(config, config_hash)
        .await?
        .with_cancel_flag(cancel);
    orchestrator.run().await
}
