//! Per-page processing: fetch, extract, chunk, classify, analyze, persist
//!
//! A [`PagePipeline`] turns one frontier entry into a [`PageOutcome`]. It
//! never fails as a whole: every problem becomes a Failed or Skipped record,
//! and model outages degrade to keyword judgments. What the orchestrator
//! needs back is the visit record, the links to schedule, and whether the
//! page's external calls went through.

use crate::chunking::{Chunker, TextChunk};
use crate::crawler::fetcher::{FetchError, FetchErrorReason, FetchedPage, Fetcher};
use crate::crawler::parser::{Extractor, PageMetadata, RawLink};
use crate::crawler::scheduler::DomainGate;
use crate::crawler::{FrontierEntry, Priority};
use crate::intent::IntentProfile;
use crate::model::{AnalysisInput, Classification, DeepAnalyzer, RelevanceClassifier};
use crate::retry::{retry_async, RetryPolicy};
use crate::state::VisitedRecord;
use crate::storage::{artifacts, Layer, LayeredStore, StorageError};
use crate::url::{extract_domain, normalize_relative, url_key, UrlFilter};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

/// Processed form of a page, stored in the processed layer
#[derive(Debug, Clone, Serialize)]
pub struct PageDocument {
    pub url: String,
    pub final_url: String,
    pub depth: u32,
    pub title: Option<String>,
    pub text: String,
    pub chunks: Vec<TextChunk>,
    pub links: Vec<RawLink>,
    pub contacts: BTreeSet<String>,
    pub metadata: PageMetadata,
    pub fetched_at: DateTime<Utc>,
}

/// How a page's external calls went
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalHealth {
    /// The fetch and every model call got through
    Healthy,
    /// A fetch exhausted its transient retries or a model call was unreachable
    Unreachable(String),
    /// Nothing to say about the backends (permanent fetch error, bad page)
    Neutral,
}

/// Result of processing one frontier entry
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub entry: FrontierEntry,
    pub record: VisitedRecord,
    pub title: Option<String>,
    pub relevance: Option<f64>,
    /// Links to schedule at `entry.depth + 1`
    pub links: Vec<(String, Priority)>,
    pub health: ExternalHealth,
}

impl PageOutcome {
    pub(crate) fn failed(entry: FrontierEntry, error: impl Into<String>, health: ExternalHealth) -> Self {
        let record = VisitedRecord::failed(entry.url.clone(), entry.depth, error);
        Self {
            entry,
            record,
            title: None,
            relevance: None,
            links: Vec::new(),
            health,
        }
    }

    fn skipped(entry: FrontierEntry, reason: impl Into<String>) -> Self {
        let record = VisitedRecord::skipped(entry.url.clone(), entry.depth, reason);
        Self {
            entry,
            record,
            title: None,
            relevance: None,
            links: Vec::new(),
            health: ExternalHealth::Healthy,
        }
    }
}

/// URLs some worker has taken on in this run: visited, in flight, or reached
/// through a redirect. Also tracks the page texts already processed, so the
/// same content served under two URLs is stored and analyzed once.
#[derive(Debug, Default)]
pub struct UrlClaims {
    claimed: Mutex<HashSet<String>>,
    content: Mutex<HashSet<String>>,
}

impl UrlClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `url`; false if it was already taken
    pub async fn claim(&self, url: &Url) -> bool {
        self.claimed.lock().await.insert(url.as_str().to_string())
    }

    pub async fn contains(&self, url: &Url) -> bool {
        self.claimed.lock().await.contains(url.as_str())
    }

    /// Claims a page text by its SHA-256; false if identical text was seen
    pub async fn claim_content(&self, text: &str) -> bool {
        self.content.lock().await.insert(content_hash(text))
    }
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Everything a pipeline needs, wired once per run
pub struct PagePipeline {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    chunker: Chunker,
    classifier: RelevanceClassifier,
    analyzer: DeepAnalyzer,
    store: Arc<dyn LayeredStore>,
    gate: Arc<DomainGate>,
    filter: UrlFilter,
    claims: Arc<UrlClaims>,
    fetch_retry: RetryPolicy,
    fetch_timeout: Duration,
    skip_irrelevant: bool,
}

impl PagePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        chunker: Chunker,
        classifier: RelevanceClassifier,
        analyzer: DeepAnalyzer,
        store: Arc<dyn LayeredStore>,
        gate: Arc<DomainGate>,
        filter: UrlFilter,
        claims: Arc<UrlClaims>,
        fetch_retry: RetryPolicy,
        fetch_timeout: Duration,
        skip_irrelevant: bool,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            chunker,
            classifier,
            analyzer,
            store,
            gate,
            filter,
            claims,
            fetch_retry,
            fetch_timeout,
            skip_irrelevant,
        }
    }

    /// Processes one entry end to end
    pub async fn process(&self, entry: FrontierEntry, intent: &Arc<IntentProfile>) -> PageOutcome {
        tracing::debug!(url = %entry.url, depth = entry.depth, priority = %entry.priority, "processing page");

        let page = match self.fetch(&entry.url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(url = %entry.url, reason = %e.reason, "fetch failed: {}", e.message);
                let health = if e.is_transient() {
                    ExternalHealth::Unreachable(e.to_string())
                } else {
                    ExternalHealth::Neutral
                };
                return PageOutcome::failed(entry, e.to_string(), health);
            }
        };

        let final_url = match normalize_relative(&entry.url, page.final_url.as_str()) {
            Ok(url) => url,
            Err(_) => page.final_url.clone(),
        };
        if final_url != entry.url {
            if let Err(reason) = self.filter.check(&final_url) {
                tracing::info!(url = %entry.url, target = %final_url, "redirect left the crawl scope");
                return PageOutcome::skipped(entry, format!("redirected to {} ({})", final_url, reason));
            }
            if !self.claims.claim(&final_url).await {
                tracing::info!(url = %entry.url, target = %final_url, "redirect to an already visited page");
                return PageOutcome::skipped(entry, format!("redirected to already visited {}", final_url));
            }
        }

        match self.handle_page(&entry, &final_url, page, intent).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(url = %entry.url, "failed to store page artifacts: {}", e);
                PageOutcome::failed(entry, format!("storage {}", e), ExternalHealth::Neutral)
            }
        }
    }

    /// Fetches through the politeness gate, retrying transient errors
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let host = extract_domain(url).unwrap_or_default();
        let timeout = self.fetch_timeout;
        retry_async(
            &self.fetch_retry,
            "fetch",
            |_| {
                let host = host.as_str();
                async move {
                    self.gate.wait_turn(host).await;
                    match tokio::time::timeout(timeout, self.fetcher.fetch(url, timeout)).await {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::new(
                            url.as_str(),
                            FetchErrorReason::Timeout,
                            format!("no response within {}s", timeout.as_secs()),
                        )),
                    }
                }
            },
            FetchError::is_transient,
        )
        .await
    }

    async fn handle_page(
        &self,
        entry: &FrontierEntry,
        final_url: &Url,
        page: FetchedPage,
        intent: &Arc<IntentProfile>,
    ) -> Result<PageOutcome, StorageError> {
        let key = url_key(&entry.url);

        let extracted = match self.extractor.extract(&page.markup, final_url) {
            Ok(extracted) => extracted,
            Err(e) => {
                self.store
                    .put(Layer::Raw, &key, artifacts::PAGE, "html", page.markup.as_bytes())?;
                tracing::info!(url = %entry.url, "nothing usable on page: {}", e);
                return Ok(PageOutcome::failed(entry.clone(), format!("extract {}", e), ExternalHealth::Neutral));
            }
        };

        if !self.claims.claim_content(&extracted.text).await {
            tracing::info!(url = %entry.url, "same content as an earlier page, skipping");
            return Ok(PageOutcome::skipped(entry.clone(), "duplicate content"));
        }

        self.store
            .put(Layer::Raw, &key, artifacts::PAGE, "html", page.markup.as_bytes())?;
        drop(page);

        let chunks = self.chunker.chunk(&extracted.text, entry.url.as_str());
        let document = PageDocument {
            url: entry.url.to_string(),
            final_url: final_url.to_string(),
            depth: entry.depth,
            title: extracted.title.clone(),
            text: extracted.text,
            chunks,
            links: extracted.links,
            contacts: extracted.contacts,
            metadata: extracted.metadata,
            fetched_at: Utc::now(),
        };
        let store: &dyn LayeredStore = self.store.as_ref();
        store.put_json(Layer::Processed, &key, artifacts::DOCUMENT, &document)?;

        let excerpt = document
            .chunks
            .first()
            .map(|c| c.text.as_str())
            .unwrap_or_default();
        let verdict = self
            .classifier
            .classify(document.title.as_deref(), excerpt, intent)
            .await;
        let mut unreachable = verdict.is_unreachable();
        let classification = Classification::from_verdict(entry.url.as_str(), &verdict);
        store.put_json(Layer::Processed, &key, artifacts::CLASSIFICATION, &classification)?;

        let mut relevance = classification.confidence;
        let mut links = Vec::new();

        if classification.is_relevant || !self.skip_irrelevant {
            let input = AnalysisInput {
                url: &entry.url,
                title: document.title.as_deref(),
                text: &document.text,
                chunks: &document.chunks,
                links: &document.links,
            };
            let analysis = self.analyzer.analyze(&input, intent).await;
            unreachable |= analysis.is_unreachable();
            let analysis = analysis.into_value();
            store.put_json(Layer::Processed, &key, artifacts::ANALYSIS, &analysis)?;

            relevance = Some(analysis.relevance_score);
            links = analysis
                .candidate_links
                .into_iter()
                .map(|c| (c.url, c.priority))
                .collect();
        } else {
            tracing::debug!(url = %entry.url, "irrelevant page, skipping analysis");
        }

        if links.is_empty() {
            links = document
                .links
                .iter()
                .map(|l| (l.url.clone(), Priority::Low))
                .collect();
        }

        tracing::info!(
            url = %entry.url,
            relevant = classification.is_relevant,
            source = %classification.source,
            links = links.len(),
            "page processed"
        );

        let health = if unreachable {
            ExternalHealth::Unreachable(format!("model backend unreachable while processing {}", entry.url))
        } else {
            ExternalHealth::Healthy
        };

        Ok(PageOutcome {
            entry: entry.clone(),
            record: VisitedRecord::success(entry.url.clone(), entry.depth),
            title: document.title,
            relevance,
            links,
            health,
        })
    }
}
