//! Integration tests for the crawl loop
//!
//! These tests drive the orchestrator with an in-memory site and a scripted
//! model backend, and check what ends up in the ledger and the layered store.

use async_trait::async_trait;
use intent_crawler::config::{parse_config, Config};
use intent_crawler::crawler::{
    Collaborators, FetchError, FetchErrorReason, FetchedPage, Fetcher, HtmlExtractor, Orchestrator,
};
use intent_crawler::model::{ModelBackend, ModelError, ModelRequest, ModelRole};
use intent_crawler::state::{RunPhase, StopReason, VisitStatus};
use intent_crawler::storage::{artifacts, FsLayeredStore, Layer, LayeredStore, RunLedger, SqliteLedger};
use intent_crawler::{url_key, CrawlerError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

const BASE: &str = "https://example.edu";

/// In-memory site keyed by path; unknown paths time out
struct SiteFetcher {
    pages: HashMap<String, String>,
    hits: Mutex<HashMap<String, u32>>,
}

impl SiteFetcher {
    fn new(pages: &[(&str, String)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(path, html)| (path.to_string(), html.clone()))
                .collect(),
            hits: Mutex::new(HashMap::new()),
        }
    }

    fn hits(&self, path: &str) -> u32 {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for SiteFetcher {
    async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<FetchedPage, FetchError> {
        *self
            .hits
            .lock()
            .unwrap()
            .entry(url.path().to_string())
            .or_insert(0) += 1;
        match self.pages.get(url.path()) {
            Some(markup) => Ok(FetchedPage {
                markup: markup.clone(),
                final_url: url.clone(),
                status: Some(200),
            }),
            None => Err(FetchError::new(url.as_str(), FetchErrorReason::Timeout, "deadline elapsed")),
        }
    }
}

/// Replies per role; analyzer replies are looked up by page path and
/// consumed in order, the last one repeating
struct ScriptedBackend {
    offline: bool,
    analyses: Mutex<HashMap<String, Vec<String>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedBackend {
    fn new() -> Self {
        Self {
            offline: false,
            analyses: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn offline() -> Self {
        Self {
            offline: true,
            ..Self::new()
        }
    }

    fn analysis(self, path: &str, replies: &[&str]) -> Self {
        self.analyses
            .lock()
            .unwrap()
            .insert(path.to_string(), replies.iter().map(|r| r.to_string()).collect());
        self
    }

    fn analyze_requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.role == ModelRole::Analyze)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.offline {
            return Err(ModelError::Unavailable("connection refused".to_string()));
        }
        match request.role {
            ModelRole::Intent => Ok(r#"{"category": "admission", "keywords": ["admissions", "deadline"]}"#.to_string()),
            ModelRole::Classify => Ok(r#"{"is_relevant": true, "category": "admission", "confidence": 0.9}"#.to_string()),
            ModelRole::Analyze => {
                let path = request
                    .payload
                    .get("url")
                    .and_then(|u| u.as_str())
                    .and_then(|u| Url::parse(u).ok())
                    .map(|u| u.path().to_string())
                    .unwrap_or_default();
                let mut analyses = self.analyses.lock().unwrap();
                let reply = match analyses.get_mut(&path) {
                    Some(replies) if replies.len() > 1 => replies.remove(0),
                    Some(replies) => replies[0].clone(),
                    None => r#"{"relevance_score": 0.5, "summary": "Nothing new"}"#.to_string(),
                };
                Ok(reply)
            }
        }
    }
}

fn page(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|l| format!("<a href=\"{l}\">{l}</a>"))
        .collect();
    format!(
        "<html><head><title>{title}</title></head><body>\
         <p>{title}: admissions deadlines and application details.</p>{anchors}</body></html>"
    )
}

fn config(dir: &TempDir, crawl: &str) -> Config {
    // Single worker unless the caller asks for more
    let workers = if crawl.contains("workers") { "" } else { "workers = 1" };
    parse_config(&format!(
        r#"
[crawl]
seed-url = "{BASE}/"
intent = "find admissions deadlines"
{workers}
{crawl}

[fetch]
max-attempts = 3
retry-delay-ms = 0

[politeness]
min-domain-interval-ms = 0

[model]
max-attempts = 1

[output]
data-dir = "{data}"
database-path = "{db}"
report-path = "{report}"
"#,
        data = dir.path().join("data").display(),
        db = dir.path().join("ledger.db").display(),
        report = dir.path().join("report.md").display(),
    ))
    .unwrap()
}

async fn orchestrator(
    config: &Config,
    fetcher: Arc<SiteFetcher>,
    backend: Arc<ScriptedBackend>,
) -> Orchestrator {
    Orchestrator::new(
        config,
        "test-hash",
        Collaborators {
            fetcher,
            extractor: Arc::new(HtmlExtractor::new().unwrap()),
            model: backend,
            store: Arc::new(FsLayeredStore::open(&config.output.data_dir).unwrap()),
            ledger: Box::new(SqliteLedger::new(Path::new(&config.output.database_path)).unwrap()),
        },
    )
    .await
    .unwrap()
}

fn ledger(config: &Config) -> SqliteLedger {
    SqliteLedger::new(Path::new(&config.output.database_path)).unwrap()
}

#[tokio::test]
async fn test_priorities_order_visits_within_budget() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, "max-pages = 3\nmax-depth = 1");

    let fetcher = Arc::new(SiteFetcher::new(&[
        ("/", page("Home", &["/a", "/b", "/c", "/d", "/e"])),
        ("/a", page("A", &[])),
        ("/b", page("B", &[])),
        ("/c", page("C", &[])),
        ("/d", page("D", &[])),
        ("/e", page("E", &[])),
    ]));
    let backend = Arc::new(ScriptedBackend::new().analysis(
        "/",
        &[r#"{"relevance_score": 0.8, "summary": "Home", "candidate_links": [
            {"url": "/a", "priority": 1}, {"url": "/b", "priority": 2},
            {"url": "/c", "priority": 2}, {"url": "/d", "priority": 3},
            {"url": "/e", "priority": 3}]}"#],
    ));

    let mut orch = orchestrator(&config, fetcher.clone(), backend).await;
    let report = orch.run().await.unwrap();

    assert_eq!(report.stop_reason, StopReason::BudgetExhausted);
    assert_eq!(report.counts.success, 3);

    let ledger = ledger(&config);
    let visited: Vec<String> = ledger
        .get_visits(report.run_id)
        .unwrap()
        .into_iter()
        .map(|v| v.url)
        .collect();
    assert_eq!(visited, vec![format!("{BASE}/"), format!("{BASE}/a"), format!("{BASE}/b")]);

    let pending: Vec<(String, u8)> = ledger
        .get_frontier_snapshot(report.run_id)
        .unwrap()
        .into_iter()
        .map(|r| (r.url, r.priority))
        .collect();
    assert_eq!(
        pending,
        vec![
            (format!("{BASE}/c"), 2),
            (format!("{BASE}/d"), 3),
            (format!("{BASE}/e"), 3),
        ]
    );
    assert_eq!(fetcher.hits("/c"), 0);
}

#[tokio::test]
async fn test_timeouts_fail_page_and_complete_run() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, "");

    let fetcher = Arc::new(SiteFetcher::new(&[]));
    let mut orch = orchestrator(&config, fetcher.clone(), Arc::new(ScriptedBackend::new())).await;
    let report = orch.run().await.unwrap();

    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.stop_reason, StopReason::FrontierExhausted);
    assert_eq!(report.counts.success, 0);
    assert_eq!(report.counts.failed, 1);
    assert_eq!(fetcher.hits("/"), 3);

    let visits = ledger(&config).get_visits(report.run_id).unwrap();
    assert_eq!(visits[0].status, VisitStatus::Failed);
    assert!(visits[0].error.as_deref().unwrap().starts_with("timeout"));
}

#[tokio::test]
async fn test_malformed_analysis_is_retried_strictly() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, "max-pages = 1");

    let fetcher = Arc::new(SiteFetcher::new(&[("/", page("Home", &["/a"]))]));
    let backend = Arc::new(ScriptedBackend::new().analysis(
        "/",
        &[
            "Sure! The page looks relevant.",
            r#"{"relevance_score": 0.9, "summary": "Deadlines listed", "key_findings": ["June 1"]}"#,
        ],
    ));

    let mut orch = orchestrator(&config, fetcher, backend.clone()).await;
    let report = orch.run().await.unwrap();
    assert_eq!(report.counts.success, 1);

    let requests = backend.analyze_requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].strict);
    assert!(requests[1].strict);

    let store = FsLayeredStore::open(&config.output.data_dir).unwrap();
    let key = url_key(&Url::parse(&format!("{BASE}/")).unwrap());
    assert_eq!(store.versions(Layer::Processed, &key, artifacts::ANALYSIS).unwrap(), vec![1]);

    let visits = ledger(&config).get_visits(report.run_id).unwrap();
    assert_eq!(visits[0].relevance, Some(0.9));
}

#[tokio::test]
async fn test_unreachable_model_aborts_run() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, "max-pages = 10\nmax-consecutive-failures = 2");

    let fetcher = Arc::new(SiteFetcher::new(&[
        ("/", page("Home", &["/a", "/b"])),
        ("/a", page("A", &[])),
        ("/b", page("B", &[])),
    ]));
    let mut orch = orchestrator(&config, fetcher, Arc::new(ScriptedBackend::offline())).await;
    let run_id = orch.run_id();

    let err = orch.run().await.unwrap_err();
    assert!(matches!(err, CrawlerError::FatalExternal { consecutive: 2, .. }));

    let ledger = ledger(&config);
    let run = ledger.get_run(run_id).unwrap();
    assert_eq!(run.phase, RunPhase::Aborted);
    assert_eq!(run.stop_reason, Some(StopReason::FatalExternal));
    assert_eq!(run.counts.success, 2);
    assert_eq!(ledger.get_frontier_snapshot(run_id).unwrap().len(), 1);
    assert!(Path::new(&config.output.report_path).exists());
}

#[tokio::test]
async fn test_cyclic_links_visit_each_page_once() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, "max-pages = 10\nmax-depth = 5\nworkers = 2");

    let fetcher = Arc::new(SiteFetcher::new(&[
        ("/", page("Home", &["/a", "/b", "/"])),
        ("/a", page("A", &["/", "/b", "/a#top"])),
        ("/b", page("B", &["/a", "/"])),
    ]));
    let mut orch = orchestrator(&config, fetcher.clone(), Arc::new(ScriptedBackend::new())).await;
    let report = orch.run().await.unwrap();

    assert_eq!(report.stop_reason, StopReason::FrontierExhausted);
    assert_eq!(report.counts.total(), 3);
    for path in ["/", "/a", "/b"] {
        assert_eq!(fetcher.hits(path), 1, "{path} fetched more than once");
    }

    let store = FsLayeredStore::open(&config.output.data_dir).unwrap();
    let store: &dyn LayeredStore = &store;
    let summary: serde_json::Value = store
        .get_json(Layer::Report, &format!("run-{}", report.run_id), artifacts::SUMMARY)
        .unwrap();
    assert_eq!(summary["success_count"], 3);
}
