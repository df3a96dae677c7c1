//! Integration tests against mock HTTP servers
//!
//! These tests use wiremock to stand in for crawled sites and for the Ollama
//! endpoint, covering the HTTP fetcher, the model backend and a full run.

use intent_crawler::config::{parse_config, FetchConfig, ModelConfig};
use intent_crawler::crawler::{build_orchestrator, FetchErrorReason, Fetcher, HttpFetcher};
use intent_crawler::model::{ModelBackend, ModelError, ModelRequest, ModelRole, OllamaBackend};
use intent_crawler::state::{RunPhase, StopReason, VisitStatus};
use intent_crawler::storage::{
    artifacts, run_key, FsLayeredStore, Layer, LayeredStore, RunLedger, SqliteLedger,
};
use intent_crawler::url_key;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8")
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::from_config(&FetchConfig::default()).unwrap()
}

#[tokio::test]
async fn test_fetch_html_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admissions"))
        .respond_with(html("<html><body><p>Apply by June 1</p></body></html>"))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/admissions", server.uri())).unwrap();
    let page = fetcher().fetch(&url, Duration::from_secs(5)).await.unwrap();

    assert_eq!(page.status, Some(200));
    assert_eq!(page.final_url, url);
    assert!(page.markup.contains("June 1"));
}

#[tokio::test]
async fn test_fetch_follows_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", format!("{}/new", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html("<html><body><p>Moved here</p></body></html>"))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
    let page = fetcher().fetch(&url, Duration::from_secs(5)).await.unwrap();
    assert_eq!(page.final_url.path(), "/new");
}

#[tokio::test]
async fn test_fetch_status_mapping() {
    let server = MockServer::start().await;
    for (route, status) in [("/missing", 404), ("/forbidden", 403), ("/down", 503)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF".to_vec(), "application/pdf"))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    for (route, expected) in [
        ("/missing", FetchErrorReason::InvalidUrl),
        ("/forbidden", FetchErrorReason::Blocked),
        ("/down", FetchErrorReason::Network),
        ("/report.pdf", FetchErrorReason::InvalidUrl),
    ] {
        let url = Url::parse(&format!("{}{}", server.uri(), route)).unwrap();
        let err = fetcher.fetch(&url, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.reason, expected, "{route}");
    }
}

#[tokio::test]
async fn test_fetch_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<p>late</p>").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
    let err = fetcher()
        .fetch(&url, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err.reason, FetchErrorReason::Timeout);
    assert!(err.is_transient());
}

fn model_config(endpoint: &str) -> ModelConfig {
    ModelConfig {
        endpoint: endpoint.to_string(),
        classifier_model: "small-model".to_string(),
        analyzer_model: "large-model".to_string(),
        timeout_secs: 5,
        ..ModelConfig::default()
    }
}

#[tokio::test]
async fn test_ollama_request_and_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "small-model",
            "stream": false,
            "format": "json"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "small-model",
            "response": "{\"is_relevant\": true}",
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OllamaBackend::from_config(&model_config(&server.uri())).unwrap();
    let request = ModelRequest::new(ModelRole::Classify, "You judge pages.", json!({"title": "Admissions"}));
    let reply = backend.complete(&request).await.unwrap();
    assert_eq!(reply, "{\"is_relevant\": true}");
}

#[tokio::test]
async fn test_ollama_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;

    let backend = OllamaBackend::from_config(&model_config(&server.uri())).unwrap();
    let request = ModelRequest::new(ModelRole::Analyze, "ctx", json!({}));
    let err = backend.complete(&request).await.unwrap_err();
    assert!(matches!(err, ModelError::Status { status: 500, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_end_to_end_crawl() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            "<html><head><title>Example University</title></head><body>\
             <p>Welcome to admissions.</p><a href=\"/deadlines\">Deadlines</a></body></html>",
        ))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/deadlines"))
        .respond_with(html(
            "<html><head><title>Deadlines</title></head><body>\
             <p>Fall applications close on June 1.</p></body></html>",
        ))
        .mount(&site)
        .await;

    // One reply that satisfies every role's schema
    let ollama = MockServer::start().await;
    let reply = json!({
        "category": "admission",
        "keywords": ["admissions", "deadline"],
        "is_relevant": true,
        "confidence": 0.9,
        "relevance_score": 0.8,
        "summary": "Admission deadlines",
        "key_findings": ["Fall applications close on June 1"],
        "candidate_links": [{"url": "/deadlines", "priority": 1}]
    });
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": reply.to_string(),
            "done": true
        })))
        .mount(&ollama)
        .await;

    let dir = TempDir::new().unwrap();
    let config = parse_config(&format!(
        r#"
[crawl]
seed-url = "{seed}/"
intent = "find admission deadlines"
max-pages = 5
max-depth = 2
workers = 2

[fetch]
strategy = "http"
timeout-secs = 5
max-attempts = 1

[politeness]
min-domain-interval-ms = 0

[model]
endpoint = "{endpoint}"
max-attempts = 1

[output]
data-dir = "{data}"
database-path = "{db}"
report-path = "{report}"
"#,
        seed = site.uri(),
        endpoint = ollama.uri(),
        data = dir.path().join("data").display(),
        db = dir.path().join("ledger.db").display(),
        report = dir.path().join("report.md").display(),
    ))
    .unwrap();

    let mut orchestrator = build_orchestrator(&config, "e2e").await.unwrap();
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.stop_reason, StopReason::FrontierExhausted);
    assert_eq!(report.counts.success, 2);

    let ledger = SqliteLedger::new(Path::new(&config.output.database_path)).unwrap();
    let visits = ledger.get_visits(report.run_id).unwrap();
    assert!(visits.iter().all(|v| v.status == VisitStatus::Success));
    assert_eq!(visits[1].title.as_deref(), Some("Deadlines"));

    let store = FsLayeredStore::open(&config.output.data_dir).unwrap();
    let key = url_key(&Url::parse(&format!("{}/deadlines", site.uri())).unwrap());
    assert!(store.get(Layer::Raw, &key, artifacts::PAGE).is_ok());
    assert!(store.get(Layer::Processed, &key, artifacts::ANALYSIS).is_ok());

    let markdown = std::fs::read_to_string(&config.output.report_path).unwrap();
    assert!(markdown.contains("Fall applications close on June 1"));

    let stored = store
        .get(Layer::Report, &run_key(report.run_id), artifacts::REPORT)
        .unwrap();
    assert!(String::from_utf8(stored).unwrap().contains("Fall applications close on June 1"));
}
