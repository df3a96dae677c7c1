//! Deep analysis: relevance, findings and the next links to follow
//!
//! The analyzer is called once per chunk (all of them unless a per-page limit
//! is configured), each call
//! carrying the same list of page links. Per-chunk replies are merged:
//! the highest relevance wins, findings are concatenated without repeats,
//! structured fields keep their first value and each candidate URL keeps its
//! best priority.

use crate::chunking::TextChunk;
use crate::crawler::{Priority, RawLink};
use crate::intent::IntentProfile;
use crate::model::client::{FallbackCause, ModelClient, Verdict};
use crate::model::fallback::analyze_by_keywords;
use crate::model::schema::{lenient_priority, AnalysisResponse};
use crate::model::{ModelRequest, ModelRole};
use crate::url::normalize_relative;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Links sent to the model with every chunk
const LINKS_PER_REQUEST: usize = 20;

/// Candidate links kept per page
pub const MAX_CANDIDATE_LINKS: usize = 10;

const SYSTEM_CONTEXT: &str = "You analyze one part of a web page for a research goal: \
     rate its relevance, extract the facts that serve the goal, and choose which of the \
     page's links are worth visiting next.";

/// A link the analyzer recommends, resolved and normalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLink {
    pub url: String,
    pub priority: Priority,
    #[serde(default)]
    pub reason: String,
}

/// Per-page analysis as persisted in the processed layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub url: String,
    pub relevance_score: f64,
    pub summary: String,
    pub key_findings: Vec<String>,
    pub structured_data: Map<String, Value>,
    pub candidate_links: Vec<CandidateLink>,
    /// "model" or "fallback"
    pub source: String,
    pub analyzed_at: DateTime<Utc>,
}

/// What the analyzer is asked about
pub struct AnalysisInput<'a> {
    pub url: &'a Url,
    pub title: Option<&'a str>,
    pub text: &'a str,
    pub chunks: &'a [TextChunk],
    pub links: &'a [RawLink],
}

pub struct DeepAnalyzer {
    client: ModelClient,
    max_chunks: Option<usize>,
}

impl DeepAnalyzer {
    /// `max_chunks` of 0 means no limit
    pub fn new(client: ModelClient, max_chunks: usize) -> Self {
        Self {
            client,
            max_chunks: (max_chunks > 0).then_some(max_chunks),
        }
    }

    /// Analyzes a page; falls back to keywords if no chunk got a usable reply
    pub async fn analyze(
        &self,
        input: &AnalysisInput<'_>,
        intent: &Arc<IntentProfile>,
    ) -> Verdict<AnalysisResult> {
        let links: Vec<Value> = input
            .links
            .iter()
            .take(LINKS_PER_REQUEST)
            .map(|l| json!({"url": l.url, "text": l.anchor_text}))
            .collect();
        let chunk_count = match self.max_chunks {
            Some(limit) if input.chunks.len() > limit => {
                tracing::warn!(
                    url = %input.url,
                    "analyzing {} of {} chunks (max-chunks-per-page)",
                    limit,
                    input.chunks.len()
                );
                limit
            }
            _ => input.chunks.len(),
        };

        let mut responses = Vec::new();
        let mut cause = FallbackCause::Malformed;
        for chunk in input.chunks.iter().take(chunk_count) {
            let request = ModelRequest::new(
                ModelRole::Analyze,
                SYSTEM_CONTEXT,
                json!({
                    "url": input.url.as_str(),
                    "title": input.title.unwrap_or_default(),
                    "chunk": chunk.index + 1,
                    "chunk_count": chunk_count,
                    "text": chunk.text,
                    "links": links,
                }),
            )
            .with_intent(intent.clone());

            match self.client.call::<AnalysisResponse>(&request).await {
                Ok(response) => responses.push(response),
                Err(failure) => {
                    tracing::warn!(
                        url = %input.url,
                        chunk = chunk.index,
                        "analysis of chunk failed: {}",
                        failure.error
                    );
                    if failure.cause == FallbackCause::Unreachable {
                        cause = FallbackCause::Unreachable;
                    }
                }
            }
        }

        if responses.is_empty() {
            return Verdict::Fallback {
                value: analyze_by_keywords(input.url, input.title, input.text, input.links, intent),
                cause,
            };
        }
        Verdict::Model(merge_responses(input.url, responses))
    }
}

/// Folds per-chunk replies into one result
fn merge_responses(page_url: &Url, responses: Vec<AnalysisResponse>) -> AnalysisResult {
    let mut relevance: f64 = 0.0;
    let mut summary = String::new();
    let mut key_findings: Vec<String> = Vec::new();
    let mut structured_data = Map::new();
    let mut links: Vec<CandidateLink> = Vec::new();
    let mut link_index: HashMap<String, usize> = HashMap::new();

    for response in responses {
        relevance = relevance.max(response.relevance_score);
        if summary.is_empty() && !response.summary.trim().is_empty() {
            summary = response.summary.trim().to_string();
        }
        for finding in response.key_findings {
            let finding = finding.trim().to_string();
            if !finding.is_empty() && !key_findings.contains(&finding) {
                key_findings.push(finding);
            }
        }
        for (key, value) in response.structured_data {
            structured_data.entry(key).or_insert(value);
        }
        for wire in response.candidate_links {
            let Ok(url) = normalize_relative(page_url, &wire.url) else {
                tracing::debug!(url = %wire.url, "dropping unresolvable candidate link");
                continue;
            };
            let priority = lenient_priority(&wire.priority);
            match link_index.get(url.as_str()) {
                Some(&i) => {
                    if priority < links[i].priority {
                        links[i].priority = priority;
                    }
                }
                None => {
                    link_index.insert(url.to_string(), links.len());
                    links.push(CandidateLink {
                        url: url.to_string(),
                        priority,
                        reason: wire.reason,
                    });
                }
            }
        }
    }

    links.sort_by_key(|l| l.priority);
    links.truncate(MAX_CANDIDATE_LINKS);

    AnalysisResult {
        url: page_url.to_string(),
        relevance_score: relevance,
        summary,
        key_findings,
        structured_data,
        candidate_links: links,
        source: "model".to_string(),
        analyzed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::chunk_text;
    use crate::model::schema::CandidateLinkWire;
    use crate::model::{ModelBackend, ModelError};
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    fn wire(url: &str, priority: Value) -> CandidateLinkWire {
        CandidateLinkWire {
            url: url.to_string(),
            priority,
            reason: String::new(),
        }
    }

    fn response(score: f64, findings: &[&str], links: Vec<CandidateLinkWire>) -> AnalysisResponse {
        AnalysisResponse {
            relevance_score: score,
            summary: String::new(),
            key_findings: findings.iter().map(|s| s.to_string()).collect(),
            structured_data: Map::new(),
            candidate_links: links,
        }
    }

    #[test]
    fn test_merge_keeps_best_priority_and_max_relevance() {
        let page = Url::parse("https://example.edu/admissions/").unwrap();
        let merged = merge_responses(
            &page,
            vec![
                response(0.4, &["Deadline June 1"], vec![wire("deadlines", json!(3)), wire("/fees", json!("2"))]),
                response(0.9, &["Deadline June 1", "Fee $50"], vec![wire("/admissions/deadlines/", json!(1))]),
            ],
        );
        assert_eq!(merged.relevance_score, 0.9);
        assert_eq!(merged.key_findings, vec!["Deadline June 1", "Fee $50"]);
        assert_eq!(merged.candidate_links.len(), 2);
        assert_eq!(merged.candidate_links[0].url, "https://example.edu/admissions/deadlines");
        assert_eq!(merged.candidate_links[0].priority, Priority::High);
        assert_eq!(merged.candidate_links[1].priority, Priority::Medium);
    }

    #[test]
    fn test_merge_caps_links() {
        let page = Url::parse("https://example.edu/").unwrap();
        let links = (0..25).map(|i| wire(&format!("/p{}", i), json!(2))).collect();
        let merged = merge_responses(&page, vec![response(0.5, &[], links)]);
        assert_eq!(merged.candidate_links.len(), MAX_CANDIDATE_LINKS);
        assert_eq!(merged.candidate_links[0].url, "https://example.edu/p0");
    }

    #[test]
    fn test_structured_data_first_wins() {
        let page = Url::parse("https://example.edu/").unwrap();
        let mut a = response(0.1, &[], vec![]);
        a.structured_data.insert("deadline".into(), json!("June 1"));
        let mut b = response(0.1, &[], vec![]);
        b.structured_data.insert("deadline".into(), json!("July 1"));
        b.structured_data.insert("fee".into(), json!(50));
        let merged = merge_responses(&page, vec![a, b]);
        assert_eq!(merged.structured_data["deadline"], json!("June 1"));
        assert_eq!(merged.structured_data["fee"], json!(50));
    }

    struct Counting {
        calls: Mutex<u32>,
        reply: Result<&'static str, ModelError>,
    }

    #[async_trait]
    impl ModelBackend for Counting {
        async fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            *self.calls.lock().unwrap() += 1;
            self.reply.clone().map(str::to_string)
        }
    }

    /// Reports a finding only for chunks that mention the deadline
    struct DeadlineSpotter {
        chunks_seen: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl ModelBackend for DeadlineSpotter {
        async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
            let chunk = request.payload["chunk"].as_u64().unwrap_or_default();
            self.chunks_seen.lock().unwrap().push(chunk);
            let text = request.payload["text"].as_str().unwrap_or_default();
            if text.contains("June") {
                Ok(r#"{"relevance_score": 0.9, "key_findings": ["Applications close June 1"]}"#.to_string())
            } else {
                Ok(r#"{"relevance_score": 0.1}"#.to_string())
            }
        }
    }

    fn analyzer(backend: Arc<Counting>, max_chunks: usize) -> DeepAnalyzer {
        let client = ModelClient::new(backend, Duration::from_secs(1), RetryPolicy::new(1, Duration::ZERO));
        DeepAnalyzer::new(client, max_chunks)
    }

    #[tokio::test]
    async fn test_every_chunk_analyzed_without_limit() {
        let backend = Arc::new(DeadlineSpotter { chunks_seen: Mutex::new(Vec::new()) });
        let url = Url::parse("https://example.edu/").unwrap();
        let mut text = "Campus life and student clubs. ".repeat(14);
        text.push_str("Applications close June 1.");
        let chunks = chunk_text(&text, 100, 10, url.as_str()).unwrap();
        assert!(chunks.len() >= 5);
        assert!(!chunks[..4].iter().any(|c| c.text.contains("June")));
        let input = AnalysisInput { url: &url, title: None, text: &text, chunks: &chunks, links: &[] };
        let intent = Arc::new(IntentProfile::heuristic("admissions"));

        let client = ModelClient::new(backend.clone(), Duration::from_secs(1), RetryPolicy::new(1, Duration::ZERO));
        let verdict = DeepAnalyzer::new(client, 0).analyze(&input, &intent).await;

        let seen = backend.chunks_seen.lock().unwrap().clone();
        assert_eq!(seen, (1..=chunks.len() as u64).collect::<Vec<_>>());
        assert_eq!(verdict.value().key_findings, vec!["Applications close June 1"]);
        assert_eq!(verdict.value().relevance_score, 0.9);
    }

    #[tokio::test]
    async fn test_one_call_per_chunk_up_to_limit() {
        let backend = Arc::new(Counting {
            calls: Mutex::new(0),
            reply: Ok(r#"{"relevance_score": 0.7}"#),
        });
        let url = Url::parse("https://example.edu/").unwrap();
        let text = "Admissions open. ".repeat(40);
        let chunks = chunk_text(&text, 100, 10, url.as_str()).unwrap();
        assert!(chunks.len() > 3);
        let input = AnalysisInput { url: &url, title: None, text: &text, chunks: &chunks, links: &[] };
        let intent = Arc::new(IntentProfile::heuristic("admissions"));

        let verdict = analyzer(backend.clone(), 3).analyze(&input, &intent).await;
        assert_eq!(*backend.calls.lock().unwrap(), 3);
        assert_eq!(verdict.value().relevance_score, 0.7);
        assert_eq!(verdict.value().source, "model");
    }

    #[tokio::test]
    async fn test_unreachable_uses_keyword_fallback() {
        let backend = Arc::new(Counting {
            calls: Mutex::new(0),
            reply: Err(ModelError::Unavailable("down".into())),
        });
        let url = Url::parse("https://example.edu/").unwrap();
        let text = "Admissions deadlines";
        let chunks = chunk_text(text, 100, 10, url.as_str()).unwrap();
        let links = vec![RawLink {
            url: "https://example.edu/admissions".to_string(),
            anchor_text: "Admissions".to_string(),
        }];
        let input = AnalysisInput { url: &url, title: None, text, chunks: &chunks, links: &links };
        let intent = Arc::new(IntentProfile::heuristic("admissions"));

        let verdict = analyzer(backend, 4).analyze(&input, &intent).await;
        assert!(verdict.is_unreachable());
        assert_eq!(verdict.value().source, "fallback");
        assert_eq!(verdict.value().candidate_links.len(), 1);
    }
}
