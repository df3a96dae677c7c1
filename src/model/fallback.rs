//! Keyword-based judgments used when the model is unreachable or unusable

use crate::crawler::{Priority, RawLink};
use crate::intent::IntentProfile;
use crate::model::analyzer::{AnalysisResult, CandidateLink, MAX_CANDIDATE_LINKS};
use crate::model::schema::ClassifierVerdict;
use crate::url::extract_domain;
use chrono::Utc;
use serde_json::{Map, Value};
use url::Url;

/// Share of intent keywords present in `text` (0.5 when there are no keywords)
pub fn keyword_relevance(intent: &IntentProfile, text: &str) -> (f64, Vec<String>) {
    if intent.keywords.is_empty() {
        return (0.5, Vec::new());
    }
    let haystack = text.to_lowercase();
    let matched: Vec<String> = intent
        .keywords
        .iter()
        .filter(|k| haystack.contains(k.to_lowercase().as_str()))
        .cloned()
        .collect();
    (matched.len() as f64 / intent.keywords.len() as f64, matched)
}

pub fn classify_by_keywords(
    intent: &IntentProfile,
    title: Option<&str>,
    text: &str,
    threshold: f64,
) -> ClassifierVerdict {
    let combined = format!("{} {}", title.unwrap_or_default(), text);
    let (score, _) = keyword_relevance(intent, &combined);
    ClassifierVerdict {
        is_relevant: score >= threshold,
        category: intent.category.as_str().to_string(),
        confidence: Some(score),
    }
}

/// Picks same-host links whose anchor text or URL mention intent keywords
///
/// Two or more matching keywords give priority 1, one gives priority 2.
pub fn select_urls_by_keywords(
    links: &[RawLink],
    intent: &IntentProfile,
    page_url: &Url,
) -> Vec<CandidateLink> {
    let host = extract_domain(page_url);
    let mut selected: Vec<CandidateLink> = links
        .iter()
        .filter_map(|link| {
            let url = Url::parse(&link.url).ok()?;
            if extract_domain(&url) != host {
                return None;
            }
            let haystack = format!("{} {}", link.anchor_text, link.url).to_lowercase();
            let matches = intent
                .keywords
                .iter()
                .filter(|k| haystack.contains(k.to_lowercase().as_str()))
                .count();
            let priority = match matches {
                0 => return None,
                1 => Priority::Medium,
                _ => Priority::High,
            };
            Some(CandidateLink {
                url: link.url.clone(),
                priority,
                reason: format!("matched {} keyword(s)", matches),
            })
        })
        .collect();

    selected.sort_by_key(|l| l.priority);
    selected.truncate(MAX_CANDIDATE_LINKS);
    selected
}

/// Builds a full analysis result from keywords alone
pub fn analyze_by_keywords(
    url: &Url,
    title: Option<&str>,
    text: &str,
    links: &[RawLink],
    intent: &IntentProfile,
) -> AnalysisResult {
    let head: String = text.chars().take(500).collect();
    let (score, matched) = keyword_relevance(intent, &format!("{} {}", title.unwrap_or_default(), head));

    let mut structured_data = Map::new();
    if let Some(title) = title {
        structured_data.insert("title".to_string(), Value::String(title.to_string()));
    }
    structured_data.insert("main_content".to_string(), Value::String(head));

    AnalysisResult {
        url: url.to_string(),
        relevance_score: score,
        summary: truncate_chars(text, 200),
        key_findings: if matched.is_empty() {
            Vec::new()
        } else {
            vec![format!("keyword match: {}", matched.join(", "))]
        },
        structured_data,
        candidate_links: select_urls_by_keywords(links, intent, url),
        source: "fallback".to_string(),
        analyzed_at: Utc::now(),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> IntentProfile {
        IntentProfile::heuristic("graduate admissions deadlines")
    }

    fn link(url: &str, text: &str) -> RawLink {
        RawLink {
            url: url.to_string(),
            anchor_text: text.to_string(),
        }
    }

    #[test]
    fn test_keyword_relevance_fraction() {
        let (score, matched) = keyword_relevance(&intent(), "Admissions deadlines are in June");
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn test_keyword_relevance_without_keywords() {
        let mut profile = intent();
        profile.keywords.clear();
        assert_eq!(keyword_relevance(&profile, "anything").0, 0.5);
    }

    #[test]
    fn test_classify_threshold() {
        let v = classify_by_keywords(&intent(), Some("Graduate"), "nothing else", 0.2);
        assert!(v.is_relevant);
        let v = classify_by_keywords(&intent(), Some("Sports"), "football scores", 0.2);
        assert!(!v.is_relevant);
        assert_eq!(v.category, "admission");
    }

    #[test]
    fn test_select_urls_by_keywords() {
        let page = Url::parse("https://example.edu/").unwrap();
        let links = vec![
            link("https://example.edu/news", "Campus news"),
            link("https://example.edu/admissions", "Admissions"),
            link("https://example.edu/graduate/admissions/deadlines", "Deadlines"),
            link("https://other.org/admissions/deadlines", "Partner deadlines"),
        ];
        let selected = select_urls_by_keywords(&links, &intent(), &page);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].url, "https://example.edu/graduate/admissions/deadlines");
        assert_eq!(selected[0].priority, Priority::High);
        assert_eq!(selected[1].priority, Priority::Medium);
    }

    #[test]
    fn test_analyze_by_keywords() {
        let page = Url::parse("https://example.edu/").unwrap();
        let text = "Graduate admissions open in March. ".repeat(20);
        let result = analyze_by_keywords(&page, Some("Welcome"), &text, &[], &intent());
        assert_eq!(result.source, "fallback");
        assert!(result.summary.ends_with("..."));
        assert_eq!(result.key_findings.len(), 1);
        assert!(result.structured_data.contains_key("main_content"));
        assert!(result.candidate_links.is_empty());
    }
}
