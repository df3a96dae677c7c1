//! Response schemas and the validation boundary for model output

use crate::crawler::Priority;
use crate::model::ModelRole;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A decoded response that can check its own invariants
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Reply to a relevance classification request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub is_relevant: bool,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Validate for ClassifierVerdict {
    fn validate(&self) -> Result<(), String> {
        match self.confidence {
            Some(c) if !(0.0..=1.0).contains(&c) => Err(format!("confidence {} outside [0, 1]", c)),
            _ => Ok(()),
        }
    }
}

/// A link the analyzer wants visited, as sent by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateLinkWire {
    pub url: String,
    /// Anything; coerced with [`lenient_priority`]
    #[serde(default)]
    pub priority: Value,
    #[serde(default)]
    pub reason: String,
}

/// Reply to a deep analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub relevance_score: f64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default, alias = "extracted_data")]
    pub structured_data: Map<String, Value>,
    #[serde(default, alias = "prioritized_urls")]
    pub candidate_links: Vec<CandidateLinkWire>,
}

impl Validate for AnalysisResponse {
    fn validate(&self) -> Result<(), String> {
        if !self.relevance_score.is_finite() || !(0.0..=1.0).contains(&self.relevance_score) {
            return Err(format!(
                "relevance_score {} outside [0, 1]",
                self.relevance_score
            ));
        }
        if self.candidate_links.iter().any(|l| l.url.trim().is_empty()) {
            return Err("candidate link without url".to_string());
        }
        Ok(())
    }
}

/// Coerces a model-supplied priority into 1..=3
///
/// Numbers are clamped, numeric strings are parsed, anything else is 3.
pub fn lenient_priority(value: &Value) -> Priority {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .map_or(Priority::Low, Priority::from_rank),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_or(Priority::Low, Priority::from_rank),
        _ => Priority::Low,
    }
}

/// Returns the text between the first `{` and the last `}`
///
/// Models like to wrap JSON in prose or code fences; this is the only
/// cleanup applied before strict decoding.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Decodes and validates a raw completion
pub fn parse_response<T: DeserializeOwned + Validate>(raw: &str) -> Result<T, String> {
    let json = extract_json_object(raw).ok_or_else(|| "no JSON object in reply".to_string())?;
    let value: T = serde_json::from_str(json).map_err(|e| e.to_string())?;
    value.validate()?;
    Ok(value)
}

/// Response format instruction appended to every prompt of a role
pub fn response_format(role: ModelRole) -> &'static str {
    match role {
        ModelRole::Intent => {
            r#"Reply with one JSON object:
{"category": "admission|research|contact|email|policy|news|event|data|content|general",
 "keywords": ["lowercase keyword", ...],
 "focus_phrases": ["phrase", ...],
 "priority_signals": {"signal": 1.0, ...},
 "background": "one sentence of context",
 "exclude_patterns": ["/url-substring", ...]}"#
        }
        ModelRole::Classify => {
            r#"Reply with one JSON object:
{"is_relevant": true|false, "category": "short label", "confidence": 0.0-1.0}"#
        }
        ModelRole::Analyze => {
            r#"Reply with one JSON object:
{"relevance_score": 0.0-1.0,
 "summary": "two or three sentences",
 "key_findings": ["finding", ...],
 "structured_data": {"field": value, ...},
 "candidate_links": [{"url": "absolute url from the page links", "priority": 1|2|3, "reason": "why"}, ...]}
Priority 1 = must visit, 2 = worth visiting, 3 = optional. At most 10 links."#
        }
    }
}
