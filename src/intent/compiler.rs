//! Intent compilation: free text to [`IntentProfile`]

use crate::intent::profile::{split_keywords, IntentCategory, IntentProfile};
use crate::model::schema::Validate;
use crate::model::{ModelClient, ModelRequest, ModelRole, Verdict};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

/// Upper bound on keywords taken from a model reply
const MAX_KEYWORDS: usize = 10;

const SYSTEM_CONTEXT: &str = "You turn a research goal into a structured profile that \
     steers a web crawler: its category, search keywords, focus phrases and signal words.";

/// `priority_signals` arrives either as a weight map or as a plain word list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignalsWire {
    Weighted(BTreeMap<String, f32>),
    Words(Vec<String>),
}

impl Default for SignalsWire {
    fn default() -> Self {
        Self::Words(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    #[serde(default)]
    category: String,
    keywords: Vec<String>,
    #[serde(default, alias = "search_focus")]
    focus_phrases: FocusWire,
    #[serde(default)]
    priority_signals: SignalsWire,
    #[serde(default, alias = "prompt_background")]
    background: String,
    #[serde(default)]
    exclude_patterns: Vec<String>,
}

/// A single focus string or a list of them
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FocusWire {
    One(String),
    Many(Vec<String>),
}

impl Default for FocusWire {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl Validate for IntentResponse {
    fn validate(&self) -> Result<(), String> {
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err("no keywords".to_string());
        }
        Ok(())
    }
}

/// Compiles the run intent once, before crawling starts
pub struct IntentCompiler {
    client: ModelClient,
}

impl IntentCompiler {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }

    /// Asks the model for a profile; the keyword heuristic stands in on failure
    pub async fn compile(&self, intent: &str, seed_url: &str) -> Verdict<IntentProfile> {
        let request = ModelRequest::new(
            ModelRole::Intent,
            SYSTEM_CONTEXT,
            json!({ "intent": intent, "site": seed_url }),
        );

        match self.client.call::<IntentResponse>(&request).await {
            Ok(response) => {
                let profile = into_profile(intent, response);
                tracing::info!(
                    category = %profile.category,
                    keywords = ?profile.keywords,
                    "intent compiled"
                );
                Verdict::Model(profile)
            }
            Err(failure) => {
                tracing::warn!("intent compilation fell back to keywords: {}", failure.error);
                Verdict::Fallback {
                    value: IntentProfile::heuristic(intent),
                    cause: failure.cause,
                }
            }
        }
    }
}

fn into_profile(intent: &str, response: IntentResponse) -> IntentProfile {
    let category = IntentCategory::from_label(&response.category)
        .unwrap_or_else(|| IntentCategory::guess(intent));

    let keywords = response
        .keywords
        .iter()
        .flat_map(|k| split_keywords(k))
        .take(MAX_KEYWORDS)
        .collect();

    let mut focus_phrases: Vec<String> = match response.focus_phrases {
        FocusWire::One(s) => vec![s],
        FocusWire::Many(v) => v,
    }
    .into_iter()
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .collect();
    if focus_phrases.is_empty() {
        focus_phrases.push(intent.trim().to_string());
    }

    let priority_signals = match response.priority_signals {
        SignalsWire::Weighted(map) => map
            .into_iter()
            .map(|(k, w)| (k.trim().to_lowercase(), w))
            .filter(|(k, _)| !k.is_empty())
            .collect(),
        SignalsWire::Words(words) => words
            .into_iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .map(|w| (w, 1.0))
            .collect(),
    };

    let background = if response.background.trim().is_empty() {
        format!("Looking for information about: {}", intent.trim())
    } else {
        response.background.trim().to_string()
    };

    IntentProfile {
        intent: intent.trim().to_string(),
        category,
        keywords,
        focus_phrases,
        priority_signals,
        background,
        exclude_patterns: response
            .exclude_patterns
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::parse_response;
    use crate::model::{ModelBackend, ModelError};
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixed(Result<&'static str, ModelError>);

    #[async_trait]
    impl ModelBackend for Fixed {
        async fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            self.0.clone().map(str::to_string)
        }
    }

    fn compiler(reply: Result<&'static str, ModelError>) -> IntentCompiler {
        IntentCompiler::new(ModelClient::new(
            Arc::new(Fixed(reply)),
            Duration::from_secs(1),
            RetryPolicy::new(1, Duration::ZERO),
        ))
    }

    #[test]
    fn test_signal_list_and_map_both_accepted() {
        let listed: IntentResponse =
            parse_response(r#"{"keywords": ["fees"], "priority_signals": ["tuition", "cost"]}"#).unwrap();
        let profile = into_profile("tuition fees", listed);
        assert_eq!(profile.priority_signals.get("cost"), Some(&1.0));

        let weighted: IntentResponse =
            parse_response(r#"{"keywords": ["fees"], "priority_signals": {"Tuition": 2.5}}"#).unwrap();
        let profile = into_profile("tuition fees", weighted);
        assert_eq!(profile.priority_signals.get("tuition"), Some(&2.5));
    }

    #[test]
    fn test_unknown_category_is_guessed() {
        let response: IntentResponse =
            parse_response(r#"{"category": "sports", "keywords": ["Admission Deadlines"], "search_focus": "dates"}"#)
                .unwrap();
        let profile = into_profile("admission deadlines", response);
        assert_eq!(profile.category, IntentCategory::Admission);
        assert!(profile.keywords.contains("deadlines"));
        assert_eq!(profile.focus_phrases, vec!["dates"]);
    }

    #[test]
    fn test_reply_without_keywords_is_rejected() {
        assert!(parse_response::<IntentResponse>(r#"{"keywords": [" "]}"#).is_err());
    }

    #[tokio::test]
    async fn test_compile_from_model() {
        let c = compiler(Ok(
            r#"{"category": "policy", "keywords": ["visa", "rules"], "exclude_patterns": ["/alumni"]}"#,
        ));
        let verdict = c.compile("visa rules", "https://example.edu/").await;
        assert!(!verdict.is_fallback());
        let profile = verdict.into_value();
        assert_eq!(profile.category, IntentCategory::Policy);
        assert_eq!(profile.exclude_patterns, vec!["/alumni"]);
    }

    #[tokio::test]
    async fn test_compile_falls_back_to_heuristic() {
        let c = compiler(Err(ModelError::Unavailable("refused".into())));
        let verdict = c.compile("research labs", "https://example.edu/").await;
        assert!(verdict.is_unreachable());
        assert_eq!(verdict.value().category, IntentCategory::Research);
    }
}
