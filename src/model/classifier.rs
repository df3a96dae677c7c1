use crate::intent::IntentProfile;
use crate::model::client::{ModelClient, Verdict};
use crate::model::fallback::classify_by_keywords;
use crate::model::schema::ClassifierVerdict;
use crate::model::{ModelRequest, ModelRole};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

const SYSTEM_CONTEXT: &str = "You decide quickly whether a web page is relevant to a \
     research goal. Judge only from the title and the text excerpt.";

/// Characters of page text sent to the classifier
const EXCERPT_CHARS: usize = 1500;

/// Classification as persisted in the processed layer
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub url: String,
    pub is_relevant: bool,
    pub category: String,
    pub confidence: Option<f64>,
    /// "model" or "fallback"
    pub source: String,
    pub classified_at: DateTime<Utc>,
}

impl Classification {
    pub fn from_verdict(url: &str, verdict: &Verdict<ClassifierVerdict>) -> Self {
        let v = verdict.value();
        Self {
            url: url.to_string(),
            is_relevant: v.is_relevant,
            category: v.category.clone(),
            confidence: v.confidence,
            source: if verdict.is_fallback() { "fallback" } else { "model" }.to_string(),
            classified_at: Utc::now(),
        }
    }
}

/// Cheap relevance gate in front of deep analysis
pub struct RelevanceClassifier {
    client: ModelClient,
    threshold: f64,
}

impl RelevanceClassifier {
    pub fn new(client: ModelClient, threshold: f64) -> Self {
        Self { client, threshold }
    }

    /// Judges a page from its title and first chunk
    ///
    /// Never fails: an unreachable backend or a reply that stays malformed
    /// after the strict retry yields the keyword judgment instead.
    pub async fn classify(
        &self,
        title: Option<&str>,
        excerpt: &str,
        intent: &Arc<IntentProfile>,
    ) -> Verdict<ClassifierVerdict> {
        let excerpt: String = excerpt.chars().take(EXCERPT_CHARS).collect();
        let request = ModelRequest::new(
            ModelRole::Classify,
            SYSTEM_CONTEXT,
            json!({
                "title": title.unwrap_or_default(),
                "text": excerpt,
            }),
        )
        .with_intent(intent.clone());

        match self.client.call::<ClassifierVerdict>(&request).await {
            Ok(verdict) => Verdict::Model(verdict),
            Err(failure) => {
                tracing::warn!(
                    cause = ?failure.cause,
                    "classifier falling back to keywords: {}",
                    failure.error
                );
                Verdict::Fallback {
                    value: classify_by_keywords(intent, title, &excerpt, self.threshold),
                    cause: failure.cause,
                }
            }
        }
    }
}
