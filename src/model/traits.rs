//! Model capability boundary
//!
//! Everything the crawler asks a language model goes through [`ModelBackend`]:
//! a typed request in, raw completion text out. Parsing and validating that
//! text happens in one place ([`crate::model::ModelClient`]), so no other code
//! ever branches on free-form model output.

use crate::intent::IntentProfile;
use crate::ErrorClass;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Which judgment a request is for; backends may route roles to different models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelRole {
    /// Turn free-text intent into an intent profile
    Intent,
    /// Cheap relevance gate
    Classify,
    /// Deep analysis and link prioritization
    Analyze,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Classify => "classify",
            Self::Analyze => "analyze",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured request to a model
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub role: ModelRole,
    pub system_context: String,
    pub intent: Option<Arc<IntentProfile>>,
    pub payload: serde_json::Value,
    /// Set on the retry after a non-conforming reply
    pub strict: bool,
}

impl ModelRequest {
    pub fn new(role: ModelRole, system_context: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            role,
            system_context: system_context.into(),
            intent: None,
            payload,
            strict: false,
        }
    }

    pub fn with_intent(mut self, intent: Arc<IntentProfile>) -> Self {
        self.intent = Some(intent);
        self
    }

    /// The same request with the stricter output instruction
    pub fn strict(&self) -> Self {
        Self {
            strict: true,
            ..self.clone()
        }
    }

    /// Renders the user prompt: intent profile, payload and response format
    pub fn render_prompt(&self) -> String {
        let mut prompt = String::new();

        if let Some(intent) = &self.intent {
            prompt.push_str("## Intent profile\n");
            prompt.push_str(
                &serde_json::to_string_pretty(intent.as_ref()).unwrap_or_else(|_| intent.intent.clone()),
            );
            prompt.push_str("\n\n");
        }

        prompt.push_str("## Input\n");
        prompt.push_str(
            &serde_json::to_string_pretty(&self.payload).unwrap_or_else(|_| self.payload.to_string()),
        );
        prompt.push_str("\n\n## Response format\n");
        prompt.push_str(crate::model::schema::response_format(self.role));

        if self.strict {
            prompt.push_str(
                "\n\nYour previous reply did not match this format. Reply with exactly one JSON \
                 object containing the fields above. No prose, no markdown fences.",
            );
        }
        prompt
    }
}

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("model backend unavailable: {0}")]
    Unavailable(String),

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("model backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("model output does not match the expected schema: {0}")]
    Decode(String),
}

impl ModelError {
    /// Network trouble worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::Decode(_) => false,
        }
    }

    /// The backend could not produce any completion
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_) | Self::Status { .. })
    }

    pub fn class(&self) -> ErrorClass {
        if self.is_transient() {
            ErrorClass::TransientExternal
        } else {
            ErrorClass::PermanentSkip
        }
    }
}

/// Capability to complete a model request
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Returns the raw completion text
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

#[async_trait]
impl<T: ModelBackend + ?Sized> ModelBackend for Arc<T> {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        (**self).complete(request).await
    }
}
