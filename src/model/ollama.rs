//! Ollama transport for [`ModelBackend`]

use crate::config::ModelConfig;
use crate::model::{ModelBackend, ModelError, ModelRequest, ModelRole};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Characters of an error body kept in [`ModelError::Status`]
const ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Completes requests against an Ollama server's `/api/generate`
///
/// Each role is routed to its own model so the cheap classifier can run on a
/// smaller model than intent compilation and deep analysis.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: Client,
    generate_url: String,
    intent_model: String,
    classifier_model: String,
    analyzer_model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(client: Client, config: &ModelConfig) -> Self {
        Self {
            client,
            generate_url: format!("{}/api/generate", config.endpoint.trim_end_matches('/')),
            intent_model: config.intent_model.clone(),
            classifier_model: config.classifier_model.clone(),
            analyzer_model: config.analyzer_model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::new(client, config))
    }

    pub fn model_for(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Intent => &self.intent_model,
            ModelRole::Classify => &self.classifier_model,
            ModelRole::Analyze => &self.analyzer_model,
        }
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let model = self.model_for(request.role);
        let body = GenerateRequest {
            model,
            prompt: request.render_prompt(),
            system: &request.system_context,
            stream: false,
            format: "json",
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        tracing::debug!(role = %request.role, model, strict = request.strict, "model request");
        let response = self
            .client
            .post(&self.generate_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_CHARS).collect(),
            });
        }

        let envelope: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        Ok(envelope.response)
    }
}

impl OllamaBackend {
    fn classify_transport_error(&self, error: &reqwest::Error) -> ModelError {
        if error.is_timeout() {
            ModelError::Timeout(self.timeout)
        } else {
            ModelError::Unavailable(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_roles_to_models() {
        let config = ModelConfig {
            endpoint: "http://localhost:11434/".to_string(),
            classifier_model: "small".to_string(),
            analyzer_model: "large".to_string(),
            ..ModelConfig::default()
        };
        let backend = OllamaBackend::new(Client::new(), &config);
        assert_eq!(backend.generate_url, "http://localhost:11434/api/generate");
        assert_eq!(backend.model_for(ModelRole::Classify), "small");
        assert_eq!(backend.model_for(ModelRole::Analyze), "large");
        assert_eq!(backend.model_for(ModelRole::Intent), config.intent_model);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let config = ModelConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            ..ModelConfig::default()
        };
        let backend = OllamaBackend::from_config(&config).unwrap();
        let request = ModelRequest::new(ModelRole::Classify, "judge", serde_json::json!({}));
        let err = backend.complete(&request).await.unwrap_err();
        assert!(err.is_unreachable());
    }
}
