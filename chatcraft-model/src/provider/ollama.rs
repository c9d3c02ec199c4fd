//! Ollama native chat API (`POST /api/chat`)
//!
//! Uses the non-streaming form. `num_ctx` and `temperature` travel in the
//! `options` object; a JSON schema in `format` constrains the reply.

use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Provider for a local (or remote) Ollama daemon
pub struct OllamaProvider {
    client: Client,
    config: ProviderConfig,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.unwrap_or(300)))
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_OLLAMA_URL)
            .trim_end_matches('/')
    }
}

impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or(DEFAULT_OLLAMA_MODEL)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let model = request.model.as_deref().unwrap_or(self.default_model()).to_string();
        let api_request = OllamaChatRequest::build(&model, &request);

        let mut req = self.client
            .post(format!("{}/api/chat", self.base_url()))
            .json(&api_request);

        if let Some(api_key) = &self.config.api_key {
            if !api_key.is_empty() {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
        }

        tracing::debug!(model = %model, turns = request.messages.len(), "ollama chat request");

        let response = req.send().await.map_err(ProviderError::from_transport)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, text, &model));
        }

        let api_response: OllamaChatResponse = response.json().await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(api_response.into_completion())
    }
}

// ============================================================================
// Ollama API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "OllamaOptions::is_empty")]
    options: OllamaOptions,
}

impl OllamaChatRequest {
    fn build(model: &str, request: &CompletionRequest) -> Self {
        Self {
            model: model.to_string(),
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            stream: false,
            format: request.format.clone(),
            options: OllamaOptions {
                num_ctx: request.num_ctx,
                temperature: request.temperature,
            },
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl OllamaOptions {
    fn is_empty(&self) -> bool {
        self.num_ctx.is_none() && self.temperature.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

impl From<&Turn> for OllamaMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: usize,
    #[serde(default)]
    eval_count: usize,
}

impl OllamaChatResponse {
    fn into_completion(self) -> CompletionResponse {
        let usage = Usage {
            prompt_tokens: self.prompt_eval_count,
            completion_tokens: self.eval_count,
            total_tokens: self.prompt_eval_count + self.eval_count,
        };

        CompletionResponse {
            content: self.message.map(|m| m.content),
            finish_reason: FinishReason::parse(self.done_reason.as_deref()),
            usage,
        }
    }
}
