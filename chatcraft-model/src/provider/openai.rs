//! OpenAI-compatible provider implementation
//!
//! Works with OpenAI, Azure OpenAI, vLLM, Ollama's `/v1` endpoint, and other
//! OpenAI-compatible APIs. Native tool calling is not used: actions are parsed
//! from free text, so `tool` turns are sent as `user` turns.

use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.unwrap_or(120)))
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_URL)
            .trim_end_matches('/')
    }
}

impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let model = request.model.as_deref().unwrap_or(self.default_model()).to_string();
        let api_request = OpenAIRequest::build(&model, &request);

        let mut req = self.client
            .post(format!("{}/chat/completions", self.base_url()))
            .json(&api_request);

        if let Some(api_key) = &self.config.api_key {
            if !api_key.is_empty() {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
        }

        tracing::debug!(model = %model, turns = request.messages.len(), "openai chat request");

        let response = req.send().await.map_err(ProviderError::from_transport)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, text, &model));
        }

        let api_response: OpenAIResponse = response.json().await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let choice = api_response.choices.into_iter().next()
            .ok_or_else(|| ProviderError::Other("No choices in response".into()))?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }).unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content,
            finish_reason: FinishReason::parse(choice.finish_reason.as_deref()),
            usage,
        })
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

impl OpenAIRequest {
    fn build(model: &str, request: &CompletionRequest) -> Self {
        Self {
            model: model.to_string(),
            messages: request.messages.iter().map(OpenAIMessage::from).collect(),
            temperature: request.temperature,
            stream: false,
            response_format: request.format.as_ref().map(|schema| serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "reply",
                    "schema": schema,
                },
            })),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl From<&Turn> for OpenAIMessage {
    fn from(turn: &Turn) -> Self {
        let role = match turn.role {
            Role::Tool => Role::User,
            other => other,
        };
        Self {
            role: role.as_str().to_string(),
            content: Some(turn.content.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_turns_become_user_turns() {
        let request = CompletionRequest::new(vec![
            Turn::user("weather?"),
            Turn::tool("```tool_output\nfoggy\n```"),
        ]);
        let body = serde_json::to_value(OpenAIRequest::build("gpt-4o-mini", &request)).unwrap();

        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["stream"], false);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_schema_becomes_response_format() {
        let schema = serde_json::json!({"type": "object", "required": ["message_type"]});
        let request = CompletionRequest::new(vec![Turn::user("hi")]).with_format(schema.clone());
        let body = serde_json::to_value(OpenAIRequest::build("m", &request)).unwrap();

        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["schema"], schema);
    }

    #[test]
    fn test_response_decoding() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi"}, "finish_reason": "length"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
        }"#;

        let response: OpenAIResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("Hi"));
        assert_eq!(
            FinishReason::parse(response.choices[0].finish_reason.as_deref()),
            FinishReason::Length
        );
        assert_eq!(response.usage.map(|u| u.total_tokens), Some(6));
    }
}
