//! # Chat Provider Interface
//!
//! A trait-based abstraction for communicating with chat model backends.
//!
//! ## Design
//! - `LlmProvider` trait defines the core interface (one request, one reply)
//! - Implementations for Ollama's native API and OpenAI-compatible APIs
//! - `ScriptedProvider` is a deterministic in-process fake for tests
//! - Structured output via a JSON schema passed with the request
//! - Usage tracking

pub mod ollama;
pub mod openai;
pub mod scripted;

pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use scripted::ScriptedProvider;

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Core Types
// ============================================================================

/// One role-tagged message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// An observation produced by running an action
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request parameters for a completion
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Turn>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    /// Context-length limit in tokens (Ollama `num_ctx`)
    pub num_ctx: Option<usize>,
    /// JSON schema the reply must conform to
    pub format: Option<serde_json::Value>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Turn>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_num_ctx(mut self, num_ctx: usize) -> Self {
        self.num_ctx = Some(num_ctx);
        self
    }

    pub fn with_format(mut self, schema: serde_json::Value) -> Self {
        self.format = Some(schema);
        self
    }
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Why the backend stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    pub(crate) fn parse(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Error type for provider operations
#[derive(Debug)]
pub enum ProviderError {
    /// Network/connection error
    Network(String),
    /// The HTTP request timed out
    Timeout,
    /// API returned an error
    Api { status: u16, message: String },
    /// Failed to parse response
    Parse(String),
    /// Rate limited
    RateLimited { retry_after: Option<u64> },
    /// Model not found
    ModelNotFound(String),
    /// Authentication failed
    AuthenticationFailed,
    /// Other error
    Other(String),
}

impl ProviderError {
    /// Classify a transport-level reqwest failure
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network(err.to_string())
        }
    }

    /// Classify a non-success HTTP status
    pub(crate) fn from_status(status: u16, message: String, model: &str) -> Self {
        match status {
            401 | 403 => ProviderError::AuthenticationFailed,
            404 => ProviderError::ModelNotFound(model.to_string()),
            429 => ProviderError::RateLimited { retry_after: None },
            _ => ProviderError::Api { status, message },
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "cannot reach backend: {}", e),
            Self::Timeout => f.write_str("backend request timed out"),
            Self::Api { status, message } => write!(f, "backend returned HTTP {}: {}", status, message),
            Self::Parse(e) => write!(f, "unreadable backend reply: {}", e),
            Self::RateLimited { retry_after: Some(secs) } => {
                write!(f, "rate limited, retry after {}s", secs)
            }
            Self::RateLimited { retry_after: None } => f.write_str("rate limited"),
            Self::ModelNotFound(m) => write!(f, "backend has no model '{}'", m),
            Self::AuthenticationFailed => f.write_str("backend rejected the credentials"),
            Self::Other(e) => f.write_str(e),
        }
    }
}

impl std::error::Error for ProviderError {}

/// The main chat provider trait
#[allow(async_fn_in_trait)]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "ollama", "openai")
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Send a completion request and get a full response
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;
}

/// A provider chosen at runtime from configuration
pub enum AnyProvider {
    Ollama(OllamaProvider),
    OpenAI(OpenAIProvider),
}

impl AnyProvider {
    pub fn from_config(config: ProviderConfig) -> Result<Self, ProviderError> {
        match config.provider_type {
            ProviderType::Ollama => Ok(AnyProvider::Ollama(OllamaProvider::new(config)?)),
            ProviderType::OpenAI => Ok(AnyProvider::OpenAI(OpenAIProvider::new(config)?)),
        }
    }
}

impl LlmProvider for AnyProvider {
    fn name(&self) -> &str {
        match self {
            AnyProvider::Ollama(p) => p.name(),
            AnyProvider::OpenAI(p) => p.name(),
        }
    }

    fn default_model(&self) -> &str {
        match self {
            AnyProvider::Ollama(p) => p.default_model(),
            AnyProvider::OpenAI(p) => p.default_model(),
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        match self {
            AnyProvider::Ollama(p) => p.complete(request).await,
            AnyProvider::OpenAI(p) => p.complete(request).await,
        }
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "gemma3:4b";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Configuration for creating providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Ollama,
    OpenAI,
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(ProviderType::Ollama),
            "openai" => Ok(ProviderType::OpenAI),
            other => Err(format!("unknown provider '{}' (expected ollama or openai)", other)),
        }
    }
}

impl ProviderConfig {
    /// Local Ollama daemon on its default port
    pub fn ollama(model: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::Ollama,
            api_key: None,
            base_url: Some(DEFAULT_OLLAMA_URL.into()),
            default_model: Some(model.into()),
            timeout_secs: Some(300),
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::OpenAI,
            api_key: Some(api_key.into()),
            base_url: Some(DEFAULT_OPENAI_URL.into()),
            default_model: Some(DEFAULT_OPENAI_MODEL.into()),
            timeout_secs: Some(120),
        }
    }

    /// Any OpenAI-compatible server without authentication (vLLM, llama.cpp, ...)
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::OpenAI,
            api_key: None,
            base_url: Some(base_url.into()),
            default_model: Some(model.into()),
            timeout_secs: Some(300),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

// ============================================================================
// Usage Tracking
// ============================================================================

/// Token totals for one client, summed over every successful call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTracker {
    pub calls: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, usage: &Usage) {
        self.calls += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
    }

    pub fn total_tokens(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

impl fmt::Display for UsageTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} model calls, {} prompt + {} completion tokens",
            self.calls, self.prompt_tokens, self.completion_tokens
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
