//! # chatcraft model layer
//!
//! Everything needed to talk to a chat model backend.
//!
//! ## Core Concepts
//! - **Turn**: one role-tagged message (`system`, `user`, `assistant`, `tool`)
//! - **Provider**: trait-based backend communication (Ollama, OpenAI-compatible, scripted)
//! - **ModelClient**: a provider plus default options and a per-call timeout,
//!   constructed once and passed explicitly

pub mod client;
pub mod error;
pub mod provider;

pub use client::{InvokeOptions, ModelClient};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    AnyProvider, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
    OllamaProvider, OpenAIProvider, ProviderConfig, ProviderError, ProviderType, Role,
    ScriptedProvider, Turn, Usage, UsageTracker,
};
