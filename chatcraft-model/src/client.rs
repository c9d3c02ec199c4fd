//! The model client: one provider, default options, a timeout.
//!
//! Built once at start-up and passed by reference to whatever drives a
//! conversation. It keeps no conversation state of its own; every call
//! carries the full list of turns.

use crate::error::{self, Error, Result};
use crate::provider::{CompletionRequest, FinishReason, LlmProvider, Turn, UsageTracker};
use std::sync::Mutex;
use std::time::Duration;

/// Per-call options. Unset fields fall back to the client's defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvokeOptions {
    pub model: Option<String>,
    pub num_ctx: Option<usize>,
    pub temperature: Option<f32>,
    /// Structured-output JSON schema
    pub schema: Option<serde_json::Value>,
}

impl InvokeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that only carry an output schema
    pub fn structured(schema: serde_json::Value) -> Self {
        Self {
            schema: Some(schema),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_num_ctx(mut self, num_ctx: usize) -> Self {
        self.num_ctx = Some(num_ctx);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Fill unset fields from `defaults`
    pub fn or(&self, defaults: &InvokeOptions) -> InvokeOptions {
        InvokeOptions {
            model: self.model.clone().or_else(|| defaults.model.clone()),
            num_ctx: self.num_ctx.or(defaults.num_ctx),
            temperature: self.temperature.or(defaults.temperature),
            schema: self.schema.clone().or_else(|| defaults.schema.clone()),
        }
    }
}

pub struct ModelClient<P> {
    provider: P,
    defaults: InvokeOptions,
    timeout: Option<Duration>,
    usage: Mutex<UsageTracker>,
}

impl<P: LlmProvider> ModelClient<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            defaults: InvokeOptions::default(),
            timeout: None,
            usage: Mutex::new(UsageTracker::new()),
        }
    }

    pub fn with_defaults(mut self, defaults: InvokeOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn defaults(&self) -> &InvokeOptions {
        &self.defaults
    }

    /// Snapshot of token usage so far
    pub fn usage(&self) -> UsageTracker {
        self.usage.lock().map(|u| u.clone()).unwrap_or_default()
    }

    /// Send `turns` to the model and return its reply as an assistant turn.
    ///
    /// Fails with `ModelTimeout` when the configured timeout expires, and with
    /// the provider's mapped error kind (`ModelUnavailable`, ...) otherwise.
    pub async fn invoke(&self, turns: &[Turn], options: &InvokeOptions) -> Result<Turn> {
        let options = options.or(&self.defaults);
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string());

        let mut request = CompletionRequest::new(turns.to_vec()).with_model(model.clone());
        request.num_ctx = options.num_ctx;
        request.temperature = options.temperature;
        request.format = options.schema;

        tracing::debug!(
            provider = self.provider.name(),
            model = %model,
            turns = turns.len(),
            structured = request.format.is_some(),
            "invoking model"
        );

        let call = self.provider.complete(request);
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| {
                    Error::model_timeout(limit)
                        .with_operation("client::invoke")
                        .with_context("model", model.clone())
                })?,
            None => call.await,
        };

        let response = outcome
            .map_err(|e| error::from_provider(e, self.provider.name(), &model).with_operation("client::invoke"))?;

        if let Ok(mut usage) = self.usage.lock() {
            usage.track(&response.usage);
        }
        if response.finish_reason == FinishReason::Length {
            tracing::warn!(
                model = %model,
                num_ctx = ?options.num_ctx,
                "reply stopped at the length limit and may be cut off"
            );
        }

        let content = response.content.ok_or_else(|| {
            Error::inference_failed("model returned no content")
                .with_operation("client::invoke")
                .with_context("model", model.clone())
        })?;

        Ok(Turn::assistant(content))
    }
}
