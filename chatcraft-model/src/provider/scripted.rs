//! Deterministic in-process provider
//!
//! Replies come from a closure over the incoming request or from a fixed
//! queue. Every request is recorded so tests can assert on what was sent.

use super::*;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

type Responder = dyn Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync;

pub struct ScriptedProvider {
    responder: Box<Responder>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    /// Reply with whatever `responder` computes from the request
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Reply with each outcome in turn; fails once the queue runs dry
    pub fn sequence(outcomes: Vec<Result<String, ProviderError>>) -> Self {
        let queue = Mutex::new(VecDeque::from(outcomes));
        Self::new(move |_| {
            queue
                .lock()
                .map_err(|_| ProviderError::Other("script lock poisoned".into()))?
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Other("script exhausted".into())))
        })
    }

    /// Reply with each string in turn
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::sequence(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    /// Always reply with the same text
    pub fn constant(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(move |_| Ok(reply.clone()))
    }

    /// Sleep before every reply (for timeout tests)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request seen so far, oldest first
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let content = (self.responder)(&request)?;
        Ok(CompletionResponse {
            content: Some(content),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequence_then_exhausted() {
        let provider = ScriptedProvider::replies(["one", "two"]);

        let request = CompletionRequest::new(vec![Turn::user("a")]);

        let first = provider.complete(request.clone()).await.unwrap();
        let second = provider.complete(request.clone()).await.unwrap();
        assert_eq!(first.content.as_deref(), Some("one"));
        assert_eq!(second.content.as_deref(), Some("two"));
        assert!(matches!(provider.complete(request).await, Err(ProviderError::Other(_))));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_responder_sees_request() {
        let provider = ScriptedProvider::new(|req| {
            Ok(format!("{} turns", req.messages.len()))
        });

        let reply = provider
            .complete(CompletionRequest::new(vec![Turn::system("s"), Turn::user("u")]))
            .await
            .unwrap();

        assert_eq!(reply.content.as_deref(), Some("2 turns"));
        assert_eq!(reply.finish_reason, FinishReason::Stop);
        assert_eq!(provider.requests()[0].messages[1], Turn::user("u"));
    }
}
