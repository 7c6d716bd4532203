//! Scripted provider for tests and offline runs.
//!
//! Replies are taken from a queue first; once the queue is empty the optional
//! responder closure answers. With neither, calls fail as unavailable.
//!
//! ```ignore
//! let provider = ScriptedProvider::new()
//!     .with_error(LlmError::Timeout(Duration::from_secs(1)))
//!     .with_response(r#"{"title": "LabSwap"}"#);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{LlmError, LlmProvider, LlmRequest, LlmResponse, TokenCount};
use tokio::time::sleep;

type Responder = Arc<dyn Fn(&LlmRequest) -> Result<String, LlmError> + Send + Sync>;

/// Deterministic [`LlmProvider`].
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    queue: Arc<Mutex<VecDeque<Result<String, LlmError>>>>,
    responder: Option<Responder>,
    delay: Duration,
    usage: Option<(u64, u64)>,
    calls: Arc<Mutex<Vec<LlmRequest>>>,
}

impl std::fmt::Debug for ScriptedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedProvider")
            .field("queued", &lock(&self.queue).len())
            .field("has_responder", &self.responder.is_some())
            .field("delay", &self.delay)
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that answers every call with `content`.
    pub fn always(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::new().with_responder(move |_| Ok(content.clone()))
    }

    /// Provider whose every call fails with `error`.
    pub fn always_failing(error: LlmError) -> Self {
        Self::new().with_responder(move |_| Err(error.clone()))
    }

    /// Queues a successful reply.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        lock(&self.queue).push_back(Ok(content.into()));
        self
    }

    /// Queues a failure.
    pub fn with_error(self, error: LlmError) -> Self {
        lock(&self.queue).push_back(Err(error));
        self
    }

    /// Answers calls once the queue is drained.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&LlmRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Simulated latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fixed token usage reported for every reply. Without it usage is
    /// estimated at four characters per token.
    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = Some((input_tokens, output_tokens));
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<LlmRequest> {
        lock(&self.calls).clone()
    }

    fn next_reply(&self, request: &LlmRequest) -> Result<String, LlmError> {
        if let Some(reply) = lock(&self.queue).pop_front() {
            return reply;
        }
        match &self.responder {
            Some(responder) => responder(request),
            None => Err(LlmError::Unavailable("script exhausted".into())),
        }
    }
}

fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4).max(1)
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        lock(&self.calls).push(request.clone());
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let content = self.next_reply(request)?;
        let (input, output) = self.usage.unwrap_or_else(|| {
            let prompt: String = request.messages.iter().map(|m| m.content.as_str()).collect();
            (estimate_tokens(&prompt), estimate_tokens(&content))
        });
        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            input_tokens: TokenCount::new(input),
            output_tokens: TokenCount::new(output),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
