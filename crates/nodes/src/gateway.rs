//! The LLM gateway ("agent call service").
//!
//! Every model call made by a stage agent goes through [`AgentCallService`]:
//!
//! 1. cache lookup (skipped when the caller bypasses the cache);
//! 2. provider call under a per-call timeout;
//! 3. retry with exponential back-off on retryable failures;
//! 4. pricing and cost accounting for every successful call.
//!
//! Exhausted or non-retryable failures are returned to the agent, which falls
//! back to deterministic content.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pipeline::{ChatMessage, LlmError, LlmProvider, LlmRequest, ModelName, TokenCost, TokenCount};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheConfig, CacheKey, ResponseCache};
use crate::costs::{CostSummary, CostTracker};
use crate::pricing::ModelPricing;

/// Per-call settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOptions {
    pub model: ModelName,
    pub max_tokens: u32,
    pub temperature: f32,
    /// When `false` the cache is neither read nor written.
    pub use_cache: bool,
    /// Extra attempts after the first on retryable failures.
    pub retries: u32,
    pub timeout: Duration,
}

impl CallOptions {
    pub fn new(model: ModelName) -> Self {
        Self {
            model,
            max_tokens: 2000,
            temperature: 0.7,
            use_cache: true,
            retries: 3,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Token usage and cost of one gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: TokenCount,
    pub output_tokens: TokenCount,
    /// Zero for cache hits.
    pub cost: TokenCost,
}

/// Reply returned to a stage agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub content: String,
    pub usage: Usage,
    pub cached: bool,
    pub model: ModelName,
    pub response_time: Duration,
}

/// Exponential back-off schedule: `base × 2^attempt`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (zero-based). A provider hint is
    /// honoured as a lower bound.
    pub fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let scheduled = self.base.saturating_mul(factor).min(self.cap);
        hint.map_or(scheduled, |h| scheduled.max(h))
    }
}

/// A gateway call that could not be completed.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("LLM call failed after {attempts} attempt(s): {source}")]
pub struct GatewayError {
    pub attempts: u32,
    #[source]
    pub source: LlmError,
}

/// Cached, retrying, cost-tracking front for an [`LlmProvider`].
pub struct AgentCallService {
    provider: Arc<dyn LlmProvider>,
    cache: ResponseCache,
    costs: Arc<CostTracker>,
    backoff: Backoff,
}

impl std::fmt::Debug for AgentCallService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCallService")
            .field("provider", &self.provider.name())
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl AgentCallService {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            cache: ResponseCache::new(CacheConfig::default()),
            costs: Arc::new(CostTracker::default()),
            backoff: Backoff::default(),
        }
    }

    pub fn with_cache(mut self, config: CacheConfig) -> Self {
        self.cache = ResponseCache::new(config);
        self
    }

    pub fn with_cost_tracker(mut self, costs: Arc<CostTracker>) -> Self {
        self.costs = costs;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn costs(&self) -> &Arc<CostTracker> {
        &self.costs
    }

    pub async fn cost_summary(&self) -> CostSummary {
        self.costs.summary().await
    }

    /// Sends `messages` to the provider according to `options`.
    #[instrument(skip_all, fields(model = %options.model, use_cache = options.use_cache))]
    pub async fn send_message(
        &self,
        messages: Vec<ChatMessage>,
        options: &CallOptions,
    ) -> Result<AgentReply, GatewayError> {
        let started = Instant::now();
        let request = LlmRequest {
            model: options.model.clone(),
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };
        let key = CacheKey::for_request(&request);

        if options.use_cache {
            if let Some(hit) = self.cache.get(&key).await {
                debug!(key = key.as_str(), "cache hit");
                self.costs.record_cache_hit().await;
                return Ok(AgentReply {
                    content: hit.content,
                    usage: Usage {
                        input_tokens: hit.input_tokens,
                        output_tokens: hit.output_tokens,
                        cost: TokenCost::zero(),
                    },
                    cached: true,
                    model: hit.model,
                    response_time: started.elapsed(),
                });
            }
        }

        let mut attempt = 0u32;
        let response = loop {
            let outcome = match tokio::time::timeout(options.timeout, self.provider.complete(&request)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(options.timeout)),
            };
            match outcome {
                Ok(response) => break response,
                Err(error) => {
                    let policy = error.retry_policy();
                    if !policy.is_retryable() || attempt >= options.retries {
                        warn!(attempts = attempt + 1, %error, "LLM call failed");
                        return Err(GatewayError {
                            attempts: attempt + 1,
                            source: error,
                        });
                    }
                    let hint = match policy {
                        pipeline::RetryPolicy::Retryable { after } => after,
                        pipeline::RetryPolicy::NonRetryable => None,
                    };
                    let delay = self.backoff.delay(attempt, hint);
                    warn!(attempt = attempt + 1, ?delay, %error, "retrying LLM call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        let cost = ModelPricing::for_model(&response.model)
            .cost(response.input_tokens, response.output_tokens);
        self.costs
            .record_call(
                &response.model,
                response.input_tokens,
                response.output_tokens,
                cost,
            )
            .await;
        if options.use_cache {
            self.cache.insert(key, response.clone()).await;
        }

        Ok(AgentReply {
            content: response.content,
            usage: Usage {
                input_tokens: response.input_tokens,
                output_tokens: response.output_tokens,
                cost,
            },
            cached: false,
            model: response.model,
            response_time: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::ScriptedProvider;

    fn options() -> CallOptions {
        CallOptions::new(ModelName::new("claude-3-5-haiku-20241022").unwrap())
            .retries(2)
            .timeout(Duration::from_millis(200))
    }

    fn fast(provider: ScriptedProvider) -> AgentCallService {
        AgentCallService::new(Arc::new(provider)).with_backoff(Backoff {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(5),
        })
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::system("role"), ChatMessage::user("idea")]
    }

    #[test]
    fn backoff_doubles_up_to_the_cap_and_respects_hints() {
        let b = Backoff {
            base: Duration::from_millis(100),
            cap: Duration::from_millis(500),
        };
        assert_eq!(b.delay(0, None), Duration::from_millis(100));
        assert_eq!(b.delay(2, None), Duration::from_millis(400));
        assert_eq!(b.delay(5, None), Duration::from_millis(500));
        assert_eq!(
            b.delay(0, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
    }

    #[tokio::test]
    async fn identical_calls_are_served_from_cache_at_no_cost() {
        let provider = ScriptedProvider::always("{\"ok\": true}").with_usage(1000, 1000);
        let gateway = fast(provider.clone());

        let first = gateway.send_message(messages(), &options()).await.unwrap();
        let second = gateway.send_message(messages(), &options()).await.unwrap();

        assert!(!first.cached);
        assert!(first.usage.cost.as_f64() > 0.0);
        assert!(second.cached);
        assert_eq!(second.usage.cost, TokenCost::zero());
        assert_eq!(second.content, first.content);
        assert_eq!(provider.call_count(), 1);

        let summary = gateway.cost_summary().await;
        assert_eq!(summary.requests, 2);
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(summary.total, first.usage.cost);
    }

    #[tokio::test]
    async fn bypassing_the_cache_calls_the_provider_again() {
        let provider = ScriptedProvider::always("{}");
        let gateway = fast(provider.clone());
        gateway.send_message(messages(), &options()).await.unwrap();
        let fresh = gateway
            .send_message(messages(), &options().use_cache(false))
            .await
            .unwrap();
        assert!(!fresh.cached);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let provider = ScriptedProvider::new()
            .with_error(LlmError::Unavailable("overloaded".into()))
            .with_error(LlmError::RateLimited { retry_after: None })
            .with_response("done");
        let gateway = fast(provider.clone());

        let reply = gateway.send_message(messages(), &options()).await.unwrap();
        assert_eq!(reply.content, "done");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let provider = ScriptedProvider::always_failing(LlmError::Network("reset".into()));
        let gateway = fast(provider.clone());

        let err = gateway.send_message(messages(), &options()).await.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(provider.call_count(), 3);
        assert_eq!(gateway.cost_summary().await.requests, 0);
    }

    #[tokio::test]
    async fn authentication_failures_are_not_retried() {
        let provider = ScriptedProvider::always_failing(LlmError::AuthenticationFailed);
        let gateway = fast(provider.clone());

        let err = gateway.send_message(messages(), &options()).await.unwrap_err();
        assert_eq!(err.source, LlmError::AuthenticationFailed);
        assert_eq!(err.attempts, 1);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let provider = ScriptedProvider::always("late").with_delay(Duration::from_millis(100));
        let gateway = fast(provider);

        let err = gateway
            .send_message(
                messages(),
                &options().retries(0).timeout(Duration::from_millis(10)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.source, LlmError::Timeout(Duration::from_millis(10)));
    }
}
