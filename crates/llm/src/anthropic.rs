//! Anthropic Messages API provider.
//!
//! One `complete` call is one HTTP request. Failures are classified into
//! [`LlmError`] variants so the gateway can decide whether to retry; this
//! module never retries on its own.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    LlmError, LlmProvider, LlmRequest, LlmResponse, MessageRole, ModelName, TokenCount,
};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Default public endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Value of the `anthropic-version` header.
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Connection settings for [`AnthropicProvider`].
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    api_key: Secret<String>,
    pub base_url: String,
    /// Transport-level timeout for a single request.
    pub timeout: Duration,
}

impl AnthropicConfig {
    /// Creates a configuration for the public endpoint.
    pub fn new(api_key: Secret<String>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns `true` when a non-blank API key is present.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().trim().is_empty()
    }
}

/// The HTTP client could not be constructed.
#[derive(Debug, Error)]
#[error("could not build HTTP client: {0}")]
pub struct ProviderBuildError(#[from] reqwest::Error);

/// [`LlmProvider`] backed by Anthropic's Messages API.
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self, ProviderBuildError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    #[instrument(skip_all, fields(model = %request.model))]
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        if !self.config.has_credentials() {
            return Err(LlmError::NotConfigured);
        }

        let body = MessagesRequest::from_request(request);
        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "provider returned an error status");
            return Err(classify_status(status, retry_after, text));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        debug!(
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "completion received"
        );
        parsed.into_response(&request.model)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

fn classify_transport_error(err: &reqwest::Error, timeout: Duration) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout(timeout)
    } else if err.is_connect() {
        LlmError::Network(format!("connection failed: {err}"))
    } else {
        LlmError::Network(err.to_string())
    }
}

/// Maps a non-success status to the matching error.
fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: String) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited { retry_after },
        400 | 404 | 413 | 422 => LlmError::InvalidRequest(body),
        // 529 is Anthropic's "overloaded".
        500..=599 => LlmError::Unavailable(format!("status {status}: {body}")),
        _ => LlmError::Network(format!("unexpected status {status}: {body}")),
    }
}

/// Reads a `retry-after` header given in whole seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// ----- wire types -----

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl MessagesRequest {
    fn from_request(request: &LlmRequest) -> Self {
        // System text travels in its own field; the messages list only holds turns.
        let messages = request
            .messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    MessageRole::System => return None,
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                };
                Some(WireMessage {
                    role: role.to_string(),
                    content: m.content.clone(),
                })
            })
            .collect();
        Self {
            model: request.model.as_str().to_string(),
            messages,
            system: request.system_prompt(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    usage: WireUsage,
}

impl MessagesResponse {
    fn into_response(self, requested: &ModelName) -> Result<LlmResponse, LlmError> {
        let content: String = self
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text)
            .collect();
        let model = self
            .model
            .and_then(ModelName::new)
            .unwrap_or_else(|| requested.clone());
        Ok(LlmResponse {
            content,
            model,
            input_tokens: TokenCount::new(self.usage.input_tokens),
            output_tokens: TokenCount::new(self.usage.output_tokens),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::ChatMessage;
    use reqwest::header::HeaderValue;

    fn request() -> LlmRequest {
        LlmRequest {
            model: ModelName::new("claude-3-5-haiku-20241022").unwrap(),
            messages: vec![
                ChatMessage::system("You are a market analyst."),
                ChatMessage::user("Assess this idea."),
            ],
            max_tokens: 512,
            temperature: 0.3,
        }
    }

    #[test]
    fn system_prompt_is_lifted_out_of_messages() {
        let wire = MessagesRequest::from_request(&request());
        assert_eq!(wire.system.as_deref(), Some("You are a market analyst."));
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.messages[0].role, "user");
        assert_eq!(wire.model, "claude-3-5-haiku-20241022");
    }

    #[test]
    fn status_codes_map_to_retry_classes() {
        let auth = classify_status(StatusCode::UNAUTHORIZED, None, String::new());
        assert_eq!(auth, LlmError::AuthenticationFailed);
        assert!(!auth.retry_policy().is_retryable());

        let limited = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(7)),
            String::new(),
        );
        assert_eq!(
            limited,
            LlmError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );

        let overloaded = classify_status(StatusCode::from_u16(529).unwrap(), None, "busy".into());
        assert!(matches!(overloaded, LlmError::Unavailable(_)));
        assert!(overloaded.retry_policy().is_retryable());

        let bad = classify_status(StatusCode::BAD_REQUEST, None, "bad".into());
        assert_eq!(bad, LlmError::InvalidRequest("bad".into()));
    }

    #[test]
    fn retry_after_header_is_read_in_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn response_joins_text_blocks_and_keeps_usage() {
        let raw = r#"{
            "model": "claude-3-5-haiku-20241022",
            "content": [
                {"type": "text", "text": "{\"title\":"},
                {"type": "tool_use"},
                {"type": "text", "text": "\"X\"}"}
            ],
            "usage": {"input_tokens": 120, "output_tokens": 40}
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        let response = parsed.into_response(&request().model).unwrap();
        assert_eq!(response.content, "{\"title\":\"X\"}");
        assert_eq!(response.input_tokens.as_u64(), 120);
        assert_eq!(response.output_tokens.as_u64(), 40);
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let provider =
            AnthropicProvider::new(AnthropicConfig::new(Secret::new(String::new()))).unwrap();
        let err = provider.complete(&request()).await.unwrap_err();
        assert_eq!(err, LlmError::NotConfigured);
    }
}
