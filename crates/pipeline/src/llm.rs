//! Language-model provider port.
//!
//! The `llm` crate implements [`LlmProvider`] for concrete vendors. The
//! gateway in `nodes` wraps a provider with caching, retries and cost
//! tracking; stage agents only ever talk to the gateway.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ModelName, RetryPolicy, TokenCount};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One message in a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    /// A system instruction.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// An assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A single completion request as seen by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: ModelName,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmRequest {
    /// Concatenated system instructions, if any.
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// Provider reply: generated text plus token usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: ModelName,
    pub input_tokens: TokenCount,
    pub output_tokens: TokenCount,
}

/// Errors raised by a provider call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LlmError {
    /// Provider asked us to slow down.
    #[error("rate limited by provider")]
    RateLimited {
        /// Provider-supplied minimum wait, if any.
        retry_after: Option<Duration>,
    },

    /// The call exceeded its timeout.
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Provider returned a 5xx or reported itself overloaded.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Credentials were rejected.
    #[error("authentication with the provider failed")]
    AuthenticationFailed,

    /// No credentials are configured.
    #[error("provider credentials are not configured")]
    NotConfigured,

    /// The provider rejected the request as malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider's reply could not be decoded.
    #[error("could not decode provider response: {0}")]
    Decode(String),
}

impl LlmError {
    /// Whether the gateway may re-issue the call.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            LlmError::RateLimited { retry_after } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            LlmError::Timeout(_)
            | LlmError::Network(_)
            | LlmError::Unavailable(_)
            | LlmError::Decode(_) => RetryPolicy::Retryable { after: None },
            LlmError::AuthenticationFailed
            | LlmError::NotConfigured
            | LlmError::InvalidRequest(_) => RetryPolicy::NonRetryable,
        }
    }
}

/// Port for a language-model vendor.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Sends one request and returns the generated text and usage.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Short provider name for logs (e.g. `"anthropic"`).
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_joins_system_messages_only() {
        let request = LlmRequest {
            model: ModelName::new("m").unwrap(),
            messages: vec![
                ChatMessage::system("role"),
                ChatMessage::user("question"),
                ChatMessage::system("format"),
            ],
            max_tokens: 10,
            temperature: 0.0,
        };
        assert_eq!(request.system_prompt().as_deref(), Some("role\n\nformat"));
    }

    #[test]
    fn auth_failures_are_not_retried() {
        assert!(!LlmError::AuthenticationFailed.retry_policy().is_retryable());
        assert!(!LlmError::NotConfigured.retry_policy().is_retryable());
        assert!(LlmError::Timeout(Duration::from_secs(1))
            .retry_policy()
            .is_retryable());
        assert_eq!(
            LlmError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            }
            .retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(3))
            }
        );
    }
}
