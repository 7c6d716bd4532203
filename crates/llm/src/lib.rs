//! IdeaForge LLM provider infrastructure adapter.
//!
//! Implements the [`pipeline::LlmProvider`] trait for Anthropic's Messages
//! API, plus a scripted provider for tests and offline runs. Additional
//! providers are added as new modules in this crate without any changes to
//! the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing
//! and status-code classification live here. Retries, back-off, caching and
//! cost tracking do not: they belong to the gateway in `nodes`, which sees
//! only [`pipeline::LlmProvider`].

pub mod anthropic;
pub mod scripted;

pub use anthropic::{AnthropicConfig, AnthropicProvider, ProviderBuildError};
pub use scripted::ScriptedProvider;
