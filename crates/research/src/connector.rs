//! The connector seam.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{IdeaCategory, IdeaContext, Reference};
use thiserror::Error;

/// Partial market signals from one connector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signals {
    pub summary: Option<String>,
    pub market_size: Option<String>,
    pub growth_rate: Option<String>,
    pub category: Option<IdeaCategory>,
    pub opportunities: Vec<String>,
    pub risks: Vec<String>,
    pub competitors: Vec<String>,
    pub references: Vec<Reference>,
    /// How much the connector trusts these signals, in `[0, 1]`.
    pub confidence: f64,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConnectorError {
    /// Nothing in the idea matched what the connector looks for.
    #[error("no signal for this idea")]
    NoSignal,

    #[error("connector timed out after {0:?}")]
    Timeout(Duration),

    #[error("connector unavailable: {0}")]
    Unavailable(String),
}

/// A source of market signals.
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn gather(&self, context: &IdeaContext) -> Result<Signals, ConnectorError>;
}

/// Lower-cased idea text plus the caller's industry and market hints.
pub(crate) fn haystack(context: &IdeaContext) -> String {
    let mut text = context.idea_text.to_lowercase();
    for hint in [&context.industry, &context.target_market, &context.title]
        .into_iter()
        .flatten()
    {
        text.push(' ');
        text.push_str(&hint.to_lowercase());
    }
    text
}
