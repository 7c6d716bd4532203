//! Market intel port.
//!
//! The research stage grounds its prompt on a [`MarketIntel`] aggregate. The
//! `research` crate implements [`MarketIntelSource`] by merging several
//! connectors; tests and offline runs can supply their own source.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{IdeaCategory, IdeaContext};

/// A citation backing a market signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub title: String,
    pub url: String,
}

impl Reference {
    /// Creates a reference.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Aggregated market signals for one idea.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketIntel {
    pub summary: Option<String>,
    pub market_size: Option<String>,
    pub growth_rate: Option<String>,
    /// Industry bucket inferred from the idea when the caller gave none.
    pub category: Option<IdeaCategory>,
    pub opportunities: Vec<String>,
    pub risks: Vec<String>,
    pub competitors: Vec<String>,
    pub references: Vec<Reference>,
    /// Mean confidence of the contributing connectors, in `[0, 1]`.
    pub confidence: f64,
    /// Names of the connectors that contributed.
    pub sources: Vec<String>,
}

impl MarketIntel {
    /// Prompt-friendly rendering for the research stage.
    pub fn to_prompt_section(&self) -> String {
        let mut out = String::new();
        let scalars = [
            ("Summary", &self.summary),
            ("Market size estimate", &self.market_size),
            ("Growth rate", &self.growth_rate),
        ];
        for (label, value) in scalars {
            if let Some(v) = value {
                out.push_str(&format!("{label}: {v}\n"));
            }
        }
        if let Some(category) = self.category {
            out.push_str(&format!("Category: {}\n", category.label()));
        }
        let lists = [
            ("Known competitors", &self.competitors),
            ("Opportunities", &self.opportunities),
            ("Risks", &self.risks),
        ];
        for (label, items) in lists {
            if !items.is_empty() {
                out.push_str(&format!("{label}: {}\n", items.join("; ")));
            }
        }
        out.push_str(&format!("Signal confidence: {:.2}\n", self.confidence));
        out
    }
}

/// Port supplying market intel to the research stage.
#[async_trait]
pub trait MarketIntelSource: Send + Sync {
    /// Gathers intel for `context`. Never fails: sources degrade to an empty
    /// aggregate instead.
    async fn market_intel(&self, context: &IdeaContext) -> MarketIntel;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_section_lists_only_present_values() {
        let intel = MarketIntel {
            market_size: Some("$4B".into()),
            competitors: vec!["Acme".into(), "Globex".into()],
            confidence: 0.5,
            ..MarketIntel::default()
        };
        let text = intel.to_prompt_section();
        assert!(text.contains("Market size estimate: $4B"));
        assert!(text.contains("Known competitors: Acme; Globex"));
        assert!(!text.contains("Summary"));
        assert!(text.contains("Signal confidence: 0.50"));
    }
}
