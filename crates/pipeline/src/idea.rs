//! Pipeline input: the idea and the caller's requirements and constraints.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CostBudget, QualityScore};

/// Default per-execution cost cap (USD) when the caller gives none.
pub const DEFAULT_MAX_COST: f64 = 10.0;

/// Default quality threshold below which a stage is re-run.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.7;

/// Default wall-clock budget for one execution.
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(300);

/// The input to one pipeline execution.
///
/// Immutable once execution starts: the conductor only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaContext {
    /// The raw, user-supplied idea text.
    pub idea_text: String,
    /// Optional caller-supplied title; normalize produces one when absent.
    #[serde(default)]
    pub title: Option<String>,
    /// Optional caller-supplied one-liner.
    #[serde(default)]
    pub one_liner: Option<String>,
    /// Industry hint (e.g. `"fintech"`).
    #[serde(default)]
    pub industry: Option<String>,
    /// Target market hint (e.g. `"SMB accountants in the EU"`).
    #[serde(default)]
    pub target_market: Option<String>,
    /// Budget hint for building the product (free text).
    #[serde(default)]
    pub budget: Option<String>,
    /// Timeline hint for building the product (free text).
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default)]
    pub constraints: Constraints,
}

impl IdeaContext {
    /// Creates a context with default requirements and constraints.
    pub fn new(idea_text: impl Into<String>) -> Self {
        Self {
            idea_text: idea_text.into(),
            title: None,
            one_liner: None,
            industry: None,
            target_market: None,
            budget: None,
            timeline: None,
            requirements: Requirements::default(),
            constraints: Constraints::default(),
        }
    }

    /// Sets the industry hint.
    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    /// Sets the target market hint.
    pub fn with_target_market(mut self, market: impl Into<String>) -> Self {
        self.target_market = Some(market.into());
        self
    }

    /// Replaces the constraints.
    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Replaces the requirements.
    pub fn with_requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = requirements;
        self
    }

    /// A prompt-friendly rendering of the optional hints, one per line.
    pub fn hints(&self) -> String {
        let mut lines = Vec::new();
        let fields = [
            ("Title", &self.title),
            ("One-liner", &self.one_liner),
            ("Industry", &self.industry),
            ("Target market", &self.target_market),
            ("Budget", &self.budget),
            ("Timeline", &self.timeline),
        ];
        for (label, value) in fields {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                lines.push(format!("{label}: {v}"));
            }
        }
        lines.push(format!("Analysis depth: {}", self.requirements.analysis_depth));
        lines.join("\n")
    }
}

/// Which artefacts the caller wants and how deep the analysis should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default = "yes")]
    pub wireframes: bool,
    #[serde(default = "yes")]
    pub code_scaffold: bool,
    #[serde(default = "yes")]
    pub runbook: bool,
    #[serde(default)]
    pub analysis_depth: AnalysisDepth,
}

fn yes() -> bool {
    true
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            wireframes: true,
            code_scaffold: true,
            runbook: true,
            analysis_depth: AnalysisDepth::default(),
        }
    }
}

/// How thorough each stage's analysis should be.
///
/// Scales the token budget each agent requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    Quick,
    #[default]
    Standard,
    Deep,
}

impl AnalysisDepth {
    /// Multiplier applied to an agent's base token budget.
    pub fn token_factor(self) -> f64 {
        match self {
            AnalysisDepth::Quick => 0.5,
            AnalysisDepth::Standard => 1.0,
            AnalysisDepth::Deep => 1.5,
        }
    }
}

impl std::fmt::Display for AnalysisDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AnalysisDepth::Quick => "quick",
            AnalysisDepth::Standard => "standard",
            AnalysisDepth::Deep => "deep",
        })
    }
}

/// Budget, time and quality limits for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Maximum accumulated cost (USD) before the conductor stops early.
    pub max_cost: CostBudget,
    /// Wall-clock budget for the whole execution.
    #[serde(with = "duration_secs")]
    pub max_duration: Duration,
    /// Stages scoring below this are retried while attempts remain.
    pub quality_threshold: QualityScore,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_cost: CostBudget::from_known_positive(DEFAULT_MAX_COST),
            max_duration: DEFAULT_MAX_DURATION,
            quality_threshold: QualityScore::saturating(DEFAULT_QUALITY_THRESHOLD),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Coarse industry bucket for an idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaCategory {
    Saas,
    Ecommerce,
    Marketplace,
    MobileApp,
    AiMl,
    Fintech,
    Healthtech,
    Edtech,
    Gaming,
    Other,
}

impl IdeaCategory {
    /// Human-readable label used in prompts and summaries.
    pub fn label(self) -> &'static str {
        match self {
            IdeaCategory::Saas => "SaaS",
            IdeaCategory::Ecommerce => "e-commerce",
            IdeaCategory::Marketplace => "marketplace",
            IdeaCategory::MobileApp => "mobile app",
            IdeaCategory::AiMl => "AI/ML",
            IdeaCategory::Fintech => "fintech",
            IdeaCategory::Healthtech => "healthtech",
            IdeaCategory::Edtech => "edtech",
            IdeaCategory::Gaming => "gaming",
            IdeaCategory::Other => "general",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hints_skip_blank_values() {
        let mut ctx = IdeaContext::new("An idea").with_industry("fintech");
        ctx.target_market = Some("   ".into());
        let hints = ctx.hints();
        assert!(hints.contains("Industry: fintech"));
        assert!(!hints.contains("Target market"));
        assert!(hints.ends_with("Analysis depth: standard"));
    }

    #[test]
    fn context_deserializes_with_defaults() {
        let ctx: IdeaContext =
            serde_json::from_str(r#"{"idea_text":"A marketplace for used lab gear"}"#).unwrap();
        assert!(ctx.requirements.runbook);
        assert_eq!(ctx.constraints.max_duration, DEFAULT_MAX_DURATION);
        assert_eq!(ctx.constraints.max_cost.as_f64(), DEFAULT_MAX_COST);
    }

    #[test]
    fn constraints_round_trip_duration_as_seconds() {
        let json = serde_json::to_value(Constraints::default()).unwrap();
        assert_eq!(json["max_duration"], 300.0);
        assert_eq!(json["quality_threshold"], 0.7);
    }
}
