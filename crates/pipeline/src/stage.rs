//! The nine pipeline stages and their fixed execution order.

use serde::{Deserialize, Serialize};

/// One of the nine analysis stages.
///
/// The declaration order is the execution order. Stage N's prompt depends on
/// the accumulated results of stages 1..N-1, so the order is never changed and
/// stages are never run in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Turns raw idea text into a titled, structured problem statement.
    Normalize,
    /// Market research grounded on aggregated market intel; produces the PRD.
    Research,
    /// Technical feasibility, timeline and resourcing.
    Feasibility,
    /// Desirability, viability, defensibility and timing scores.
    MarketMoat,
    /// Technical, market, financial and regulatory risks.
    RiskAssessment,
    /// User journeys, flows and wireframes.
    UxDesign,
    /// Tech stack and repository structure.
    CodeScaffold,
    /// Endpoint and model sketch.
    ApiDesign,
    /// Summary, roadmap and runbook.
    Export,
}

impl PipelineStage {
    /// All stages in execution order.
    pub const ALL: [PipelineStage; 9] = [
        PipelineStage::Normalize,
        PipelineStage::Research,
        PipelineStage::Feasibility,
        PipelineStage::MarketMoat,
        PipelineStage::RiskAssessment,
        PipelineStage::UxDesign,
        PipelineStage::CodeScaffold,
        PipelineStage::ApiDesign,
        PipelineStage::Export,
    ];

    /// Number of stages in a full run.
    pub const COUNT: usize = Self::ALL.len();

    /// Zero-based position in the execution order.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Wire identifier (`"market_moat"`, `"risk_assessment"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Normalize => "normalize",
            PipelineStage::Research => "research",
            PipelineStage::Feasibility => "feasibility",
            PipelineStage::MarketMoat => "market_moat",
            PipelineStage::RiskAssessment => "risk_assessment",
            PipelineStage::UxDesign => "ux_design",
            PipelineStage::CodeScaffold => "code_scaffold",
            PipelineStage::ApiDesign => "api_design",
            PipelineStage::Export => "export",
        }
    }

    /// Name of the agent that runs this stage, as reported in result metadata.
    pub fn agent_name(self) -> &'static str {
        match self {
            PipelineStage::Normalize => "normalizer",
            PipelineStage::Research => "market-researcher",
            PipelineStage::Feasibility => "feasibility-analyst",
            PipelineStage::MarketMoat => "moat-strategist",
            PipelineStage::RiskAssessment => "risk-analyst",
            PipelineStage::UxDesign => "ux-designer",
            PipelineStage::CodeScaffold => "code-architect",
            PipelineStage::ApiDesign => "api-designer",
            PipelineStage::Export => "exporter",
        }
    }

    /// Critical stages abort the whole pipeline when they fail.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            PipelineStage::Normalize | PipelineStage::Research | PipelineStage::Feasibility
        )
    }

    /// Top-level JSON fields the stage's model output must carry.
    ///
    /// Used both by result parsing (which defaults missing fields) and by
    /// [`crate::quality::assess`].
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            PipelineStage::Normalize => {
                &["title", "oneLiner", "problem", "audience", "valueProposition"]
            }
            PipelineStage::Research => {
                &["marketSize", "competitors", "opportunities", "challenges", "prd"]
            }
            PipelineStage::Feasibility => {
                &["score", "technologies", "timeline", "resources", "risks"]
            }
            PipelineStage::MarketMoat => &[
                "desirability",
                "viability",
                "defensibility",
                "timing",
                "moatStrategies",
            ],
            PipelineStage::RiskAssessment => &[
                "technicalRisks",
                "marketRisks",
                "financialRisks",
                "regulatoryRisks",
                "mitigation",
            ],
            PipelineStage::UxDesign => &[
                "userJourney",
                "keyFlows",
                "wireframes",
                "principles",
                "accessibility",
            ],
            PipelineStage::CodeScaffold => &[
                "techStack",
                "structure",
                "components",
                "database",
                "apiStructure",
            ],
            PipelineStage::ApiDesign => &[
                "endpoints",
                "models",
                "authentication",
                "security",
                "documentation",
            ],
            PipelineStage::Export => &["summary", "roadmap", "runbook", "nextSteps", "metrics"],
        }
    }

    /// The stage that runs after this one, if any.
    pub fn next(self) -> Option<PipelineStage> {
        Self::ALL.get(self.index() + 1).copied()
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown stage identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pipeline stage '{0}'")]
pub struct UnknownStage(pub String);

impl std::str::FromStr for PipelineStage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}
