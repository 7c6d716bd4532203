//! Typed stage results.
//!
//! Each stage produces exactly one of the result types below. Field names
//! serialise in camelCase so they line up with the JSON contract each stage
//! prompt asks the model to fill (see [`PipelineStage::required_fields`]).
//!
//! Every type implements [`Default`] as its canonical fallback content: the
//! values a stage agent substitutes field-by-field when the model omits them,
//! and wholesale when the model cannot be reached at all.

use serde::{Deserialize, Serialize};

use crate::PipelineStage;

/// Inclusive range of the feasibility score.
pub const FEASIBILITY_RANGE: (u8, u8) = (1, 10);

/// Inclusive range of each market & moat axis.
pub const MARKET_AXIS_RANGE: (u8, u8) = (1, 100);

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

// ---------------------------------------------------------------------------
// normalize
// ---------------------------------------------------------------------------

/// Output of the normalize stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedIdea {
    pub title: String,
    pub one_liner: String,
    pub problem: String,
    pub audience: String,
    pub value_proposition: String,
}

impl Default for NormalizedIdea {
    fn default() -> Self {
        Self {
            title: "Untitled Startup Idea".into(),
            one_liner: "A new product that solves a focused customer problem.".into(),
            problem: "Target customers lack a simple, dependable way to solve this problem today."
                .into(),
            audience: "Early adopters who feel the problem most acutely.".into(),
            value_proposition: "Faster, cheaper and simpler than the status quo.".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// research
// ---------------------------------------------------------------------------

/// Output of the research stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchFindings {
    pub market_size: String,
    pub competitors: Vec<String>,
    pub opportunities: Vec<String>,
    pub challenges: Vec<String>,
    /// Product requirements document in Markdown.
    pub prd: String,
}

impl Default for ResearchFindings {
    fn default() -> Self {
        Self {
            market_size: "Not yet estimated".into(),
            competitors: strings(&["Incumbent manual processes", "Generic horizontal tools"]),
            opportunities: strings(&["Underserved niche with clear pain"]),
            challenges: strings(&["Customer acquisition cost", "Proving differentiation"]),
            prd: String::from(
                "# Product Requirements\n\n## Problem\nTo be refined.\n\n## Goals\n- Validate demand with a minimal product\n",
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// feasibility
// ---------------------------------------------------------------------------

/// Delivery milestones estimated by the feasibility stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub mvp: String,
    pub beta: String,
    pub launch: String,
}

impl Default for Timeline {
    fn default() -> Self {
        Self {
            mvp: "3 months".into(),
            beta: "6 months".into(),
            launch: "9 months".into(),
        }
    }
}

/// Output of the feasibility stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeasibilityAssessment {
    /// Overall feasibility, always within [`FEASIBILITY_RANGE`].
    pub score: u8,
    pub technologies: Vec<String>,
    pub timeline: Timeline,
    pub resources: String,
    pub risks: Vec<String>,
}

impl Default for FeasibilityAssessment {
    fn default() -> Self {
        Self {
            score: 5,
            technologies: strings(&["Web application", "Relational database", "Cloud hosting"]),
            timeline: Timeline::default(),
            resources: "A small founding team of 2-3 engineers and one product lead.".into(),
            risks: strings(&["Unvalidated technical assumptions"]),
        }
    }
}

// ---------------------------------------------------------------------------
// market_moat
// ---------------------------------------------------------------------------

/// Output of the market & moat stage.
///
/// All four axes are always within [`MARKET_AXIS_RANGE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketMoat {
    pub desirability: u8,
    pub viability: u8,
    pub defensibility: u8,
    pub timing: u8,
    pub moat_strategies: Vec<String>,
}

impl Default for MarketMoat {
    fn default() -> Self {
        Self {
            desirability: 50,
            viability: 50,
            defensibility: 50,
            timing: 50,
            moat_strategies: strings(&["Proprietary data from early customers", "Brand and community"]),
        }
    }
}

// ---------------------------------------------------------------------------
// risk_assessment
// ---------------------------------------------------------------------------

/// Mitigation plan bucketed by horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mitigation {
    pub immediate: Vec<String>,
    pub short_term: Vec<String>,
    pub long_term: Vec<String>,
}

impl Default for Mitigation {
    fn default() -> Self {
        Self {
            immediate: strings(&["Interview ten target customers"]),
            short_term: strings(&["Ship a narrow MVP and measure retention"]),
            long_term: strings(&["Diversify acquisition channels"]),
        }
    }
}

/// Output of the risk assessment stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub technical_risks: Vec<String>,
    pub market_risks: Vec<String>,
    pub financial_risks: Vec<String>,
    pub regulatory_risks: Vec<String>,
    pub mitigation: Mitigation,
}

impl Default for RiskAssessment {
    fn default() -> Self {
        Self {
            technical_risks: strings(&["Scalability of the core workflow"]),
            market_risks: strings(&["Slow adoption by the target audience"]),
            financial_risks: strings(&["Runway shorter than the sales cycle"]),
            regulatory_risks: strings(&["Data protection obligations"]),
            mitigation: Mitigation::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// ux_design
// ---------------------------------------------------------------------------

/// Output of the UX design stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UxDesign {
    pub user_journey: Vec<String>,
    pub key_flows: Vec<String>,
    pub wireframes: Vec<String>,
    pub principles: Vec<String>,
    pub accessibility: String,
}

impl Default for UxDesign {
    fn default() -> Self {
        Self {
            user_journey: strings(&["Discover", "Sign up", "First success", "Habit"]),
            key_flows: strings(&["Onboarding", "Core task", "Settings"]),
            wireframes: strings(&[
                "Landing page: headline, value proposition, call to action",
                "Dashboard: primary task list and status summary",
            ]),
            principles: strings(&["Clarity over cleverness", "Progressive disclosure"]),
            accessibility: "Meet WCAG 2.1 AA: keyboard navigation, contrast, screen reader labels."
                .into(),
        }
    }
}

// ---------------------------------------------------------------------------
// code_scaffold
// ---------------------------------------------------------------------------

/// Output of the code scaffold stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeScaffold {
    pub tech_stack: String,
    /// Repository tree as plain text.
    pub structure: String,
    pub components: Vec<String>,
    pub database: String,
    pub api_structure: String,
}

impl Default for CodeScaffold {
    fn default() -> Self {
        Self {
            tech_stack: "TypeScript web frontend, HTTP API backend, PostgreSQL".into(),
            structure: String::from(
                "app/\n├── frontend/\n│   └── src/\n├── backend/\n│   ├── src/\n│   └── tests/\n├── infra/\n└── README.md\n",
            ),
            components: strings(&["Web client", "API service", "Background worker"]),
            database: "PostgreSQL with migrations checked into the repository".into(),
            api_structure: "REST over JSON, versioned under /api/v1".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// api_design
// ---------------------------------------------------------------------------

/// One endpoint in the API sketch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub method: String,
    pub path: String,
    pub description: String,
}

impl ApiEndpoint {
    /// Creates an endpoint description.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            description: description.into(),
        }
    }
}

impl std::fmt::Display for ApiEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.description.is_empty() {
            write!(f, "{} {}", self.method, self.path)
        } else {
            write!(f, "{} {} - {}", self.method, self.path, self.description)
        }
    }
}

/// Output of the API design stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDesign {
    pub endpoints: Vec<ApiEndpoint>,
    pub models: Vec<String>,
    pub authentication: String,
    pub security: String,
    pub documentation: String,
}

impl Default for ApiDesign {
    fn default() -> Self {
        Self {
            endpoints: vec![
                ApiEndpoint::new("GET", "/api/v1/health", "Liveness probe"),
                ApiEndpoint::new("POST", "/api/v1/users", "Create an account"),
                ApiEndpoint::new("GET", "/api/v1/items", "List the user's items"),
                ApiEndpoint::new("POST", "/api/v1/items", "Create an item"),
            ],
            models: strings(&["User", "Item"]),
            authentication: "Bearer tokens issued after email sign-in".into(),
            security: "TLS everywhere, input validation, per-user rate limits".into(),
            documentation: "OpenAPI 3 document generated from the route definitions".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// export
// ---------------------------------------------------------------------------

/// Output of the export stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub summary: String,
    pub roadmap: Vec<String>,
    /// Agent runbook (YAML text).
    pub runbook: String,
    pub next_steps: Vec<String>,
    pub metrics: Vec<String>,
}

impl Default for ExportBundle {
    fn default() -> Self {
        Self {
            summary: "Validate demand, build a narrow MVP, then iterate with early customers."
                .into(),
            roadmap: strings(&[
                "Month 1: customer discovery",
                "Months 2-3: MVP build",
                "Months 4-6: beta and iteration",
            ]),
            runbook: String::from(
                "version: 1\nsteps:\n  - name: discovery\n    goal: interview target customers\n  - name: build\n    goal: ship the MVP\n  - name: launch\n    goal: acquire first paying customers\n",
            ),
            next_steps: strings(&["Write the customer interview script", "Set up the repository"]),
            metrics: strings(&["Weekly active users", "Activation rate", "Retention at 30 days"]),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage output envelope
// ---------------------------------------------------------------------------

/// The result of any one stage, tagged with the stage that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "content", rename_all = "snake_case")]
pub enum StageOutput {
    Normalize(NormalizedIdea),
    Research(ResearchFindings),
    Feasibility(FeasibilityAssessment),
    MarketMoat(MarketMoat),
    RiskAssessment(RiskAssessment),
    UxDesign(UxDesign),
    CodeScaffold(CodeScaffold),
    ApiDesign(ApiDesign),
    Export(ExportBundle),
}

impl StageOutput {
    /// The stage that produced this output.
    pub fn stage(&self) -> PipelineStage {
        match self {
            StageOutput::Normalize(_) => PipelineStage::Normalize,
            StageOutput::Research(_) => PipelineStage::Research,
            StageOutput::Feasibility(_) => PipelineStage::Feasibility,
            StageOutput::MarketMoat(_) => PipelineStage::MarketMoat,
            StageOutput::RiskAssessment(_) => PipelineStage::RiskAssessment,
            StageOutput::UxDesign(_) => PipelineStage::UxDesign,
            StageOutput::CodeScaffold(_) => PipelineStage::CodeScaffold,
            StageOutput::ApiDesign(_) => PipelineStage::ApiDesign,
            StageOutput::Export(_) => PipelineStage::Export,
        }
    }

    /// The canonical fallback output for `stage`.
    pub fn default_for(stage: PipelineStage) -> Self {
        match stage {
            PipelineStage::Normalize => StageOutput::Normalize(Default::default()),
            PipelineStage::Research => StageOutput::Research(Default::default()),
            PipelineStage::Feasibility => StageOutput::Feasibility(Default::default()),
            PipelineStage::MarketMoat => StageOutput::MarketMoat(Default::default()),
            PipelineStage::RiskAssessment => StageOutput::RiskAssessment(Default::default()),
            PipelineStage::UxDesign => StageOutput::UxDesign(Default::default()),
            PipelineStage::CodeScaffold => StageOutput::CodeScaffold(Default::default()),
            PipelineStage::ApiDesign => StageOutput::ApiDesign(Default::default()),
            PipelineStage::Export => StageOutput::Export(Default::default()),
        }
    }
}

/// Results accumulated so far in one execution.
///
/// Stage agents read the upstream entries; only the conductor inserts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageResults {
    pub normalize: Option<NormalizedIdea>,
    pub research: Option<ResearchFindings>,
    pub feasibility: Option<FeasibilityAssessment>,
    pub market_moat: Option<MarketMoat>,
    pub risk_assessment: Option<RiskAssessment>,
    pub ux_design: Option<UxDesign>,
    pub code_scaffold: Option<CodeScaffold>,
    pub api_design: Option<ApiDesign>,
    pub export: Option<ExportBundle>,
}

impl StageResults {
    /// Records `output` under its stage, replacing any earlier entry.
    pub fn record(&mut self, output: StageOutput) {
        match output {
            StageOutput::Normalize(v) => self.normalize = Some(v),
            StageOutput::Research(v) => self.research = Some(v),
            StageOutput::Feasibility(v) => self.feasibility = Some(v),
            StageOutput::MarketMoat(v) => self.market_moat = Some(v),
            StageOutput::RiskAssessment(v) => self.risk_assessment = Some(v),
            StageOutput::UxDesign(v) => self.ux_design = Some(v),
            StageOutput::CodeScaffold(v) => self.code_scaffold = Some(v),
            StageOutput::ApiDesign(v) => self.api_design = Some(v),
            StageOutput::Export(v) => self.export = Some(v),
        }
    }

    /// Returns `true` if `stage` has a recorded result.
    pub fn contains(&self, stage: PipelineStage) -> bool {
        match stage {
            PipelineStage::Normalize => self.normalize.is_some(),
            PipelineStage::Research => self.research.is_some(),
            PipelineStage::Feasibility => self.feasibility.is_some(),
            PipelineStage::MarketMoat => self.market_moat.is_some(),
            PipelineStage::RiskAssessment => self.risk_assessment.is_some(),
            PipelineStage::UxDesign => self.ux_design.is_some(),
            PipelineStage::CodeScaffold => self.code_scaffold.is_some(),
            PipelineStage::ApiDesign => self.api_design.is_some(),
            PipelineStage::Export => self.export.is_some(),
        }
    }
}
