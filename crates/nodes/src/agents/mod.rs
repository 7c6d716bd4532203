//! Stage agents.
//!
//! One agent per [`PipelineStage`]. An agent builds its prompt from the idea
//! and the upstream results, calls the gateway, and turns whatever comes back
//! into a typed [`StageOutput`]:
//!
//! - usable JSON: fields are read leniently; missing ones take the agent's
//!   defaults;
//! - no JSON, or a failed call: the agent's deterministic fallback.
//!
//! Agents never fail. A [`StageError`] only arises from the conductor's own
//! stage timeout or from other [`StageRunner`] implementations.

mod analysis;
mod design;
mod prompts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    quality, ChatMessage, IdeaContext, MarketIntel, MarketIntelSource, ModelName, PipelineStage,
    QualityScore, StageOutput, StageResults, TokenCost,
};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::extract::{extract_json, FieldReader};
use crate::gateway::{AgentCallService, CallOptions};

pub use prompts::{derive_one_liner, derive_title};

/// Light model for the analysis stages.
pub const DEFAULT_ANALYSIS_MODEL: &str = "claude-3-5-haiku-20241022";

/// Strong model for code scaffold and API design.
pub const DEFAULT_DESIGN_MODEL: &str = "claude-sonnet-4-20250514";

/// What a stage sees when it runs.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub context: &'a IdeaContext,
    /// Results of the stages before this one.
    pub prior: &'a StageResults,
    /// Zero for the first attempt; quality retries count up from one.
    pub attempt: u32,
}

/// Result of one stage attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub output: StageOutput,
    pub quality: QualityScore,
    pub cost: TokenCost,
    pub model: Option<ModelName>,
    pub cached: bool,
    /// The whole output is the deterministic fallback.
    pub fallback: bool,
    /// Fields that took their default value.
    pub defaulted_fields: Vec<String>,
    /// Intel the stage was grounded on (research only).
    pub market_intel: Option<MarketIntel>,
}

/// A stage attempt that produced no output.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageError {
    #[error("stage timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}

/// Runs one attempt of one stage.
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run(
        &self,
        stage: PipelineStage,
        input: StageInput<'_>,
    ) -> Result<StageOutcome, StageError>;
}

/// Model choice per stage family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentModels {
    pub analysis: ModelName,
    pub design: ModelName,
}

impl AgentModels {
    pub fn new(analysis: ModelName, design: ModelName) -> Self {
        Self { analysis, design }
    }

    pub fn for_stage(&self, stage: PipelineStage) -> &ModelName {
        match stage {
            PipelineStage::CodeScaffold | PipelineStage::ApiDesign => &self.design,
            _ => &self.analysis,
        }
    }
}

/// Inputs available when building a prompt.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PromptInput<'a> {
    pub context: &'a IdeaContext,
    pub prior: &'a StageResults,
    pub intel: Option<&'a MarketIntel>,
}

/// Prompt template and parsing rules for one stage.
pub(crate) trait StageAgent: Send + Sync {
    fn stage(&self) -> PipelineStage;

    /// Role sentence opening the system instruction.
    fn role(&self) -> &'static str;

    /// Shape of the expected JSON, appended to the system instruction.
    fn schema(&self) -> &'static str;

    fn max_tokens(&self) -> u32;

    fn temperature(&self) -> f32 {
        0.4
    }

    fn user_prompt(&self, input: &PromptInput<'_>) -> String;

    /// Reads the model's JSON, taking defaults from `fallback` where needed.
    fn parse(&self, fields: &mut FieldReader<'_>, input: &PromptInput<'_>) -> StageOutput;

    /// Deterministic output used when the model gives nothing usable.
    fn fallback(&self, input: &PromptInput<'_>) -> StageOutput;

    fn system_prompt(&self) -> String {
        prompts::system_prompt(self.role(), self.stage(), self.schema())
    }
}

fn agent_for(stage: PipelineStage) -> &'static dyn StageAgent {
    match stage {
        PipelineStage::Normalize => &analysis::Normalizer,
        PipelineStage::Research => &analysis::MarketResearcher,
        PipelineStage::Feasibility => &analysis::FeasibilityAnalyst,
        PipelineStage::MarketMoat => &analysis::MoatStrategist,
        PipelineStage::RiskAssessment => &analysis::RiskAnalyst,
        PipelineStage::UxDesign => &design::UxDesigner,
        PipelineStage::CodeScaffold => &design::CodeArchitect,
        PipelineStage::ApiDesign => &design::ApiDesigner,
        PipelineStage::Export => &design::Exporter,
    }
}

/// The nine LLM-backed agents behind one [`StageRunner`].
pub struct AgentRoster {
    gateway: Arc<AgentCallService>,
    models: AgentModels,
    market: Option<Arc<dyn MarketIntelSource>>,
    call_timeout: Duration,
    call_retries: u32,
}

impl std::fmt::Debug for AgentRoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRoster")
            .field("models", &self.models)
            .field("has_market_source", &self.market.is_some())
            .field("call_timeout", &self.call_timeout)
            .field("call_retries", &self.call_retries)
            .finish()
    }
}

impl AgentRoster {
    pub fn new(gateway: Arc<AgentCallService>, models: AgentModels) -> Self {
        Self {
            gateway,
            models,
            market: None,
            call_timeout: Duration::from_secs(60),
            call_retries: 3,
        }
    }

    /// Source of market intel for the research stage.
    pub fn with_market_source(mut self, source: Arc<dyn MarketIntelSource>) -> Self {
        self.market = Some(source);
        self
    }

    pub fn with_call_limits(mut self, timeout: Duration, retries: u32) -> Self {
        self.call_timeout = timeout;
        self.call_retries = retries;
        self
    }

    pub fn models(&self) -> &AgentModels {
        &self.models
    }

    fn options_for(&self, agent: &dyn StageAgent, input: &StageInput<'_>) -> CallOptions {
        let depth = input.context.requirements.analysis_depth.token_factor();
        let max_tokens = (f64::from(agent.max_tokens()) * depth).round().max(256.0) as u32;
        CallOptions::new(self.models.for_stage(agent.stage()).clone())
            .max_tokens(max_tokens)
            .temperature(agent.temperature())
            // Quality retries must reach the model, not the cached attempt.
            .use_cache(input.attempt == 0)
            .retries(self.call_retries)
            .timeout(self.call_timeout)
    }
}

#[async_trait]
impl StageRunner for AgentRoster {
    #[instrument(skip_all, fields(stage = %stage, attempt = input.attempt))]
    async fn run(
        &self,
        stage: PipelineStage,
        input: StageInput<'_>,
    ) -> Result<StageOutcome, StageError> {
        let agent = agent_for(stage);

        let intel = match (&self.market, stage) {
            (Some(source), PipelineStage::Research) => Some(source.market_intel(input.context).await),
            _ => None,
        };
        let prompt_input = PromptInput {
            context: input.context,
            prior: input.prior,
            intel: intel.as_ref(),
        };

        let messages = vec![
            ChatMessage::system(agent.system_prompt()),
            ChatMessage::user(agent.user_prompt(&prompt_input)),
        ];
        let options = self.options_for(agent, &input);

        let outcome = match self.gateway.send_message(messages, &options).await {
            Ok(reply) => {
                let raw = extract_json(&reply.content);
                if raw.is_none() {
                    warn!(stage = %stage, "model reply contained no JSON object; using defaults");
                }
                let mut fields = FieldReader::new(raw.as_ref());
                let output = agent.parse(&mut fields, &prompt_input);
                let defaulted_fields = fields.into_defaulted();
                if !defaulted_fields.is_empty() {
                    debug!(stage = %stage, defaulted = ?defaulted_fields, "fields defaulted");
                }
                StageOutcome {
                    output,
                    quality: quality::assess(stage, raw.as_ref(), &defaulted_fields),
                    cost: reply.usage.cost,
                    model: Some(reply.model),
                    cached: reply.cached,
                    fallback: raw.is_none(),
                    defaulted_fields,
                    market_intel: intel.clone(),
                }
            }
            Err(error) => {
                warn!(stage = %stage, %error, "LLM call failed; using fallback content");
                StageOutcome {
                    output: agent.fallback(&prompt_input),
                    quality: QualityScore::zero(),
                    cost: TokenCost::zero(),
                    model: None,
                    cached: false,
                    fallback: true,
                    defaulted_fields: stage
                        .required_fields()
                        .iter()
                        .map(|f| (*f).to_string())
                        .collect(),
                    market_intel: intel.clone(),
                }
            }
        };
        Ok(outcome)
    }
}
