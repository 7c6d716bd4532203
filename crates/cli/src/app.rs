//! Composition root: turns an [`AppConfig`] into running components.

use std::sync::Arc;

use anyhow::Context;
use listener::AppState;
use llm::{AnthropicConfig, AnthropicProvider};
use nodes::{
    AgentCallService, AgentModels, AgentRoster, BudgetAlert, Conductor, ConductorConfig,
    CostTracker, DossierReview, FanoutEventSink, TracingEventSink,
};
use pipeline::Constraints;
use research::ResearchService;
use secrecy::Secret;
use tracing::{info, warn};

use crate::config::AppConfig;

pub struct Components {
    pub conductor: Arc<Conductor>,
    pub gateway: Arc<AgentCallService>,
    pub review: DossierReview,
    pub defaults: Constraints,
    pub credentials_configured: bool,
}

impl Components {
    pub fn build(config: &AppConfig) -> anyhow::Result<Self> {
        let credentials_configured = config.llm.has_api_key();
        if !credentials_configured {
            warn!("no Anthropic API key configured; pipeline requests will be refused");
        }

        // Without a key the provider reports NotConfigured on every call.
        let api_key = config
            .llm
            .anthropic_api_key
            .clone()
            .unwrap_or_else(|| Secret::new(String::new()));
        let mut provider_config = AnthropicConfig::new(api_key).with_timeout(config.llm.timeout());
        if let Some(url) = &config.llm.base_url {
            provider_config = provider_config.with_base_url(url.clone());
        }
        let provider = AnthropicProvider::new(provider_config).context("building the Anthropic client")?;

        let costs = CostTracker::new(config.budget.thresholds()).with_alert_callback(Arc::new(
            |alert: &BudgetAlert| {
                warn!(
                    period = ?alert.period,
                    spent = %alert.spent,
                    threshold = %alert.threshold,
                    "LLM spend crossed its alert threshold"
                );
            },
        ));
        let gateway = Arc::new(
            AgentCallService::new(Arc::new(provider))
                .with_cache(config.cache.to_cache_config())
                .with_cost_tracker(Arc::new(costs))
                .with_backoff(config.llm.backoff()),
        );

        let (analysis, design) = config.models()?;
        let roster = AgentRoster::new(
            Arc::clone(&gateway),
            AgentModels::new(analysis.clone(), design.clone()),
        )
        .with_market_source(Arc::new(ResearchService::default()))
        .with_call_limits(config.llm.timeout(), config.llm.retries);

        let events = FanoutEventSink::new().with(Arc::new(TracingEventSink));
        let conductor = Conductor::new(
            Arc::new(roster),
            Arc::new(events),
            ConductorConfig {
                max_quality_retries: config.pipeline.quality_retries,
                stage_timeout: config.pipeline.stage_timeout(),
                analysis_model: Some(analysis),
                design_model: Some(design),
            },
        );

        let defaults = config.pipeline.constraints()?;
        info!(
            analysis_model = %config.llm.analysis_model,
            design_model = %config.llm.design_model,
            budget_limit = defaults.max_cost.as_f64(),
            "components ready"
        );

        Ok(Self {
            conductor: Arc::new(conductor),
            gateway,
            review: DossierReview::default(),
            defaults,
            credentials_configured,
        })
    }

    pub fn into_state(self) -> AppState {
        AppState::new(self.conductor, self.gateway)
            .with_defaults(self.defaults)
            .with_review(self.review)
            .with_credentials(self.credentials_configured)
    }
}
