//! IdeaForge orchestration: the agent call service, the nine stage agents and
//! the conductor that runs them.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Sequences calls between the domain types in the
//! [`pipeline`] crate and the ports it defines (language model, market
//! intel, event sink). Provider and HTTP specifics live in other crates.
//!
//! | Module        | Contents                                                   |
//! |---------------|------------------------------------------------------------|
//! | [`gateway`]   | `AgentCallService`: cache, retry with backoff, cost record |
//! | [`cache`]     | TTL + LRU response cache keyed by request hash             |
//! | [`costs`]     | Cost tracker with daily/monthly alert thresholds           |
//! | [`pricing`]   | Per-model token prices                                     |
//! | [`extract`]   | Lenient JSON extraction and field coercion                 |
//! | [`agents`]    | Stage agents and the `StageRunner` port                    |
//! | [`conductor`] | The stage loop, budgets, retries, cancellation             |
//! | [`registry`]  | Running executions by id                                   |
//! | [`events`]    | Broadcast, tracing and fan-out event sinks                 |
//! | [`review`]    | Post-run compliance and evaluation                         |

pub mod agents;
pub mod cache;
pub mod conductor;
pub mod costs;
pub mod events;
pub mod extract;
pub mod gateway;
pub mod pricing;
pub mod registry;
pub mod review;

pub use agents::{
    AgentModels, AgentRoster, StageError, StageInput, StageOutcome, StageRunner,
    DEFAULT_ANALYSIS_MODEL, DEFAULT_DESIGN_MODEL,
};
pub use cache::{CacheConfig, ResponseCache};
pub use conductor::{Conductor, ConductorConfig, DEFAULT_QUALITY_RETRIES, DEFAULT_STAGE_TIMEOUT};
pub use costs::{AlertPeriod, BudgetAlert, BudgetThresholds, CostSummary, CostTracker};
pub use events::{BroadcastEventSink, ExecutionEvent, FanoutEventSink, TracingEventSink};
pub use gateway::{AgentCallService, AgentReply, Backoff, CallOptions, GatewayError};
pub use registry::ExecutionRegistry;
pub use review::{DossierReview, HeuristicCompliance, HeuristicEvaluator};
