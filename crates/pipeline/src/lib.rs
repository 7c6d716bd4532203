//! Core orchestration domain for IdeaForge.
//!
//! This crate contains every domain concept, newtype identifier, shared primitive
//! type, and cross-cutting error type used by the dossier pipeline. Infrastructure
//! crates implement the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ExecutionId`, `ModelName`, etc.) |
//! | [`types`] | Shared value types (`TokenCount`, `CostBudget`, `QualityScore`, etc.) |
//! | [`errors`] | Top-level error and retry-policy types |
//! | [`stage`] | The nine pipeline stages and their contracts |
//! | [`idea`] | Idea context, requirements and constraints |
//! | [`input`] | Idea text validation and injection screening |
//! | [`results`] | Typed stage results and their fallback defaults |
//! | [`quality`] | Completeness heuristic for stage results |
//! | [`execution`] | Per-run stage state |
//! | [`progress`] | Progress snapshots, lifecycle events, `EventSink` |
//! | [`dossier`] | Dossier, score card and pipeline result assembly |
//! | [`llm`] | Language-model provider port |
//! | [`research`] | Market intel port |
//! | [`review`] | Compliance and evaluation ports |

pub mod dossier;
pub mod errors;
pub mod execution;
pub mod idea;
pub mod identifiers;
pub mod input;
pub mod llm;
pub mod progress;
pub mod quality;
pub mod research;
pub mod results;
pub mod review;
pub mod stage;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use dossier::{
    assemble, render_api_spec, Dossier, GenerationConfig, PipelineMetadata, PipelineResult,
    PipelineStatus, ScoreCard, StageMetric,
};
pub use errors::{ForgeError, RetryPolicy};
pub use execution::{Execution, StageCompletion, StageExecution, StageStatus};
pub use idea::{
    AnalysisDepth, Constraints, IdeaCategory, IdeaContext, Requirements, DEFAULT_MAX_COST,
    DEFAULT_MAX_DURATION, DEFAULT_QUALITY_THRESHOLD,
};
pub use identifiers::{DossierId, ExecutionId, ModelName};
pub use input::{check_injection, validate_idea_text, MAX_IDEA_CHARS, MIN_IDEA_CHARS};
pub use llm::{ChatMessage, LlmError, LlmProvider, LlmRequest, LlmResponse, MessageRole};
pub use progress::{EventSink, NullEventSink, PipelineEvent, ProgressSnapshot};
pub use research::{MarketIntel, MarketIntelSource, Reference};
pub use results::{
    ApiDesign, ApiEndpoint, CodeScaffold, ExportBundle, FeasibilityAssessment, MarketMoat,
    Mitigation, NormalizedIdea, ResearchFindings, RiskAssessment, StageOutput, StageResults,
    Timeline, UxDesign, FEASIBILITY_RANGE, MARKET_AXIS_RANGE,
};
pub use review::{
    ComplianceChecker, ComplianceIssue, ComplianceReport, ComplianceVerdict, DossierEvaluator,
    EvaluationCheck, EvaluationReport, IssueSeverity,
};
pub use stage::{PipelineStage, UnknownStage};
pub use types::{CostBudget, QualityScore, Timestamp, TokenCost, TokenCount};
