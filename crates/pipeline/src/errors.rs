//! Top-level error and retry-policy types for the IdeaForge pipeline domain.
//!
//! [`ForgeError`] covers conditions that halt the pipeline itself or reject a
//! submission outright. Component-level errors (LLM call failures, research
//! connector failures, stage failures) are defined in their respective modules
//! and are recovered from wherever the pipeline allows it.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CostBudget, ExecutionId, PipelineStage, TokenCost};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by infrastructure error types to let the LLM gateway decide
/// whether to re-issue a call without surfacing the failure.
///
/// - `Retryable` errors: timeouts, transient rate-limit responses, 5xx.
/// - `NonRetryable` errors: authentication failure, malformed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `retry-after` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryPolicy::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Pipeline-level errors
// ---------------------------------------------------------------------------

/// Errors that halt the pipeline or reject a submission.
///
/// Everything else (transient call failures, unparseable model output,
/// low-quality stages, non-critical stage failures, budget exhaustion after
/// the critical stages) degrades to a usable, possibly partial, result and is
/// never surfaced through this type.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ForgeError {
    /// A critical stage (normalize, research, feasibility) failed after every
    /// recovery path was exhausted.
    #[error("Critical stage '{stage}' failed: {message}")]
    CriticalStageFailed {
        /// The stage that failed.
        stage: PipelineStage,
        /// Message of the triggering error.
        message: String,
    },

    /// The cost budget ran out before every critical stage completed.
    #[error("Cost budget exceeded before '{stage}': accumulated {accumulated}, limit {limit}")]
    BudgetExceeded {
        /// The first stage that could not be started.
        stage: PipelineStage,
        /// Total cost accumulated at the point of failure.
        accumulated: TokenCost,
        /// Configured budget that was exceeded.
        limit: CostBudget,
    },

    /// The wall-clock budget ran out before every critical stage completed.
    #[error("Time budget exceeded before '{stage}': {elapsed:?} elapsed, limit {limit:?}")]
    TimeBudgetExceeded {
        /// The first stage that could not be started.
        stage: PipelineStage,
        /// Wall-clock time spent so far.
        elapsed: Duration,
        /// Configured wall-clock budget.
        limit: Duration,
    },

    /// The execution was cancelled while it was running.
    #[error("Execution {execution_id} was cancelled")]
    Cancelled {
        /// The cancelled execution.
        execution_id: ExecutionId,
    },

    /// No running execution has this id.
    #[error("Unknown execution {execution_id}")]
    UnknownExecution {
        /// The id that was looked up.
        execution_id: ExecutionId,
    },

    /// Submitted text contains content structured as a directive to the models.
    ///
    /// The submission is rejected; it is **not** retried.
    #[error("Injection detected in '{source_document}': {offending_text}")]
    InjectionDetected {
        /// Label identifying the offending input field.
        source_document: String,
        /// The specific text that triggered detection.
        offending_text: String,
    },

    /// A submission field failed validation.
    #[error("Invalid {field}: {message}")]
    InvalidInput {
        /// Name of the offending field.
        field: String,
        /// Description of the violated constraint.
        message: String,
    },

    /// The runtime configuration is invalid.
    ///
    /// Produced at load time; the pipeline never starts with an invalid config.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },
}

impl ForgeError {
    /// Returns `true` for errors caused by the submitted input rather than by
    /// the pipeline.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ForgeError::InvalidInput { .. } | ForgeError::InjectionDetected { .. }
        )
    }
}
