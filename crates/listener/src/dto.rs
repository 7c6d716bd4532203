//! Request and response bodies.

use pipeline::{
    ComplianceReport, Constraints, CostBudget, ExecutionId, ForgeError, IdeaContext,
    PipelineResult, ProgressSnapshot, QualityScore, Requirements,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// `POST /pipeline` body.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub one_liner: Option<String>,
    pub idea_text: String,
    /// Lets the caller poll or cancel the run while the request is open.
    #[serde(default)]
    pub execution_id: Option<ExecutionId>,
    #[serde(default)]
    pub options: SubmitOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitOptions {
    pub industry: Option<String>,
    pub target_market: Option<String>,
    pub budget: Option<String>,
    pub timeline: Option<String>,
    pub requirements: Option<Requirements>,
    pub constraints: Option<ConstraintOverrides>,
}

/// Per-request limits. Absent fields take the server defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ConstraintOverrides {
    pub max_cost: Option<f64>,
    pub max_duration_secs: Option<f64>,
    pub quality_threshold: Option<f64>,
}

impl ConstraintOverrides {
    fn apply(self, defaults: Constraints) -> Result<Constraints, ForgeError> {
        let invalid = |field: &str, message: &str| ForgeError::InvalidInput {
            field: format!("options.constraints.{field}"),
            message: message.to_string(),
        };
        let mut out = defaults;
        if let Some(cost) = self.max_cost {
            out.max_cost = CostBudget::new(cost).ok_or_else(|| invalid("max_cost", "must be a positive amount"))?;
        }
        if let Some(secs) = self.max_duration_secs {
            out.max_duration = Duration::try_from_secs_f64(secs)
                .ok()
                .filter(|d| !d.is_zero())
                .ok_or_else(|| invalid("max_duration_secs", "must be a positive number of seconds"))?;
        }
        if let Some(threshold) = self.quality_threshold {
            out.quality_threshold = QualityScore::new(threshold)
                .ok_or_else(|| invalid("quality_threshold", "must be between 0 and 1"))?;
        }
        Ok(out)
    }
}

impl SubmitRequest {
    /// Builds the execution input, filling unset limits from `defaults`.
    pub fn into_context(self, defaults: Constraints) -> Result<(Option<ExecutionId>, IdeaContext), ForgeError> {
        let options = self.options;
        let constraints = options.constraints.unwrap_or_default().apply(defaults)?;
        let mut context = IdeaContext::new(self.idea_text).with_constraints(constraints);
        context.title = self.title;
        context.one_liner = self.one_liner;
        context.industry = options.industry;
        context.target_market = options.target_market;
        context.budget = options.budget;
        context.timeline = options.timeline;
        if let Some(requirements) = options.requirements {
            context.requirements = requirements;
        }
        Ok((self.execution_id, context))
    }
}

/// `?execution_id=` query for `GET` and `DELETE /pipeline`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionQuery {
    pub execution_id: Option<String>,
}

/// `GET /pipeline` body.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionView {
    Running { progress: ProgressSnapshot },
    Finished { result: Box<PipelineResult> },
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub execution_id: ExecutionId,
    pub status: &'static str,
}

/// `422` body when a dossier fails compliance.
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceRejection {
    pub error: &'static str,
    pub execution_id: ExecutionId,
    pub compliance: ComplianceReport,
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            hint: None,
            details: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
