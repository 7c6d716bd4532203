//! Post-run review ports.
//!
//! Compliance and evaluation run after the conductor has produced a dossier.
//! They are outside the stage loop; their reports are attached to the result
//! metadata, and a `fail` compliance verdict lets the caller withhold the
//! dossier.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Dossier, IdeaContext, QualityScore};

/// Overall compliance outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceVerdict {
    Pass,
    /// Deliverable, but a human should look at the flagged issues.
    Review,
    Fail,
}

/// Severity of a single compliance issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Info,
    Warning,
    Blocking,
}

/// One itemised compliance finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceIssue {
    pub severity: IssueSeverity,
    /// Short category such as `"regulated_domain"` or `"missing_artifact"`.
    pub category: String,
    pub message: String,
}

impl ComplianceIssue {
    pub fn new(
        severity: IssueSeverity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
        }
    }
}

/// Result of a compliance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub verdict: ComplianceVerdict,
    pub issues: Vec<ComplianceIssue>,
}

impl ComplianceReport {
    /// Derives the verdict from the worst issue: any blocking issue fails,
    /// any warning needs review, otherwise pass.
    pub fn from_issues(issues: Vec<ComplianceIssue>) -> Self {
        let verdict = match issues.iter().map(|i| i.severity).max() {
            Some(IssueSeverity::Blocking) => ComplianceVerdict::Fail,
            Some(IssueSeverity::Warning) => ComplianceVerdict::Review,
            _ => ComplianceVerdict::Pass,
        };
        Self { verdict, issues }
    }

    pub fn is_fail(&self) -> bool {
        self.verdict == ComplianceVerdict::Fail
    }
}

/// One itemised evaluation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// Result of a dossier evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Share of checks passed.
    pub score: QualityScore,
    pub checks: Vec<EvaluationCheck>,
}

impl EvaluationReport {
    /// Scores `checks` as the fraction that passed (zero when empty).
    pub fn from_checks(checks: Vec<EvaluationCheck>) -> Self {
        let score = if checks.is_empty() {
            QualityScore::zero()
        } else {
            let passed = checks.iter().filter(|c| c.passed).count();
            QualityScore::saturating(passed as f64 / checks.len() as f64)
        };
        Self { score, checks }
    }
}

/// Checks a finished dossier for content that should not be delivered.
#[async_trait]
pub trait ComplianceChecker: Send + Sync {
    async fn check(&self, dossier: &Dossier, context: &IdeaContext) -> ComplianceReport;
}

/// Grades a finished dossier.
#[async_trait]
pub trait DossierEvaluator: Send + Sync {
    async fn evaluate(&self, dossier: &Dossier, context: &IdeaContext) -> EvaluationReport;
}
