//! Keyword-based compliance checker and structural dossier evaluator.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    ComplianceChecker, ComplianceIssue, ComplianceReport, Dossier, DossierEvaluator,
    EvaluationCheck, EvaluationReport, IdeaContext, IssueSeverity, PipelineResult,
};
use tracing::{info, warn};

/// Subject matter a dossier must not be delivered for.
const PROHIBITED: &[(&str, &str)] = &[
    ("weapon", "weapons"),
    ("explosive", "weapons"),
    ("malware", "malicious software"),
    ("ransomware", "malicious software"),
    ("phishing", "fraud"),
    ("money laundering", "fraud"),
    ("counterfeit", "fraud"),
    ("human trafficking", "exploitation"),
];

/// Domains that need licensing or regulatory review.
const REGULATED: &[(&str, &str)] = &[
    ("medical", "healthcare"),
    ("patient", "healthcare"),
    ("diagnos", "healthcare"),
    ("prescription", "healthcare"),
    ("bank", "financial services"),
    ("lending", "financial services"),
    ("loan", "financial services"),
    ("insurance", "financial services"),
    ("crypto", "financial services"),
    ("gambling", "gambling"),
    ("betting", "gambling"),
    ("children", "minors"),
    ("kids", "minors"),
    ("biometric", "personal data"),
];

/// Flags prohibited subject matter (blocking), regulated domains (warning)
/// and missing artifacts (info).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCompliance;

impl HeuristicCompliance {
    fn scan(text: &str, table: &[(&'static str, &'static str)]) -> Vec<&'static str> {
        let lowered = text.to_lowercase();
        let mut hits: Vec<&'static str> = Vec::new();
        for &(needle, category) in table {
            if lowered.contains(needle) && !hits.contains(&category) {
                hits.push(category);
            }
        }
        hits
    }
}

#[async_trait]
impl ComplianceChecker for HeuristicCompliance {
    async fn check(&self, dossier: &Dossier, context: &IdeaContext) -> ComplianceReport {
        let corpus = format!(
            "{}\n{}\n{}\n{}",
            context.idea_text,
            dossier.title,
            dossier.one_liner,
            context.industry.as_deref().unwrap_or_default()
        );

        let mut issues: Vec<ComplianceIssue> = Self::scan(&corpus, PROHIBITED)
            .into_iter()
            .map(|c| {
                ComplianceIssue::new(
                    IssueSeverity::Blocking,
                    "prohibited",
                    format!("idea involves {c}"),
                )
            })
            .collect();
        issues.extend(Self::scan(&corpus, REGULATED).into_iter().map(|c| {
            ComplianceIssue::new(
                IssueSeverity::Warning,
                "regulated_domain",
                format!("{c} is regulated; review licensing and data handling"),
            )
        }));

        for (artifact, value) in [
            ("prd", &dossier.prd),
            ("runbook", &dossier.runbook),
            ("repo_tree", &dossier.repo_tree),
            ("api_spec", &dossier.api_spec),
        ] {
            if value.trim().is_empty() {
                issues.push(ComplianceIssue::new(
                    IssueSeverity::Info,
                    "missing_artifact",
                    format!("{artifact} is empty"),
                ));
            }
        }

        ComplianceReport::from_issues(issues)
    }
}

/// Grades a dossier on structural completeness.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEvaluator;

fn check(name: &str, passed: bool, detail: impl Into<String>) -> EvaluationCheck {
    EvaluationCheck {
        name: name.to_string(),
        passed,
        detail: detail.into(),
    }
}

#[async_trait]
impl DossierEvaluator for HeuristicEvaluator {
    async fn evaluate(&self, dossier: &Dossier, context: &IdeaContext) -> EvaluationReport {
        let prd_sections = dossier.prd.lines().filter(|l| l.starts_with('#')).count();
        let repo_paths = dossier.repo_tree.lines().filter(|l| !l.trim().is_empty()).count();
        let endpoints = dossier
            .api_spec
            .lines()
            .filter(|l| l.trim_start().starts_with("- "))
            .count();
        let completion = dossier.completion_percentage();

        let mut checks = vec![
            check(
                "title",
                !dossier.title.trim().is_empty() && dossier.title != "Untitled Startup Idea",
                dossier.title.clone(),
            ),
            check(
                "prd_structure",
                prd_sections >= 2,
                format!("{prd_sections} headed sections"),
            ),
            check(
                "runbook",
                !dossier.runbook.trim().is_empty(),
                format!("{} lines", dossier.runbook.lines().count()),
            ),
            check("repo_tree", repo_paths >= 3, format!("{repo_paths} paths")),
            check("api_endpoints", endpoints >= 1, format!("{endpoints} endpoints")),
            check(
                "completion",
                completion == 100,
                format!("{completion}% of artifacts present"),
            ),
            check(
                "score",
                (12..=100).contains(&dossier.scores.total),
                format!("total {}", dossier.scores.total),
            ),
        ];
        if context.requirements.wireframes {
            checks.push(check(
                "wireframes",
                !dossier.wireframes.is_empty(),
                format!("{} screens", dossier.wireframes.len()),
            ));
        }

        EvaluationReport::from_checks(checks)
    }
}

/// Runs compliance and evaluation over a finished result and attaches both
/// reports to its metadata.
#[derive(Clone)]
pub struct DossierReview {
    compliance: Arc<dyn ComplianceChecker>,
    evaluator: Arc<dyn DossierEvaluator>,
}

impl Default for DossierReview {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicCompliance), Arc::new(HeuristicEvaluator))
    }
}

impl std::fmt::Debug for DossierReview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DossierReview").finish_non_exhaustive()
    }
}

impl DossierReview {
    pub fn new(
        compliance: Arc<dyn ComplianceChecker>,
        evaluator: Arc<dyn DossierEvaluator>,
    ) -> Self {
        Self {
            compliance,
            evaluator,
        }
    }

    pub async fn review(&self, result: &mut PipelineResult, context: &IdeaContext) {
        let compliance = self.compliance.check(&result.dossier, context).await;
        let evaluation = self.evaluator.evaluate(&result.dossier, context).await;
        if compliance.is_fail() {
            warn!(execution_id = %result.execution_id, issues = compliance.issues.len(), "dossier failed compliance");
        }
        info!(
            execution_id = %result.execution_id,
            verdict = ?compliance.verdict,
            evaluation = evaluation.score.as_f64(),
            "dossier reviewed"
        );
        result.metadata.compliance = Some(compliance);
        result.metadata.evaluation = Some(evaluation);
    }
}
