//! The dossier and the final pipeline result.
//!
//! [`assemble`] turns whatever stage results an execution produced into a
//! [`PipelineResult`]. Missing stages degrade the fields they feed (a skipped
//! export leaves the runbook empty) rather than failing assembly.

use serde::{Deserialize, Serialize};

use crate::{
    ApiDesign, ComplianceReport, DossierId, EvaluationReport, Execution, ExecutionId,
    FeasibilityAssessment, MarketIntel, MarketMoat, ModelName, PipelineStage, QualityScore,
    StageResults, StageStatus, Timestamp, TokenCost,
};

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// Five-axis idea score, each axis 0–100.
///
/// `total` is the rounded arithmetic mean of the axes, so identical inputs
/// always yield the identical total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub desirability: u8,
    pub feasibility: u8,
    pub viability: u8,
    pub defensibility: u8,
    pub timing: u8,
    pub total: u8,
}

impl ScoreCard {
    /// Builds a score card, clamping each axis to 0–100 and deriving `total`.
    pub fn new(desirability: u8, feasibility: u8, viability: u8, defensibility: u8, timing: u8) -> Self {
        let axes = [desirability, feasibility, viability, defensibility, timing].map(|a| a.min(100));
        let sum: u32 = axes.iter().map(|a| u32::from(*a)).sum();
        let total = ((f64::from(sum) / axes.len() as f64).round()) as u8;
        Self {
            desirability: axes[0],
            feasibility: axes[1],
            viability: axes[2],
            defensibility: axes[3],
            timing: axes[4],
            total,
        }
    }

    /// Derives the card from the market & moat axes and the 1–10 feasibility
    /// score (scaled ×10).
    pub fn from_stages(moat: &MarketMoat, feasibility: &FeasibilityAssessment) -> Self {
        Self::new(
            moat.desirability,
            feasibility.score.saturating_mul(10),
            moat.viability,
            moat.defensibility,
            moat.timing,
        )
    }
}

// ---------------------------------------------------------------------------
// Dossier
// ---------------------------------------------------------------------------

/// The bundled artefact of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dossier {
    pub id: DossierId,
    pub created_at: Timestamp,
    pub idea_text: String,
    pub title: String,
    pub one_liner: String,
    pub scores: ScoreCard,
    /// Product requirements document (Markdown).
    pub prd: String,
    /// Agent runbook (YAML).
    pub runbook: String,
    /// Repository tree (plain text).
    pub repo_tree: String,
    /// API sketch (Markdown).
    pub api_spec: String,
    pub wireframes: Vec<String>,
}

impl Dossier {
    /// Share of the four text artefacts that are non-empty, 0–100.
    pub fn completion_percentage(&self) -> u8 {
        let artefacts = [&self.prd, &self.runbook, &self.repo_tree, &self.api_spec];
        let filled = artefacts.iter().filter(|a| !a.trim().is_empty()).count();
        (filled * 100 / artefacts.len()) as u8
    }
}

/// Renders the API design stage output as a Markdown sketch.
pub fn render_api_spec(api: &ApiDesign) -> String {
    let mut out = String::from("# API Sketch\n\n");
    out.push_str(&format!("Authentication: {}\n", api.authentication));
    out.push_str(&format!("Security: {}\n\n", api.security));
    out.push_str("## Endpoints\n");
    for endpoint in &api.endpoints {
        out.push_str(&format!("- {endpoint}\n"));
    }
    if !api.models.is_empty() {
        out.push_str("\n## Models\n");
        for model in &api.models {
            out.push_str(&format!("- {model}\n"));
        }
    }
    out.push_str(&format!("\n## Documentation\n{}\n", api.documentation));
    out
}

// ---------------------------------------------------------------------------
// Result envelope
// ---------------------------------------------------------------------------

/// Terminal state of a run that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Every stage was attempted.
    Completed,
    /// The run stopped early on its cost or time budget.
    Partial,
}

/// Per-stage metrics reported in the result metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMetric {
    pub stage: PipelineStage,
    pub agent: String,
    pub status: StageStatus,
    pub duration_ms: u64,
    pub cost: TokenCost,
    pub quality: Option<QualityScore>,
    pub retries: u32,
    pub model: Option<ModelName>,
    pub fallback: bool,
    pub cached: bool,
}

/// Settings the run was generated with, echoed for traceability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub budget_limit: f64,
    pub quality_threshold: QualityScore,
    pub max_quality_retries: u32,
    pub max_duration_secs: f64,
    pub analysis_model: Option<ModelName>,
    pub design_model: Option<ModelName>,
}

/// Run metadata accompanying the dossier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetadata {
    pub processing_time_ms: u64,
    pub total_cost: TokenCost,
    pub stages_completed: usize,
    /// Agents that were invoked, in execution order.
    pub agents_invoked: Vec<String>,
    pub stage_metrics: Vec<StageMetric>,
    pub market_intel: Option<MarketIntel>,
    pub compliance: Option<ComplianceReport>,
    pub evaluation: Option<EvaluationReport>,
    pub generation: GenerationConfig,
}

/// Final output of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub execution_id: ExecutionId,
    pub status: PipelineStatus,
    pub dossier: Dossier,
    pub metadata: PipelineMetadata,
    /// Mean quality of the completed stages.
    pub overall_quality: QualityScore,
}

/// Builds the result for `execution` from the results it accumulated.
pub fn assemble(
    execution: &Execution,
    results: &StageResults,
    market_intel: Option<MarketIntel>,
    generation: GenerationConfig,
    finished_at: Timestamp,
) -> PipelineResult {
    let context = &execution.context;
    let normalized = results.normalize.as_ref();

    let title = normalized
        .map(|n| n.title.clone())
        .or_else(|| context.title.clone())
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "Untitled Startup Idea".to_string());
    let one_liner = normalized
        .map(|n| n.one_liner.clone())
        .or_else(|| context.one_liner.clone())
        .unwrap_or_default();

    let scores = ScoreCard::from_stages(
        &results.market_moat.clone().unwrap_or_default(),
        &results.feasibility.clone().unwrap_or_default(),
    );

    let dossier = Dossier {
        id: DossierId::new_random(),
        created_at: finished_at,
        idea_text: context.idea_text.clone(),
        title,
        one_liner,
        scores,
        prd: results
            .research
            .as_ref()
            .map(|r| r.prd.clone())
            .unwrap_or_default(),
        runbook: results
            .export
            .as_ref()
            .map(|e| e.runbook.clone())
            .unwrap_or_default(),
        repo_tree: results
            .code_scaffold
            .as_ref()
            .map(|c| c.structure.clone())
            .unwrap_or_default(),
        api_spec: results
            .api_design
            .as_ref()
            .map(render_api_spec)
            .unwrap_or_default(),
        wireframes: results
            .ux_design
            .as_ref()
            .map(|u| u.wireframes.clone())
            .unwrap_or_default(),
    };

    let stage_metrics: Vec<StageMetric> = execution
        .stages
        .values()
        .map(|s| StageMetric {
            stage: s.stage,
            agent: s.stage.agent_name().to_string(),
            status: s.status,
            duration_ms: s.duration().map(|d| d.as_millis() as u64).unwrap_or(0),
            cost: s.cost,
            quality: s.quality,
            retries: s.retries,
            model: s.model.clone(),
            fallback: s.fallback,
            cached: s.cached,
        })
        .collect();

    let agents_invoked = execution
        .stages
        .values()
        .filter(|s| s.started_at.is_some())
        .map(|s| s.stage.agent_name().to_string())
        .collect();

    let all_attempted = execution
        .stages
        .values()
        .all(|s| s.status != StageStatus::Pending);

    PipelineResult {
        execution_id: execution.id,
        status: if all_attempted {
            PipelineStatus::Completed
        } else {
            PipelineStatus::Partial
        },
        dossier,
        metadata: PipelineMetadata {
            processing_time_ms: execution.elapsed(finished_at).as_millis() as u64,
            total_cost: execution.total_cost,
            stages_completed: execution.completed_count(),
            agents_invoked,
            stage_metrics,
            market_intel,
            compliance: None,
            evaluation: None,
            generation,
        },
        overall_quality: execution.overall_quality(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ExportBundle, IdeaContext, NormalizedIdea, StageCompletion, StageOutput,
    };

    fn generation() -> GenerationConfig {
        GenerationConfig {
            budget_limit: 10.0,
            quality_threshold: QualityScore::new(0.7).unwrap(),
            max_quality_retries: 2,
            max_duration_secs: 300.0,
            analysis_model: None,
            design_model: None,
        }
    }

    #[test]
    fn total_is_the_rounded_mean() {
        let card = ScoreCard::new(80, 70, 61, 40, 90);
        assert_eq!(card.total, 68);
        let same = ScoreCard::new(80, 70, 61, 40, 90);
        assert_eq!(card, same);
    }

    #[test]
    fn axes_are_clamped_to_one_hundred() {
        let card = ScoreCard::new(255, 100, 100, 100, 100);
        assert_eq!(card.desirability, 100);
        assert_eq!(card.total, 100);
    }

    #[test]
    fn feasibility_axis_is_scaled_by_ten() {
        let card = ScoreCard::from_stages(
            &MarketMoat::default(),
            &FeasibilityAssessment {
                score: 8,
                ..FeasibilityAssessment::default()
            },
        );
        assert_eq!(card.feasibility, 80);
    }

    #[test]
    fn missing_stages_leave_their_fields_empty() {
        let mut exec = Execution::new(
            ExecutionId::new_random(),
            IdeaContext::new("A marketplace for used lab equipment"),
        );
        let now = Timestamp::now();
        let normalized = NormalizedIdea {
            title: "LabSwap".into(),
            ..NormalizedIdea::default()
        };
        exec.start_stage(PipelineStage::Normalize, now);
        exec.complete_stage(
            PipelineStage::Normalize,
            StageCompletion {
                output: StageOutput::Normalize(normalized.clone()),
                quality: QualityScore::new(0.9).unwrap(),
                cost: TokenCost::zero(),
                retries: 0,
                model: None,
                fallback: false,
                cached: false,
            },
            now,
        );
        let mut results = StageResults::default();
        results.record(StageOutput::Normalize(normalized));

        let result = assemble(&exec, &results, None, generation(), now);
        assert_eq!(result.status, PipelineStatus::Partial);
        assert_eq!(result.dossier.title, "LabSwap");
        assert!(result.dossier.runbook.is_empty());
        assert!(result.dossier.prd.is_empty());
        assert_eq!(result.dossier.completion_percentage(), 0);
        assert_eq!(result.metadata.stages_completed, 1);
        assert_eq!(result.metadata.agents_invoked, vec!["normalizer".to_string()]);
        assert_eq!(result.metadata.stage_metrics.len(), 9);
        assert!((result.overall_quality.as_f64() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn export_feeds_the_runbook() {
        let exec = Execution::new(ExecutionId::new_random(), IdeaContext::new("idea text here"));
        let mut results = StageResults::default();
        results.record(StageOutput::Export(ExportBundle::default()));
        let result = assemble(&exec, &results, None, generation(), Timestamp::now());
        assert!(result.dossier.runbook.starts_with("version: 1"));
        assert_eq!(result.dossier.completion_percentage(), 25);
        assert_eq!(result.dossier.title, "Untitled Startup Idea");
    }

    #[test]
    fn api_spec_lists_endpoints() {
        let spec = render_api_spec(&ApiDesign::default());
        assert!(spec.contains("- GET /api/v1/health - Liveness probe"));
        assert!(spec.contains("## Models"));
    }
}
