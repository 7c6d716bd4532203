//! Per-run execution state.
//!
//! An [`Execution`] holds the run-state of every stage for one pipeline run.
//! It is created by the conductor when a run starts, mutated only by the
//! conductor as stages progress, and dropped when the run reaches a terminal
//! state.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    ExecutionId, IdeaContext, ModelName, PipelineStage, QualityScore, StageOutput, Timestamp,
    TokenCost,
};

/// Lifecycle of one stage within an execution.
///
/// `Pending → Running → {Completed | Failed | Skipped}`. A non-critical stage
/// that fails is marked `Failed` and then `Skipped` once the conductor
/// decides to continue without it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    /// Terminal states are never left again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StageStatus::Completed | StageStatus::Failed | StageStatus::Skipped
        )
    }
}

/// Run-state of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageExecution {
    pub stage: PipelineStage,
    pub status: StageStatus,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    /// Number of quality retries performed (0 when the first attempt was kept).
    pub retries: u32,
    /// Parsed result; immutable once recorded.
    pub content: Option<StageOutput>,
    pub quality: Option<QualityScore>,
    pub cost: TokenCost,
    /// Model that produced the kept attempt, if any call succeeded.
    pub model: Option<ModelName>,
    /// `true` when the kept attempt came from the deterministic fallback.
    pub fallback: bool,
    /// `true` when the kept attempt was served from the response cache.
    pub cached: bool,
    /// Message of the error that failed the stage.
    pub error: Option<String>,
}

impl StageExecution {
    /// A stage that has not started.
    pub fn pending(stage: PipelineStage) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
            retries: 0,
            content: None,
            quality: None,
            cost: TokenCost::zero(),
            model: None,
            fallback: false,
            cached: false,
            error: None,
        }
    }

    /// Time between start and finish, when both are known.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(start.duration_until(end)),
            _ => None,
        }
    }
}

/// Outcome of a completed stage, as recorded by [`Execution::complete_stage`].
#[derive(Debug, Clone, PartialEq)]
pub struct StageCompletion {
    pub output: StageOutput,
    pub quality: QualityScore,
    pub cost: TokenCost,
    pub retries: u32,
    pub model: Option<ModelName>,
    pub fallback: bool,
    pub cached: bool,
}

/// The in-memory record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub context: IdeaContext,
    pub stages: BTreeMap<PipelineStage, StageExecution>,
    pub total_cost: TokenCost,
    pub started_at: Timestamp,
}

impl Execution {
    /// A fresh execution with all nine stages pending.
    pub fn new(id: ExecutionId, context: IdeaContext) -> Self {
        let stages = PipelineStage::ALL
            .into_iter()
            .map(|stage| (stage, StageExecution::pending(stage)))
            .collect();
        Self {
            id,
            context,
            stages,
            total_cost: TokenCost::zero(),
            started_at: Timestamp::now(),
        }
    }

    /// Run-state of `stage`.
    pub fn stage(&self, stage: PipelineStage) -> &StageExecution {
        // Every stage is inserted by `new` and never removed.
        &self.stages[&stage]
    }

    fn stage_mut(&mut self, stage: PipelineStage) -> &mut StageExecution {
        self.stages
            .entry(stage)
            .or_insert_with(|| StageExecution::pending(stage))
    }

    /// Marks `stage` running.
    pub fn start_stage(&mut self, stage: PipelineStage, at: Timestamp) {
        let entry = self.stage_mut(stage);
        entry.status = StageStatus::Running;
        entry.started_at = Some(at);
    }

    /// Records a successful stage and adds its cost to the running total.
    pub fn complete_stage(&mut self, stage: PipelineStage, done: StageCompletion, at: Timestamp) {
        let cost = done.cost;
        let entry = self.stage_mut(stage);
        entry.status = StageStatus::Completed;
        entry.finished_at = Some(at);
        entry.content = Some(done.output);
        entry.quality = Some(done.quality);
        entry.cost = cost;
        entry.retries = done.retries;
        entry.model = done.model;
        entry.fallback = done.fallback;
        entry.cached = done.cached;
        self.total_cost += cost;
    }

    /// Records a failed stage. Any cost already spent on it still counts.
    pub fn fail_stage(
        &mut self,
        stage: PipelineStage,
        error: impl Into<String>,
        cost: TokenCost,
        at: Timestamp,
    ) {
        let entry = self.stage_mut(stage);
        entry.status = StageStatus::Failed;
        entry.finished_at = Some(at);
        entry.error = Some(error.into());
        entry.cost = cost;
        self.total_cost += cost;
    }

    /// Moves a failed stage to skipped.
    pub fn skip_stage(&mut self, stage: PipelineStage) {
        let entry = self.stage_mut(stage);
        if entry.status == StageStatus::Failed || entry.status == StageStatus::Pending {
            entry.status = StageStatus::Skipped;
        }
    }

    /// Stages in execution order with the given status.
    pub fn stages_with(&self, status: StageStatus) -> impl Iterator<Item = &StageExecution> {
        self.stages.values().filter(move |s| s.status == status)
    }

    /// Number of stages that reached `Completed`.
    pub fn completed_count(&self) -> usize {
        self.stages_with(StageStatus::Completed).count()
    }

    /// Returns `true` once every critical stage has completed.
    pub fn critical_stages_done(&self) -> bool {
        PipelineStage::ALL
            .into_iter()
            .filter(|s| s.is_critical())
            .all(|s| self.stage(s).status == StageStatus::Completed)
    }

    /// Mean quality over completed stages, or zero when none completed.
    pub fn overall_quality(&self) -> QualityScore {
        QualityScore::mean(
            self.stages_with(StageStatus::Completed)
                .filter_map(|s| s.quality),
        )
        .unwrap_or_else(QualityScore::zero)
    }

    /// Wall-clock time since the execution started.
    pub fn elapsed(&self, now: Timestamp) -> Duration {
        self.started_at.duration_until(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NormalizedIdea;

    fn completion(quality: f64, cost: f64) -> StageCompletion {
        StageCompletion {
            output: StageOutput::Normalize(NormalizedIdea::default()),
            quality: QualityScore::new(quality).unwrap(),
            cost: TokenCost::new(cost).unwrap(),
            retries: 0,
            model: None,
            fallback: false,
            cached: false,
        }
    }

    #[test]
    fn new_execution_has_nine_pending_stages() {
        let exec = Execution::new(ExecutionId::new_random(), IdeaContext::new("idea text here"));
        assert_eq!(exec.stages.len(), 9);
        assert!(exec
            .stages
            .values()
            .all(|s| s.status == StageStatus::Pending));
        let order: Vec<_> = exec.stages.keys().copied().collect();
        assert_eq!(order, PipelineStage::ALL.to_vec());
    }

    #[test]
    fn completion_accumulates_cost_and_quality() {
        let mut exec =
            Execution::new(ExecutionId::new_random(), IdeaContext::new("idea text here"));
        let now = Timestamp::now();
        exec.start_stage(PipelineStage::Normalize, now);
        exec.complete_stage(PipelineStage::Normalize, completion(0.8, 0.25), now);
        exec.start_stage(PipelineStage::Research, now);
        exec.complete_stage(PipelineStage::Research, completion(0.4, 0.5), now);

        assert_eq!(exec.completed_count(), 2);
        assert!((exec.total_cost.as_f64() - 0.75).abs() < 1e-9);
        assert!((exec.overall_quality().as_f64() - 0.6).abs() < 1e-9);
        assert!(!exec.critical_stages_done());
    }

    #[test]
    fn failed_stage_can_be_skipped_and_keeps_its_cost() {
        let mut exec =
            Execution::new(ExecutionId::new_random(), IdeaContext::new("idea text here"));
        let now = Timestamp::now();
        exec.start_stage(PipelineStage::UxDesign, now);
        exec.fail_stage(
            PipelineStage::UxDesign,
            "timed out",
            TokenCost::new(0.1).unwrap(),
            now,
        );
        exec.skip_stage(PipelineStage::UxDesign);

        let ux = exec.stage(PipelineStage::UxDesign);
        assert_eq!(ux.status, StageStatus::Skipped);
        assert_eq!(ux.error.as_deref(), Some("timed out"));
        assert!((exec.total_cost.as_f64() - 0.1).abs() < 1e-9);
        assert_eq!(exec.overall_quality().as_f64(), 0.0);
    }
}
