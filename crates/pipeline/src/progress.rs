//! Progress snapshots and lifecycle events.
//!
//! The conductor emits a [`PipelineEvent`] after every transition. Observers
//! implement [`EventSink`]; the conductor never blocks on them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    Execution, ExecutionId, PipelineStage, QualityScore, StageStatus, Timestamp, TokenCost,
};

/// Point-in-time view of an execution's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub execution_id: ExecutionId,
    /// Zero-based index of the stage currently running, or of the next stage
    /// to run when none is running.
    pub current_stage_index: usize,
    pub current_stage: Option<PipelineStage>,
    pub total_stages: usize,
    /// Share of stages in a terminal state, 0–100.
    pub percentage: f64,
    pub completed: usize,
    pub failed: usize,
    pub total_cost: TokenCost,
    /// Mean completed-stage duration × stages not yet attempted.
    #[serde(with = "optional_secs")]
    pub estimated_remaining: Option<Duration>,
}

impl ProgressSnapshot {
    /// Computes the snapshot for `execution`.
    ///
    /// Because stages only move forward into terminal states, `percentage` is
    /// monotonically non-decreasing over the life of an execution.
    pub fn of(execution: &Execution) -> Self {
        let stages = &execution.stages;
        let terminal = stages.values().filter(|s| s.status.is_terminal()).count();
        let completed = execution.completed_count();
        let failed = stages
            .values()
            .filter(|s| matches!(s.status, StageStatus::Failed | StageStatus::Skipped))
            .count();
        let not_attempted = stages
            .values()
            .filter(|s| s.status == StageStatus::Pending)
            .count();

        let current_stage = stages
            .values()
            .find(|s| s.status == StageStatus::Running)
            .or_else(|| stages.values().find(|s| s.status == StageStatus::Pending))
            .map(|s| s.stage);
        let current_stage_index = current_stage
            .map(PipelineStage::index)
            .unwrap_or(PipelineStage::COUNT);

        let durations: Vec<Duration> = execution
            .stages_with(StageStatus::Completed)
            .filter_map(|s| s.duration())
            .collect();
        let estimated_remaining = if durations.is_empty() {
            None
        } else {
            let mean = durations.iter().sum::<Duration>() / durations.len() as u32;
            Some(mean * not_attempted as u32)
        };

        Self {
            execution_id: execution.id,
            current_stage_index,
            current_stage,
            total_stages: PipelineStage::COUNT,
            percentage: terminal as f64 / PipelineStage::COUNT as f64 * 100.0,
            completed,
            failed,
            total_cost: execution.total_cost,
            estimated_remaining,
        }
    }
}

mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Lifecycle events emitted by the conductor.
///
/// Serialises with an `event` tag using the `stage:started` style names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum PipelineEvent {
    #[serde(rename = "pipeline:started")]
    PipelineStarted {
        execution_id: ExecutionId,
        at: Timestamp,
    },
    #[serde(rename = "stage:started")]
    StageStarted {
        stage: PipelineStage,
        progress: ProgressSnapshot,
    },
    #[serde(rename = "stage:completed")]
    StageCompleted {
        stage: PipelineStage,
        quality: QualityScore,
        cost: TokenCost,
        retries: u32,
        progress: ProgressSnapshot,
    },
    #[serde(rename = "stage:retry")]
    StageRetry {
        stage: PipelineStage,
        attempt: u32,
        quality: QualityScore,
    },
    #[serde(rename = "stage:skipped")]
    StageSkipped {
        stage: PipelineStage,
        error: String,
        progress: ProgressSnapshot,
    },
    #[serde(rename = "pipeline:completed")]
    PipelineCompleted {
        execution_id: ExecutionId,
        stages_completed: usize,
        total_cost: TokenCost,
        overall_quality: QualityScore,
        duration_ms: u64,
    },
    #[serde(rename = "pipeline:failed")]
    PipelineFailed {
        execution_id: ExecutionId,
        error: String,
        duration_ms: u64,
    },
    #[serde(rename = "pipeline:cancelled")]
    PipelineCancelled {
        execution_id: ExecutionId,
        duration_ms: u64,
        total_cost: TokenCost,
    },
}

impl PipelineEvent {
    /// The wire name of this event (`"stage:started"`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::PipelineStarted { .. } => "pipeline:started",
            PipelineEvent::StageStarted { .. } => "stage:started",
            PipelineEvent::StageCompleted { .. } => "stage:completed",
            PipelineEvent::StageRetry { .. } => "stage:retry",
            PipelineEvent::StageSkipped { .. } => "stage:skipped",
            PipelineEvent::PipelineCompleted { .. } => "pipeline:completed",
            PipelineEvent::PipelineFailed { .. } => "pipeline:failed",
            PipelineEvent::PipelineCancelled { .. } => "pipeline:cancelled",
        }
    }

    /// The progress snapshot carried by stage transition events.
    pub fn progress(&self) -> Option<&ProgressSnapshot> {
        match self {
            PipelineEvent::StageStarted { progress, .. }
            | PipelineEvent::StageCompleted { progress, .. }
            | PipelineEvent::StageSkipped { progress, .. } => Some(progress),
            _ => None,
        }
    }
}

/// Observer for pipeline lifecycle events.
///
/// Implementations must not block: they are called inline from the
/// conductor's stage loop.
pub trait EventSink: Send + Sync {
    /// Delivers one event for the execution it names.
    fn emit(&self, execution_id: ExecutionId, event: &PipelineEvent);
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _execution_id: ExecutionId, _event: &PipelineEvent) {}
}
