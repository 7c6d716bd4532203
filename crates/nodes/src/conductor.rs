//! The conductor: runs the nine stages of one execution in order.
//!
//! Per stage the conductor checks the cost and wall-clock budgets, runs the
//! stage through the quality retry loop, records the outcome on the
//! [`Execution`] held in the [`ExecutionRegistry`], and emits progress events.
//!
//! Failure handling:
//!
//! | Situation                                  | Outcome                              |
//! |--------------------------------------------|--------------------------------------|
//! | critical stage errors on every attempt     | `CriticalStageFailed`                |
//! | non-critical stage errors on every attempt | stage skipped, run continues         |
//! | budget spent, critical stages incomplete   | `BudgetExceeded` / `TimeBudgetExceeded` |
//! | budget spent, critical stages complete     | partial result                       |
//! | registry entry removed mid-run             | `Cancelled`                          |

use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    assemble, check_injection, validate_idea_text, EventSink, Execution, ExecutionId, ForgeError,
    GenerationConfig, IdeaContext, MarketIntel, ModelName, PipelineEvent, PipelineResult,
    PipelineStage, ProgressSnapshot, QualityScore, StageCompletion, StageResults, Timestamp,
    TokenCost,
};
use tracing::{info, instrument, warn};

use crate::agents::{StageError, StageInput, StageOutcome, StageRunner};
use crate::registry::ExecutionRegistry;

/// Extra attempts a stage gets when its quality is below threshold.
pub const DEFAULT_QUALITY_RETRIES: u32 = 2;

/// Upper bound on a single stage attempt.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Conductor settings. Cost, time and quality limits come from each
/// submission's [`pipeline::Constraints`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConductorConfig {
    pub max_quality_retries: u32,
    pub stage_timeout: Duration,
    /// Echoed in the result metadata.
    pub analysis_model: Option<ModelName>,
    /// Echoed in the result metadata.
    pub design_model: Option<ModelName>,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            max_quality_retries: DEFAULT_QUALITY_RETRIES,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            analysis_model: None,
            design_model: None,
        }
    }
}

/// What the retry loop produced for one stage.
struct StageRun {
    best: Option<StageOutcome>,
    cost: TokenCost,
    retries: u32,
    error: Option<StageError>,
}

/// Removes a run's registry entry if its future is dropped before the run
/// finishes, e.g. when the caller goes away mid-run.
struct RunGuard {
    registry: ExecutionRegistry,
    events: Arc<dyn EventSink>,
    id: ExecutionId,
    started_at: Timestamp,
    armed: bool,
}

impl RunGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let (id, started_at) = (self.id, self.started_at);
        match self.registry.try_remove_run(id, started_at) {
            Ok(removed) => report_abandoned(self.events.as_ref(), id, removed),
            Err(_) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let registry = self.registry.clone();
                    let events = Arc::clone(&self.events);
                    handle.spawn(async move {
                        let removed = registry.remove_run(id, started_at).await;
                        report_abandoned(events.as_ref(), id, removed);
                    });
                }
                Err(_) => warn!(execution_id = %id, "run dropped outside a runtime; entry left registered"),
            },
        }
    }
}

fn report_abandoned(events: &dyn EventSink, id: ExecutionId, removed: Option<Execution>) {
    let Some(execution) = removed else {
        return;
    };
    let duration = execution.elapsed(Timestamp::now());
    warn!(execution_id = %id, total_cost = execution.total_cost.as_f64(), "run dropped before finishing");
    events.emit(
        id,
        &PipelineEvent::PipelineCancelled {
            execution_id: id,
            duration_ms: duration.as_millis() as u64,
            total_cost: execution.total_cost,
        },
    );
}

/// Drives executions through the pipeline.
pub struct Conductor {
    runner: Arc<dyn StageRunner>,
    events: Arc<dyn EventSink>,
    registry: ExecutionRegistry,
    config: ConductorConfig,
}

impl std::fmt::Debug for Conductor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conductor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Conductor {
    pub fn new(
        runner: Arc<dyn StageRunner>,
        events: Arc<dyn EventSink>,
        config: ConductorConfig,
    ) -> Self {
        Self {
            runner,
            events,
            registry: ExecutionRegistry::new(),
            config,
        }
    }

    pub fn config(&self) -> &ConductorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.registry
    }

    /// Runs a new execution to completion.
    pub async fn execute(&self, context: IdeaContext) -> Result<PipelineResult, ForgeError> {
        self.execute_with_id(ExecutionId::new_random(), context)
            .await
    }

    /// Runs an execution under a caller-chosen id, so the caller can poll or
    /// cancel it while it runs.
    #[instrument(skip_all, fields(execution_id = %id))]
    pub async fn execute_with_id(
        &self,
        id: ExecutionId,
        mut context: IdeaContext,
    ) -> Result<PipelineResult, ForgeError> {
        context.idea_text = validate_idea_text(&context.idea_text)?.to_string();
        // Every optional hint is interpolated into the stage prompts.
        for (field, value) in [
            ("title", &context.title),
            ("one_liner", &context.one_liner),
            ("industry", &context.industry),
            ("target_market", &context.target_market),
            ("budget", &context.budget),
            ("timeline", &context.timeline),
        ] {
            if let Some(value) = value {
                check_injection(field, value)?;
            }
        }

        let execution = Execution::new(id, context.clone());
        let started_at = execution.started_at;
        if !self.registry.try_insert(execution).await {
            return Err(ForgeError::InvalidInput {
                field: "execution_id".into(),
                message: format!("execution {id} is already running"),
            });
        }
        let guard = RunGuard {
            registry: self.registry.clone(),
            events: Arc::clone(&self.events),
            id,
            started_at,
            armed: true,
        };

        info!(stages = PipelineStage::COUNT, "pipeline started");
        self.events.emit(
            id,
            &PipelineEvent::PipelineStarted {
                execution_id: id,
                at: started_at,
            },
        );

        let outcome = self.drive(id, started_at, context).await;
        guard.disarm();
        outcome
    }

    /// The stage loop. Every return path has already removed the registry
    /// entry.
    async fn drive(
        &self,
        id: ExecutionId,
        started_at: Timestamp,
        context: IdeaContext,
    ) -> Result<PipelineResult, ForgeError> {
        let constraints = context.constraints;
        let mut results = StageResults::default();
        let mut market_intel: Option<MarketIntel> = None;

        for stage in PipelineStage::ALL {
            let now = Timestamp::now();
            let (spent, elapsed, critical_done) = self
                .registry
                .update(id, |e| (e.total_cost, e.elapsed(now), e.critical_stages_done()))
                .await
                .ok_or(ForgeError::Cancelled { execution_id: id })?;

            let stop = if constraints.max_cost.is_exceeded_by(spent) {
                Some(ForgeError::BudgetExceeded {
                    stage,
                    accumulated: spent,
                    limit: constraints.max_cost,
                })
            } else if elapsed >= constraints.max_duration {
                Some(ForgeError::TimeBudgetExceeded {
                    stage,
                    elapsed,
                    limit: constraints.max_duration,
                })
            } else {
                None
            };
            if let Some(error) = stop {
                if critical_done {
                    info!(stage = %stage, reason = %error, "budget spent; finishing early");
                    break;
                }
                return Err(self.abort(id, started_at, error).await);
            }

            let snapshot = self
                .registry
                .update(id, |e| {
                    e.start_stage(stage, Timestamp::now());
                    ProgressSnapshot::of(e)
                })
                .await
                .ok_or(ForgeError::Cancelled { execution_id: id })?;
            info!(stage = %stage, percentage = snapshot.percentage, "stage started");
            self.events.emit(
                id,
                &PipelineEvent::StageStarted {
                    stage,
                    progress: snapshot,
                },
            );

            let run = self
                .run_stage(id, stage, &context, &results, spent)
                .await;

            match run.best {
                Some(outcome) => {
                    let quality = outcome.quality;
                    if outcome.market_intel.is_some() {
                        market_intel = outcome.market_intel.clone();
                    }
                    results.record(outcome.output.clone());
                    let completion = StageCompletion {
                        output: outcome.output,
                        quality,
                        cost: run.cost,
                        retries: run.retries,
                        model: outcome.model,
                        fallback: outcome.fallback,
                        cached: outcome.cached,
                    };
                    let snapshot = self
                        .registry
                        .update(id, |e| {
                            e.complete_stage(stage, completion, Timestamp::now());
                            ProgressSnapshot::of(e)
                        })
                        .await
                        .ok_or(ForgeError::Cancelled { execution_id: id })?;
                    info!(
                        stage = %stage,
                        quality = quality.as_f64(),
                        cost = run.cost.as_f64(),
                        retries = run.retries,
                        "stage completed"
                    );
                    self.events.emit(
                        id,
                        &PipelineEvent::StageCompleted {
                            stage,
                            quality,
                            cost: run.cost,
                            retries: run.retries,
                            progress: snapshot,
                        },
                    );
                }
                None => {
                    let message = run
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "stage produced no output".to_string());

                    if stage.is_critical() {
                        self.registry
                            .update(id, |e| {
                                e.fail_stage(stage, message.clone(), run.cost, Timestamp::now())
                            })
                            .await
                            .ok_or(ForgeError::Cancelled { execution_id: id })?;
                        let error = ForgeError::CriticalStageFailed { stage, message };
                        return Err(self.abort(id, started_at, error).await);
                    }

                    let snapshot = self
                        .registry
                        .update(id, |e| {
                            e.fail_stage(stage, message.clone(), run.cost, Timestamp::now());
                            e.skip_stage(stage);
                            ProgressSnapshot::of(e)
                        })
                        .await
                        .ok_or(ForgeError::Cancelled { execution_id: id })?;
                    warn!(stage = %stage, error = %message, "non-critical stage failed; skipping");
                    self.events.emit(
                        id,
                        &PipelineEvent::StageSkipped {
                            stage,
                            error: message,
                            progress: snapshot,
                        },
                    );
                }
            }
        }

        let execution = self
            .registry
            .remove(id)
            .await
            .ok_or(ForgeError::Cancelled { execution_id: id })?;
        let result = assemble(
            &execution,
            &results,
            market_intel,
            self.generation(&context),
            Timestamp::now(),
        );
        info!(
            stages_completed = result.metadata.stages_completed,
            total_cost = result.metadata.total_cost.as_f64(),
            overall_quality = result.overall_quality.as_f64(),
            "pipeline completed"
        );
        self.events.emit(
            id,
            &PipelineEvent::PipelineCompleted {
                execution_id: id,
                stages_completed: result.metadata.stages_completed,
                total_cost: result.metadata.total_cost,
                overall_quality: result.overall_quality,
                duration_ms: result.metadata.processing_time_ms,
            },
        );
        Ok(result)
    }

    /// Cancels a running execution. Its task stops at the next transition and
    /// returns [`ForgeError::Cancelled`].
    #[instrument(skip(self), fields(execution_id = %id))]
    pub async fn cancel(&self, id: ExecutionId) -> Result<(), ForgeError> {
        let execution = self
            .registry
            .remove(id)
            .await
            .ok_or(ForgeError::UnknownExecution { execution_id: id })?;
        let duration = execution.elapsed(Timestamp::now());
        info!(total_cost = execution.total_cost.as_f64(), "pipeline cancelled");
        self.events.emit(
            id,
            &PipelineEvent::PipelineCancelled {
                execution_id: id,
                duration_ms: duration.as_millis() as u64,
                total_cost: execution.total_cost,
            },
        );
        Ok(())
    }

    /// Progress of a running execution.
    pub async fn progress(&self, id: ExecutionId) -> Option<ProgressSnapshot> {
        self.registry.snapshot(id).await
    }

    /// The quality retry loop for one stage.
    ///
    /// Keeps the highest-quality outcome; the stage cost is the sum over all
    /// attempts. Stops retrying once quality reaches the threshold, the cost
    /// or wall-clock budget is spent, or the execution is gone.
    async fn run_stage(
        &self,
        id: ExecutionId,
        stage: PipelineStage,
        context: &IdeaContext,
        prior: &StageResults,
        spent_before: TokenCost,
    ) -> StageRun {
        let constraints = &context.constraints;
        let mut run = StageRun {
            best: None,
            cost: TokenCost::zero(),
            retries: 0,
            error: None,
        };

        for attempt in 0..=self.config.max_quality_retries {
            if attempt > 0 {
                let now = Timestamp::now();
                let Some(elapsed) = self.registry.update(id, |e| e.elapsed(now)).await else {
                    break;
                };
                if constraints.max_cost.is_exceeded_by(spent_before + run.cost)
                    || elapsed >= constraints.max_duration
                {
                    break;
                }
                run.retries = attempt;
            }

            let input = StageInput {
                context,
                prior,
                attempt,
            };
            let outcome =
                match tokio::time::timeout(self.config.stage_timeout, self.runner.run(stage, input))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(StageError::Timeout(self.config.stage_timeout)),
                };

            let quality = match outcome {
                Ok(outcome) => {
                    run.cost += outcome.cost;
                    let quality = outcome.quality;
                    if run.best.as_ref().map_or(true, |b| quality > b.quality) {
                        run.best = Some(outcome);
                    }
                    if quality >= constraints.quality_threshold {
                        break;
                    }
                    quality
                }
                Err(error) => {
                    warn!(stage = %stage, attempt, %error, "stage attempt failed");
                    run.error = Some(error);
                    QualityScore::zero()
                }
            };

            if attempt < self.config.max_quality_retries {
                self.events.emit(
                    id,
                    &PipelineEvent::StageRetry {
                        stage,
                        attempt: attempt + 1,
                        quality,
                    },
                );
            }
        }
        run
    }

    /// Ends a run with `error`: drops the registry entry and emits
    /// `pipeline:failed`.
    async fn abort(&self, id: ExecutionId, started_at: Timestamp, error: ForgeError) -> ForgeError {
        if self.registry.remove(id).await.is_none() {
            return ForgeError::Cancelled { execution_id: id };
        }
        let duration = started_at.duration_until(Timestamp::now());
        warn!(%error, "pipeline failed");
        self.events.emit(
            id,
            &PipelineEvent::PipelineFailed {
                execution_id: id,
                error: error.to_string(),
                duration_ms: duration.as_millis() as u64,
            },
        );
        error
    }

    fn generation(&self, context: &IdeaContext) -> GenerationConfig {
        GenerationConfig {
            budget_limit: context.constraints.max_cost.as_f64(),
            quality_threshold: context.constraints.quality_threshold,
            max_quality_retries: self.config.max_quality_retries,
            max_duration_secs: context.constraints.max_duration.as_secs_f64(),
            analysis_model: self.config.analysis_model.clone(),
            design_model: self.config.design_model.clone(),
        }
    }
}
