//! The practice loop state machine.
//!
//! One cycle serves one task: fetch (or synthesize), generate, execute,
//! score, reflect, persist. Scoring always runs, even when generation or
//! execution failed, so the feedback loop learns from failure. Only store
//! corruption or an explicit shutdown stops the loop; everything else is
//! converted into a failed attempt and the loop keeps going.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kata_store::{CodeArchive, JsonStore};

use crate::analysis::analyze;
use crate::collab::{CodeGenerator, ExecutionOutcome, Reflector, SandboxExecutor};
use crate::config::LoopConfig;
use crate::difficulty::DifficultyController;
use crate::domain::{
    BuilderProfile, EventKind, Metrics, ScoreEntry, SkillMap, Strategy, SystemEvent, Task,
    TaskResult, TrainerAction, TrainerLogEntry,
};
use crate::error::{KataError, Result};
use crate::keys;
use crate::queue::{RecordOutcome, TaskQueue};
use crate::reflection::apply_reflection;
use crate::scoring::{baseline_metrics, ScoreTracker};
use crate::strategy::StrategySelector;
use crate::synth::TaskSynthesizer;

/// Extra wall-clock allowance on top of the executor's own limit, so a
/// misbehaving executor cannot hang the loop.
const EXECUTOR_GRACE: Duration = Duration::from_secs(5);

/// Where the loop is within the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Fetching,
    Generating,
    Executing,
    Scoring,
    Reflecting,
    Persisting,
    Error,
}

/// What one completed cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub task_id: Uuid,
    pub goal: String,
    pub outcome: RecordOutcome,
    pub score: f64,
}

/// Sequential driver of the practice cycle. One instance per store,
/// enforced at startup by the daemon's instance lock.
pub struct ControlLoop {
    store: Arc<JsonStore>,
    archive: CodeArchive,
    config: LoopConfig,
    queue: TaskQueue,
    tracker: ScoreTracker,
    difficulty: DifficultyController,
    selector: StrategySelector,
    synthesizer: TaskSynthesizer,
    generator: Arc<dyn CodeGenerator>,
    executor: Arc<dyn SandboxExecutor>,
    reflector: Arc<dyn Reflector>,
    state: LoopState,
    consecutive_errors: u32,
}

impl ControlLoop {
    pub fn new(
        store: Arc<JsonStore>,
        config: LoopConfig,
        generator: Arc<dyn CodeGenerator>,
        executor: Arc<dyn SandboxExecutor>,
        reflector: Arc<dyn Reflector>,
    ) -> Result<Self> {
        let archive = CodeArchive::new(store.root().join(keys::CODE_ARCHIVE_DIR))?;
        Ok(Self {
            queue: TaskQueue::new(Arc::clone(&store), &config),
            tracker: ScoreTracker::new(Arc::clone(&store), &config),
            difficulty: DifficultyController::new(Arc::clone(&store), &config),
            selector: StrategySelector::new(Arc::clone(&store), &config),
            synthesizer: TaskSynthesizer::new(&config),
            archive,
            store,
            config,
            generator,
            executor,
            reflector,
            state: LoopState::Idle,
            consecutive_errors: 0,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run cycles until shutdown flips or the store turns fatal.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("practice loop starting");
        self.system_event(
            EventKind::LoopStarted,
            json!({ "interval_secs": self.config.loop_interval_secs }),
        )
        .await?;

        loop {
            if *shutdown.borrow() {
                info!("shutdown requested, stopping loop");
                break;
            }

            let pause = match self.run_once().await {
                Ok(report) => {
                    self.consecutive_errors = 0;
                    info!(
                        task_id = %report.task_id,
                        score = report.score,
                        outcome = ?report.outcome,
                        "cycle finished"
                    );
                    self.config.loop_interval()
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "fatal store failure, halting loop");
                    self.system_event(
                        EventKind::LoopHalted,
                        json!({ "error": e.to_string() }),
                    )
                    .await
                    .ok();
                    self.state = LoopState::Error;
                    return Err(e);
                }
                Err(e) => {
                    self.state = LoopState::Error;
                    self.consecutive_errors += 1;
                    warn!(
                        error = %e,
                        consecutive = self.consecutive_errors,
                        "cycle failed"
                    );
                    self.system_event(
                        EventKind::CycleError,
                        json!({
                            "error": e.to_string(),
                            "consecutive": self.consecutive_errors,
                        }),
                    )
                    .await
                    .ok();
                    if self.consecutive_errors >= self.config.max_consecutive_errors {
                        warn!(
                            cooldown_secs = self.config.error_cooldown_secs,
                            "error streak, cooling down"
                        );
                        self.system_event(
                            EventKind::ErrorCooldown,
                            json!({ "cooldown_secs": self.config.error_cooldown_secs }),
                        )
                        .await
                        .ok();
                        self.consecutive_errors = 0;
                        self.config.error_cooldown()
                    } else {
                        self.config.loop_interval()
                    }
                }
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("shutdown channel closed, stopping loop");
                        break;
                    }
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        self.state = LoopState::Idle;
        self.system_event(EventKind::LoopHalted, json!({ "reason": "shutdown" }))
            .await
            .ok();
        info!("practice loop stopped");
        Ok(())
    }

    /// Drive exactly one cycle: one task served, scored, and persisted.
    pub async fn run_once(&mut self) -> Result<CycleReport> {
        self.state = LoopState::Fetching;
        let task = self.fetch_task().await?;
        self.system_event(
            EventKind::TaskStarted,
            json!({ "task_id": task.id, "goal": task.goal, "source": task.source }),
        )
        .await?;

        let attempt = match self.perform(&task).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_fatal() => {
                self.state = LoopState::Error;
                return Err(e);
            }
            Err(e) => {
                debug!(task_id = %task.id, error = %e, "attempt failed before scoring");
                Err(e)
            }
        };

        // Scoring always runs; a failed attempt scores as a failure so the
        // feedback loop still learns from it.
        self.state = LoopState::Scoring;
        let (metrics, mut result) = match &attempt {
            Ok(outcome) => {
                let error = if outcome.succeeded() {
                    None
                } else if outcome.stderr.trim().is_empty() {
                    Some(format!("exit code {}", outcome.exit_code))
                } else {
                    Some(outcome.stderr.trim().to_string())
                };
                (
                    baseline_metrics(outcome, self.config.execution_timeout()),
                    TaskResult {
                        success: outcome.succeeded(),
                        score: 0.0,
                        execution_time: outcome.duration.as_secs_f64(),
                        output: outcome.stdout.clone(),
                        error,
                    },
                )
            }
            Err(e) => (
                Metrics::failure(),
                TaskResult {
                    success: false,
                    score: 0.0,
                    execution_time: 0.0,
                    output: String::new(),
                    error: Some(e.to_string()),
                },
            ),
        };
        let score = self
            .tracker
            .calculate_score(&metrics, task.difficulty, task.source);
        result.score = score;

        let outcome = self.queue.record_result(task.id, result).await?;
        if outcome != RecordOutcome::AlreadyTerminal {
            let entry = ScoreEntry {
                task_id: task.id,
                score,
                difficulty: task.difficulty,
                source: task.source,
                timestamp: Utc::now(),
                metrics,
            };
            self.tracker.track_score(&task, &entry).await?;
        }

        if outcome.is_terminal() && outcome != RecordOutcome::AlreadyTerminal {
            self.state = LoopState::Reflecting;
            self.reflect_on(&task, &attempt, score).await;
        }

        self.state = LoopState::Persisting;
        if outcome != RecordOutcome::AlreadyTerminal {
            self.update_trainer_state(&task, &outcome).await?;
        }
        self.emit_outcome_event(&task, &outcome, score).await?;

        self.state = LoopState::Idle;
        Ok(CycleReport {
            task_id: task.id,
            goal: task.goal,
            outcome,
            score,
        })
    }

    /// Serve the next queued task, synthesizing one when the queue is dry.
    async fn fetch_task(&mut self) -> Result<Task> {
        if let Some(task) = self.queue.dequeue_next().await? {
            return Ok(task);
        }

        let profile = self
            .store
            .load_or_default::<BuilderProfile>(keys::BUILDER_PROFILE)
            .await?;
        let skills = self
            .store
            .load_or_default::<SkillMap>(keys::SKILL_MAP)
            .await?;
        let analysis = analyze(&profile, &skills, Utc::now());
        let focus = self.selector.next_focus(&analysis).await?;
        self.trainer_log(
            TrainerAction::SelectFocus,
            json!({ "strategy": focus.strategy, "focus": focus.focus.to_string() }),
        )
        .await?;

        let difficulty = match focus.focus.skill() {
            Some(skill) => self.difficulty.for_skill(skill, &skills).await?,
            None => self.difficulty.current().await?,
        };
        let task = self.synthesizer.synthesize(&focus, difficulty);
        self.trainer_log(
            TrainerAction::SynthesizeTask,
            json!({ "task_id": task.id, "goal": task.goal, "difficulty": difficulty }),
        )
        .await?;
        info!(task_id = %task.id, difficulty, "synthesized trainer task");
        self.queue.enqueue(task).await?;

        // A user task submitted in the meantime may legitimately jump ahead
        // of the one just synthesized.
        match self.queue.dequeue_next().await? {
            Some(task) => Ok(task),
            None => Err(KataError::Internal(
                "queue empty immediately after enqueue".to_string(),
            )),
        }
    }

    /// Generate and execute under their timeouts. Archive whatever code was
    /// produced, even if it later fails to run.
    async fn perform(&mut self, task: &Task) -> Result<ExecutionOutcome> {
        self.state = LoopState::Generating;
        let generation_limit = self.config.generation_timeout();
        let code = tokio::time::timeout(generation_limit, self.generator.generate_code(task))
            .await
            .map_err(|_| KataError::GenerationTimeout(generation_limit))??;

        if let Err(e) = self.archive.store(
            &task.id.to_string(),
            self.generator.language_extension(),
            &code,
        ) {
            warn!(task_id = %task.id, error = %e, "failed to archive generated code");
        }

        self.state = LoopState::Executing;
        let execution_limit = self.config.execution_timeout();
        let outcome = tokio::time::timeout(
            execution_limit + EXECUTOR_GRACE,
            self.executor.execute(&code, execution_limit),
        )
        .await
        .map_err(|_| KataError::ExecutionTimeout(execution_limit))??;
        Ok(outcome)
    }

    /// Reflection is best effort: it runs once per terminal outcome and its
    /// failure never blocks the already-persisted score.
    async fn reflect_on(&self, task: &Task, attempt: &Result<ExecutionOutcome>, score: f64) {
        let synthetic;
        let outcome = match attempt {
            Ok(outcome) => outcome,
            Err(e) => {
                synthetic = ExecutionOutcome {
                    stdout: String::new(),
                    stderr: e.to_string(),
                    exit_code: -1,
                    duration: Duration::ZERO,
                };
                &synthetic
            }
        };
        match self.reflector.reflect(task, outcome).await {
            Ok(reflection) => {
                if let Err(e) = apply_reflection(&self.store, task, &reflection, score).await {
                    warn!(task_id = %task.id, error = %e, "failed to persist reflection");
                }
            }
            Err(e) => warn!(task_id = %task.id, error = %e, "reflection failed"),
        }
    }

    /// Difficulty follows every scored attempt; strategy weights only move
    /// on terminal outcomes, so retries of one task count as one failure.
    async fn update_trainer_state(&mut self, task: &Task, outcome: &RecordOutcome) -> Result<()> {
        if outcome.succeeded() {
            self.difficulty.note_success(task.difficulty).await?;
        }
        let trend = self
            .tracker
            .performance_trend(self.config.trend_window_n)
            .await?;
        let shift = self.difficulty.adjust(&trend).await?;
        self.trainer_log(
            TrainerAction::AdjustDifficulty,
            json!({
                "task_id": task.id,
                "difficulty": shift.value,
                "delta": shift.delta,
                "trend": shift.trend_sample,
            }),
        )
        .await?;

        if outcome.is_terminal() {
            if let Some(strategy) = task_strategy(task) {
                let weight = self
                    .selector
                    .update_weights(strategy, outcome.succeeded())
                    .await?;
                self.trainer_log(
                    TrainerAction::UpdateStrategyWeights,
                    json!({
                        "strategy": strategy,
                        "success": outcome.succeeded(),
                        "weight": weight,
                    }),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn emit_outcome_event(
        &self,
        task: &Task,
        outcome: &RecordOutcome,
        score: f64,
    ) -> Result<()> {
        let (kind, detail) = match outcome {
            RecordOutcome::Completed => (
                EventKind::TaskCompleted,
                json!({ "task_id": task.id, "score": score }),
            ),
            RecordOutcome::Retried { attempts } => (
                EventKind::TaskRetried,
                json!({ "task_id": task.id, "score": score, "attempts": attempts }),
            ),
            RecordOutcome::Exhausted { attempts } => (
                EventKind::TaskFailed,
                json!({ "task_id": task.id, "score": score, "attempts": attempts }),
            ),
            RecordOutcome::AlreadyTerminal => return Ok(()),
        };
        self.system_event(kind, detail).await
    }

    async fn trainer_log(&self, action: TrainerAction, detail: serde_json::Value) -> Result<()> {
        self.store
            .append(keys::TRAINER_LOG, &TrainerLogEntry::new(action, detail))
            .await?;
        Ok(())
    }

    async fn system_event(&self, kind: EventKind, detail: serde_json::Value) -> Result<()> {
        self.store
            .append(keys::SYSTEM_EVENTS, &SystemEvent::new(kind, detail))
            .await?;
        Ok(())
    }
}

fn task_strategy(task: &Task) -> Option<Strategy> {
    let value = task.extensions.get("strategy")?;
    serde_json::from_value(value.clone()).ok()
}
