//! Outcome scoring, skill updates, and the performance trend.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kata_store::JsonStore;
use tracing::debug;

use crate::collab::ExecutionOutcome;
use crate::config::{LoopConfig, MetricWeights};
use crate::domain::{BuilderProfile, Metrics, ScoreEntry, SkillMap, Task, TaskSource, Trend};
use crate::error::Result;
use crate::keys;

/// Correctness ceiling for a program that ran but exited non-zero.
const FAILED_RUN_CORRECTNESS: f64 = 0.3;

/// Scores outcomes and folds them into the skill map and builder profile.
pub struct ScoreTracker {
    store: Arc<JsonStore>,
    weights: MetricWeights,
    ema_smoothing: f64,
    user_source_bonus: f64,
}

impl ScoreTracker {
    pub fn new(store: Arc<JsonStore>, config: &LoopConfig) -> Self {
        Self {
            store,
            weights: config.score_metric_weights,
            ema_smoothing: config.ema_smoothing,
            user_source_bonus: config.user_source_bonus,
        }
    }

    /// Combine the metric breakdown into a single score in [0, 100].
    ///
    /// The weighted metric mean is scaled by a curve that rewards harder
    /// tasks and by a small bonus for user-submitted work, then capped.
    /// The result is increasing in every metric and non-decreasing in
    /// difficulty.
    pub fn calculate_score(&self, metrics: &Metrics, difficulty: f64, source: TaskSource) -> f64 {
        let m = metrics.clamped();
        let w = &self.weights;
        let weighted = m.correctness * w.correctness
            + m.efficiency * w.efficiency
            + m.elegance * w.elegance
            + m.robustness * w.robustness;
        let raw = weighted / w.total();

        let curve = difficulty_curve(difficulty);
        let bonus = match source {
            TaskSource::User => self.user_source_bonus,
            TaskSource::Trainer => 1.0,
        };

        round1((raw * curve * bonus * 100.0).clamp(0.0, 100.0))
    }

    /// Append `entry` to the score log and apply the EMA updates to the
    /// skill map and builder profile for the skills `task` exercised.
    pub async fn track_score(&self, task: &Task, entry: &ScoreEntry) -> Result<()> {
        self.store.append(keys::SCORE_LOG, entry).await?;

        let alpha = self.ema_smoothing;
        let sample = entry.score / 100.0;
        let timestamp = entry.timestamp;
        let skills = task.required_skills.clone();

        let (mastered, weak) = self
            .store
            .mutate::<SkillMap, _, _>(keys::SKILL_MAP, move |map| {
                for skill in &skills {
                    let state = map.entry(skill, timestamp);
                    state.level = ((1.0 - alpha) * state.level + alpha * sample).clamp(0.0, 1.0);
                    state.tasks_completed += 1;
                    state.last_used = timestamp;
                }
                (map.mastered(), map.weak())
            })
            .await?;

        let score = entry.score;
        self.store
            .mutate::<BuilderProfile, _, _>(keys::BUILDER_PROFILE, move |profile| {
                profile.task_count += 1;
                let n = profile.task_count as f64;
                profile.average_score = profile.average_score + (score - profile.average_score) / n;
                profile.skills_mastered = mastered;
                profile.weak_skills = weak;
                profile.last_updated = Utc::now();
            })
            .await?;

        debug!(task_id = %entry.task_id, score = entry.score, "score tracked");
        Ok(())
    }

    /// Trend over the last `window` scores, oldest to newest.
    pub async fn performance_trend(&self, window: usize) -> Result<Trend> {
        let log: Vec<ScoreEntry> = self.store.load_or_default(keys::SCORE_LOG).await?;
        Ok(compute_trend(&log, window))
    }
}

/// Difficulty curve scaling raw metric quality into the awarded score.
///
/// Linear from 0.5x at difficulty 0 to 1.0x at difficulty 1, so harder
/// tasks are worth more without ever scoring above the cap.
pub fn difficulty_curve(difficulty: f64) -> f64 {
    0.5 + 0.5 * difficulty.clamp(0.0, 1.0)
}

/// Least-squares trend over the last `window` entries of the score log.
pub fn compute_trend(entries: &[ScoreEntry], window: usize) -> Trend {
    let tail = &entries[entries.len().saturating_sub(window)..];
    let samples = tail.len();
    if samples < 2 {
        return Trend::Insufficient { samples };
    }

    let n = samples as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = tail.iter().map(|e| e.score).sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, entry) in tail.iter().enumerate() {
        let dx = i as f64 - mean_x;
        numerator += dx * (entry.score - mean_y);
        denominator += dx * dx;
    }

    Trend::Measured {
        samples,
        mean: mean_y,
        slope: numerator / denominator,
    }
}

/// Baseline metrics derived from a raw execution.
///
/// Used when no richer scorer is wired in: correctness and robustness come
/// from the exit status and stderr, efficiency from how much of the time
/// budget was left. A non-zero exit caps correctness well below passing.
pub fn baseline_metrics(outcome: &ExecutionOutcome, timeout: Duration) -> Metrics {
    if !outcome.succeeded() {
        return Metrics {
            correctness: FAILED_RUN_CORRECTNESS,
            efficiency: 0.2,
            elegance: 0.3,
            robustness: 0.1,
        };
    }

    let budget = timeout.as_secs_f64();
    let headroom = if budget > 0.0 {
        (1.0 - outcome.duration.as_secs_f64() / budget).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Metrics {
        correctness: 0.9,
        efficiency: 0.4 + 0.5 * headroom,
        elegance: 0.5,
        robustness: if outcome.stderr.trim().is_empty() {
            0.7
        } else {
            0.35
        },
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
