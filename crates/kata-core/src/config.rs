//! Loop configuration record.
//!
//! Stored as a JSON record under the memory root so operators can tune a
//! deployment by editing one file. Missing fields fall back to defaults,
//! and the full record is written out on first run.

use std::time::Duration;

use kata_store::JsonStore;
use serde::{Deserialize, Serialize};

use crate::error::{KataError, Result};
use crate::keys;

/// Relative weights for the four score metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricWeights {
    pub correctness: f64,
    pub efficiency: f64,
    pub elegance: f64,
    pub robustness: f64,
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            correctness: 0.4,
            efficiency: 0.2,
            elegance: 0.2,
            robustness: 0.2,
        }
    }
}

impl MetricWeights {
    /// Sum of all weights, used as the normalization divisor.
    pub fn total(&self) -> f64 {
        self.correctness + self.efficiency + self.elegance + self.robustness
    }
}

/// Tunables for the practice loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoopConfig {
    /// Lower clamp for task difficulty.
    pub diff_min: f64,

    /// Upper clamp for task difficulty.
    pub diff_max: f64,

    /// Difficulty used before any history exists.
    pub default_difficulty: f64,

    /// Step applied when the trend clears the upper threshold.
    pub difficulty_step_up: f64,

    /// Step applied when the trend falls below the lower threshold.
    pub difficulty_step_down: f64,

    /// Trend slope above which difficulty steps up.
    pub trend_upper_threshold: f64,

    /// Trend slope below which difficulty steps down.
    pub trend_lower_threshold: f64,

    /// How far below the last successful difficulty a step down may land.
    pub regression_margin: f64,

    /// How many recent scores feed the trend.
    pub trend_window_n: usize,

    /// EMA smoothing factor applied to the newest sample on skill updates.
    pub ema_smoothing: f64,

    /// Attempt budget for tasks that do not specify one.
    pub max_attempts_default: u32,

    /// Minimum weight any strategy can be driven down to.
    pub strategy_floor_weight: f64,

    /// Weight added or removed by one strategy outcome.
    pub strategy_nudge: f64,

    /// Relative metric weights in score calculation.
    pub score_metric_weights: MetricWeights,

    /// Multiplier applied to user-submitted task scores.
    pub user_source_bonus: f64,

    /// Queue priority for user-submitted tasks.
    pub user_task_priority: u32,

    /// Queue priority for trainer-synthesized tasks.
    pub trainer_task_priority: u32,

    /// Queue priority a failed task is requeued at.
    pub retry_priority: u32,

    /// Idle pause between practice cycles, in seconds.
    pub loop_interval_secs: u64,

    /// Pause after repeated cycle errors, in seconds.
    pub error_cooldown_secs: u64,

    /// Consecutive cycle errors that trigger the cooldown.
    pub max_consecutive_errors: u32,

    /// Wall-clock cap for one code generation call, in seconds.
    pub generation_timeout_secs: u64,

    /// Wall-clock cap for one sandbox execution, in seconds.
    pub execution_timeout_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            diff_min: 0.1,
            diff_max: 0.95,
            default_difficulty: 0.5,
            difficulty_step_up: 0.05,
            difficulty_step_down: 0.05,
            trend_upper_threshold: 0.1,
            trend_lower_threshold: -0.1,
            regression_margin: 0.1,
            trend_window_n: 10,
            ema_smoothing: 0.3,
            max_attempts_default: 3,
            strategy_floor_weight: 0.02,
            strategy_nudge: 0.05,
            score_metric_weights: MetricWeights::default(),
            user_source_bonus: 1.1,
            user_task_priority: 1,
            trainer_task_priority: 10,
            retry_priority: 5,
            loop_interval_secs: 5,
            error_cooldown_secs: 60,
            max_consecutive_errors: 3,
            generation_timeout_secs: 60,
            execution_timeout_secs: 120,
        }
    }
}

impl LoopConfig {
    /// Load the stored config, writing the defaults out on first run.
    pub async fn load_or_init(store: &JsonStore) -> Result<Self> {
        match store.load::<LoopConfig>(keys::LOOP_CONFIG).await? {
            Some(config) => {
                config.validate()?;
                Ok(config)
            }
            None => {
                let config = Self::default();
                store.save(keys::LOOP_CONFIG, &config).await?;
                Ok(config)
            }
        }
    }

    /// Reject configs the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.diff_min)
            || !(0.0..=1.0).contains(&self.diff_max)
            || self.diff_min >= self.diff_max
        {
            return Err(KataError::Config(format!(
                "difficulty bounds must satisfy 0 <= diff_min < diff_max <= 1, got [{}, {}]",
                self.diff_min, self.diff_max
            )));
        }
        if !(0.0..=1.0).contains(&self.default_difficulty) {
            return Err(KataError::Config(format!(
                "default_difficulty must be in [0, 1], got {}",
                self.default_difficulty
            )));
        }
        if self.difficulty_step_up <= 0.0 || self.difficulty_step_down <= 0.0 {
            return Err(KataError::Config(
                "difficulty steps must be positive".to_string(),
            ));
        }
        if self.trend_lower_threshold >= self.trend_upper_threshold {
            return Err(KataError::Config(
                "trend_lower_threshold must be below trend_upper_threshold".to_string(),
            ));
        }
        if !(self.ema_smoothing > 0.0 && self.ema_smoothing <= 1.0) {
            return Err(KataError::Config(format!(
                "ema_smoothing must be in (0, 1], got {}",
                self.ema_smoothing
            )));
        }
        if self.max_attempts_default == 0 {
            return Err(KataError::Config(
                "max_attempts_default must be at least 1".to_string(),
            ));
        }
        if self.score_metric_weights.total() <= 0.0 {
            return Err(KataError::Config(
                "score_metric_weights must sum to a positive value".to_string(),
            ));
        }
        let floor_total = self.strategy_floor_weight * crate::domain::Strategy::ALL.len() as f64;
        if self.strategy_floor_weight < 0.0 || floor_total >= 1.0 {
            return Err(KataError::Config(format!(
                "strategy_floor_weight {} leaves no weight budget above the floor",
                self.strategy_floor_weight
            )));
        }
        if self.trend_window_n < 2 {
            return Err(KataError::Config(
                "trend_window_n must be at least 2".to_string(),
            ));
        }
        Ok(())
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs(self.loop_interval_secs)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        LoopConfig::default().validate().expect("defaults must be valid");
    }

    #[test]
    fn partial_record_fills_missing_fields() {
        let config: LoopConfig =
            serde_json::from_str(r#"{"diff_max": 0.8, "trend_window_n": 5}"#).unwrap();
        assert_eq!(config.diff_max, 0.8);
        assert_eq!(config.trend_window_n, 5);
        assert_eq!(config.diff_min, 0.1);
        assert_eq!(config.ema_smoothing, 0.3);
    }

    #[test]
    fn inverted_bounds_rejected() {
        let config = LoopConfig {
            diff_min: 0.9,
            diff_max: 0.2,
            ..LoopConfig::default()
        };
        assert!(matches!(config.validate(), Err(KataError::Config(_))));
    }

    #[test]
    fn zero_attempt_budget_rejected() {
        let config = LoopConfig {
            max_attempts_default: 0,
            ..LoopConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn greedy_floor_rejected() {
        let config = LoopConfig {
            strategy_floor_weight: 0.2,
            ..LoopConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn load_or_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();

        let first = LoopConfig::load_or_init(&store).await.unwrap();
        assert_eq!(first, LoopConfig::default());
        assert!(dir.path().join("config/loop.json").is_file());

        // A hand-edited value survives the next load.
        store
            .update(keys::LOOP_CONFIG, "trend_window_n", serde_json::json!(4))
            .await
            .unwrap();
        let second = LoopConfig::load_or_init(&store).await.unwrap();
        assert_eq!(second.trend_window_n, 4);
    }
}
