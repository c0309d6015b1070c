//! Trend-driven difficulty control.

use std::sync::Arc;

use chrono::Utc;
use kata_store::JsonStore;
use tracing::info;

use crate::config::LoopConfig;
use crate::domain::{DifficultyShift, DifficultyState, SkillMap, Trend};
use crate::error::Result;
use crate::keys;

/// Skill-level buckets mapped to a comfortable practice difficulty.
fn level_target(level: f64) -> f64 {
    if level < 0.2 {
        0.2
    } else if level < 0.4 {
        0.3
    } else if level < 0.6 {
        0.5
    } else if level < 0.8 {
        0.7
    } else {
        0.8
    }
}

/// Adjusts the global difficulty once per scored task.
///
/// The trend slope is compared against the configured band: above the
/// upper threshold steps difficulty up, below the lower threshold steps
/// it down, anything in between (or too little data) holds. Downward
/// steps never drop below the last successful difficulty minus the
/// regression margin, so one bad streak cannot erase earned progress.
pub struct DifficultyController {
    store: Arc<JsonStore>,
    diff_min: f64,
    diff_max: f64,
    default_difficulty: f64,
    step_up: f64,
    step_down: f64,
    upper_threshold: f64,
    lower_threshold: f64,
    regression_margin: f64,
}

impl DifficultyController {
    pub fn new(store: Arc<JsonStore>, config: &LoopConfig) -> Self {
        Self {
            store,
            diff_min: config.diff_min,
            diff_max: config.diff_max,
            default_difficulty: config.default_difficulty,
            step_up: config.difficulty_step_up,
            step_down: config.difficulty_step_down,
            upper_threshold: config.trend_upper_threshold,
            lower_threshold: config.trend_lower_threshold,
            regression_margin: config.regression_margin,
        }
    }

    async fn load_state(&self) -> Result<DifficultyState> {
        let state = self
            .store
            .load::<DifficultyState>(keys::DIFFICULTY_STATE)
            .await?
            .unwrap_or_else(|| DifficultyState::new(self.default_difficulty));
        Ok(state)
    }

    /// Difficulty tasks are synthesized at right now.
    pub async fn current(&self) -> Result<f64> {
        Ok(self.load_state().await?.current)
    }

    /// Full state, for audit queries.
    pub async fn state(&self) -> Result<DifficultyState> {
        self.load_state().await
    }

    /// Record that a task succeeded at `difficulty`, anchoring the
    /// regression-protection floor.
    pub async fn note_success(&self, difficulty: f64) -> Result<()> {
        let mut state = self.load_state().await?;
        state.last_success_difficulty = Some(difficulty);
        self.store.save(keys::DIFFICULTY_STATE, &state).await?;
        Ok(())
    }

    /// Apply one adjustment for `trend` and return the shift that was
    /// recorded (delta 0 for a hold).
    pub async fn adjust(&self, trend: &Trend) -> Result<DifficultyShift> {
        let mut state = self.load_state().await?;
        let slope = trend.slope();

        let before = state.current;
        let intent = match slope {
            Some(s) if s > self.upper_threshold => self.step_up,
            Some(s) if s < self.lower_threshold => -self.step_down,
            _ => 0.0,
        };

        let mut target = (before + intent).clamp(self.diff_min, self.diff_max);
        if intent < 0.0 {
            if let Some(anchor) = state.last_success_difficulty {
                let floor = (anchor - self.regression_margin).max(self.diff_min);
                target = target.max(floor.min(before));
            }
        }

        let shift = DifficultyShift {
            timestamp: Utc::now(),
            value: target,
            delta: target - before,
            trend_sample: slope,
        };
        state.current = target;
        state.history.push(shift.clone());
        self.store.save(keys::DIFFICULTY_STATE, &state).await?;

        if shift.delta != 0.0 {
            info!(
                from = before,
                to = target,
                slope = ?slope,
                "difficulty adjusted"
            );
        }
        Ok(shift)
    }

    /// Difficulty for a task focused on one skill: the global value blended
    /// with a target derived from that skill's mastery, so weak skills get
    /// easier tasks than the global level would suggest.
    pub async fn for_skill(&self, skill: &str, skills: &SkillMap) -> Result<f64> {
        let current = self.current().await?;
        let level = skills.level(skill).unwrap_or(crate::domain::profile::STARTING_LEVEL);
        let blended = (current + level_target(level)) / 2.0;
        Ok(blended.clamp(self.diff_min, self.diff_max))
    }
}
