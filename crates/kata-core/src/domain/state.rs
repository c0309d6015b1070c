//! Replayable trainer state: difficulty history, strategy weights, and the
//! append-only audit logs.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One difficulty adjustment in the audit history.
///
/// `delta` is the change actually applied after clamping and regression
/// protection, so replaying deltas from `DifficultyState::initial`
/// reproduces `current` exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DifficultyShift {
    pub timestamp: DateTime<Utc>,

    /// Difficulty after this shift.
    pub value: f64,

    /// Signed change applied by this shift.
    pub delta: f64,

    /// Trend slope that drove the decision (None when data was short).
    pub trend_sample: Option<f64>,
}

/// The difficulty controller's persistent state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DifficultyState {
    /// Difficulty the history starts from.
    pub initial: f64,

    /// Difficulty tasks are synthesized at right now.
    pub current: f64,

    /// Difficulty of the most recent successful task, anchoring the
    /// regression-protection floor.
    pub last_success_difficulty: Option<f64>,

    /// Every adjustment ever applied, oldest first.
    pub history: Vec<DifficultyShift>,
}

impl DifficultyState {
    /// Fresh state starting at `initial`.
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            current: initial,
            last_success_difficulty: None,
            history: Vec::new(),
        }
    }

    /// Recompute the current value by replaying every recorded delta.
    pub fn replay(&self) -> f64 {
        self.history
            .iter()
            .fold(self.initial, |value, shift| value + shift.delta)
    }
}

/// Named trainer strategies for picking what to practice next.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    SkillGapFilling,
    StyleImprovement,
    RegressionPrevention,
    SkillAdvancement,
    Exploration,
    Consolidation,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::SkillGapFilling,
        Strategy::StyleImprovement,
        Strategy::RegressionPrevention,
        Strategy::SkillAdvancement,
        Strategy::Exploration,
        Strategy::Consolidation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::SkillGapFilling => "skill_gap_filling",
            Strategy::StyleImprovement => "style_improvement",
            Strategy::RegressionPrevention => "regression_prevention",
            Strategy::SkillAdvancement => "skill_advancement",
            Strategy::Exploration => "exploration",
            Strategy::Consolidation => "consolidation",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling weights over the strategies, kept normalized to sum 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyWeights {
    pub weights: BTreeMap<Strategy, f64>,

    /// Consecutive failed outcomes per strategy; resets on success.
    #[serde(default)]
    pub consecutive_failures: BTreeMap<Strategy, u32>,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(Strategy::SkillGapFilling, 0.3);
        weights.insert(Strategy::StyleImprovement, 0.2);
        weights.insert(Strategy::RegressionPrevention, 0.2);
        weights.insert(Strategy::SkillAdvancement, 0.1);
        weights.insert(Strategy::Exploration, 0.1);
        weights.insert(Strategy::Consolidation, 0.1);
        Self {
            weights,
            consecutive_failures: BTreeMap::new(),
        }
    }
}

impl StrategyWeights {
    /// Current weight for `strategy` (0 when absent).
    pub fn weight(&self, strategy: Strategy) -> f64 {
        self.weights.get(&strategy).copied().unwrap_or(0.0)
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }
}

/// Kinds of decisions the trainer records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrainerAction {
    AdjustDifficulty,
    SelectFocus,
    SynthesizeTask,
    UpdateStrategyWeights,
}

/// One entry in the append-only trainer decision log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainerLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: TrainerAction,
    pub detail: serde_json::Value,
}

impl TrainerLogEntry {
    pub fn new(action: TrainerAction, detail: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            detail,
        }
    }
}

/// Loop lifecycle events for the system log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LoopStarted,
    TaskStarted,
    TaskCompleted,
    TaskRetried,
    TaskFailed,
    CycleError,
    ErrorCooldown,
    LoopHalted,
}

/// One entry in the append-only system event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub detail: serde_json::Value,
}

impl SystemEvent {
    pub fn new(kind: EventKind, detail: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            detail,
        }
    }
}
