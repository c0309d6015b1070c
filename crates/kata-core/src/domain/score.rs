//! Scored outcomes and the rolling performance trend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskSource;

/// Per-attempt quality metrics, each in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Metrics {
    pub correctness: f64,
    pub efficiency: f64,
    pub elegance: f64,
    pub robustness: f64,
}

impl Metrics {
    /// Metrics recorded when an attempt never produced a runnable program.
    pub fn failure() -> Self {
        Self {
            correctness: 0.0,
            efficiency: 0.0,
            elegance: 0.0,
            robustness: 0.0,
        }
    }

    /// Copy with every metric clamped into [0, 1].
    pub fn clamped(self) -> Self {
        Self {
            correctness: self.correctness.clamp(0.0, 1.0),
            efficiency: self.efficiency.clamp(0.0, 1.0),
            elegance: self.elegance.clamp(0.0, 1.0),
            robustness: self.robustness.clamp(0.0, 1.0),
        }
    }
}

/// One scored outcome in the append-only score log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreEntry {
    /// Task this outcome belongs to.
    pub task_id: Uuid,

    /// Awarded score in [0, 100].
    pub score: f64,

    /// Difficulty the task ran at.
    pub difficulty: f64,

    /// Who created the task.
    pub source: TaskSource,

    /// When the outcome was recorded.
    pub timestamp: DateTime<Utc>,

    /// The metric breakdown behind the score.
    pub metrics: Metrics,
}

/// Performance trend over the recent score window.
///
/// The slope is a least-squares fit over the last `samples` scores in
/// chronological order, so rising scores give a positive slope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "trend", rename_all = "snake_case")]
pub enum Trend {
    /// Fewer than two scores in the window; no slope can be fit.
    Insufficient { samples: usize },

    /// A fitted trend.
    Measured {
        samples: usize,
        mean: f64,
        slope: f64,
    },
}

impl Trend {
    /// Number of scores the trend was computed over.
    pub fn samples(&self) -> usize {
        match self {
            Trend::Insufficient { samples } => *samples,
            Trend::Measured { samples, .. } => *samples,
        }
    }

    /// Fitted slope, if there was enough data.
    pub fn slope(&self) -> Option<f64> {
        match self {
            Trend::Insufficient { .. } => None,
            Trend::Measured { slope, .. } => Some(*slope),
        }
    }

    /// Mean score over the window, if there was enough data.
    pub fn mean(&self) -> Option<f64> {
        match self {
            Trend::Insufficient { .. } => None,
            Trend::Measured { mean, .. } => Some(*mean),
        }
    }
}
