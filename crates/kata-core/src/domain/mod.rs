//! Domain models for the practice loop.
//!
//! Canonical definitions for the core entities:
//! - `Task`: One practice exercise and its lifecycle record
//! - `ScoreEntry` / `Trend`: The append-only outcome log and its statistics
//! - `BuilderProfile` / `SkillMap`: What the builder is good and bad at
//! - `DifficultyState` / `StrategyWeights`: Replayable trainer state

pub mod profile;
pub mod score;
pub mod state;
pub mod task;

// Re-export main types
pub use profile::{BuilderProfile, SkillMap, SkillState, MASTERY_LEVEL, WEAK_LEVEL};
pub use score::{Metrics, ScoreEntry, Trend};
pub use state::{
    DifficultyShift, DifficultyState, EventKind, Strategy, StrategyWeights, SystemEvent,
    TrainerAction, TrainerLogEntry,
};
pub use task::{Task, TaskResult, TaskSource, TaskStatus};
