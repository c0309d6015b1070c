//! Kata Core Library
//!
//! The adaptive practice loop: task lifecycle and queueing, outcome scoring,
//! difficulty control, strategy selection, and the control loop that binds
//! them to persistent storage.

pub mod analysis;
pub mod collab;
pub mod config;
pub mod control;
pub mod difficulty;
pub mod domain;
pub mod error;
pub mod keys;
pub mod queue;
pub mod reflection;
pub mod scoring;
pub mod strategy;
pub mod synth;
pub mod telemetry;

pub use analysis::{analyze, Opportunity, OpportunityKind, Priority, ProfileAnalysis};
pub use config::{LoopConfig, MetricWeights};
pub use control::{ControlLoop, CycleReport, LoopState};
pub use difficulty::DifficultyController;
pub use domain::{
    BuilderProfile, DifficultyShift, DifficultyState, EventKind, Metrics, ScoreEntry, SkillMap,
    SkillState, Strategy, StrategyWeights, SystemEvent, Task, TaskResult, TaskSource, TaskStatus,
    TrainerAction, TrainerLogEntry, Trend,
};
pub use error::{KataError, Result};
pub use queue::{QueueRecord, RecordOutcome, TaskQueue};
pub use reflection::{apply_reflection, LearningSummary, Reflection};
pub use scoring::ScoreTracker;
pub use strategy::{FocusKind, SkillFocus, StrategySelector};
pub use synth::TaskSynthesizer;
pub use telemetry::init_tracing;

/// Kata version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
