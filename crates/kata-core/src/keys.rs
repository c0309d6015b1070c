//! Record keys under the memory root.
//!
//! Every durable record the loop touches lives at one of these keys so the
//! CLI and the daemon agree on the layout.

use uuid::Uuid;

pub const BUILDER_PROFILE: &str = "core/builder_profile";
pub const SKILL_MAP: &str = "core/skill_map";
pub const SCORE_LOG: &str = "core/score_log";
pub const DIFFICULTY_STATE: &str = "advanced/difficulty_state";
pub const STRATEGY_WEIGHTS: &str = "advanced/strategy_weights";
pub const TRAINER_LOG: &str = "advanced/trainer_log";
pub const TASK_QUEUE: &str = "tasks/queue";
pub const SYSTEM_EVENTS: &str = "logs/events";
pub const LOOP_CONFIG: &str = "config/loop";

/// Subdirectory of the memory root holding archived generated code.
pub const CODE_ARCHIVE_DIR: &str = "code_archive";

/// Key of the lifecycle record for one task.
pub fn task_record(id: &Uuid) -> String {
    format!("tasks/task_{id}")
}

/// Key of the rendered learning summary for one task.
pub fn task_summary(id: &Uuid) -> String {
    format!("tasks/summary_{id}")
}
