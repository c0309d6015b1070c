//! Practice task lifecycle.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who put the task on the queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    Trainer,
    User,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSource::Trainer => "trainer",
            TaskSource::User => "user",
        }
    }
}

impl fmt::Display for TaskSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task.
///
/// `Completed` and `Failed` are terminal. The only backwards transition is
/// the retry path: a failed attempt with budget left returns the task to
/// `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether the task will never be mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one attempt, attached to the task when the attempt is
/// recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    /// Whether the attempt succeeded.
    pub success: bool,

    /// Score awarded for the attempt, in [0, 100].
    pub score: f64,

    /// Wall-clock seconds the execution took.
    pub execution_time: f64,

    /// Captured stdout of the attempt.
    pub output: String,

    /// Error description when the attempt did not run cleanly.
    pub error: Option<String>,
}

/// A single practice exercise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: Uuid,

    /// Who created the task.
    pub source: TaskSource,

    /// What the builder should produce.
    pub goal: String,

    /// Target difficulty in [0, 1].
    pub difficulty: f64,

    /// Ordered list of constraints the solution must respect.
    pub constraints: Vec<String>,

    /// Skills this task exercises.
    pub required_skills: BTreeSet<String>,

    /// Queue priority; lower numbers are served first.
    pub priority: u32,

    /// When the task was created.
    pub created_at: DateTime<Utc>,

    /// Current lifecycle state.
    pub status: TaskStatus,

    /// Failed attempts so far.
    pub attempts: u32,

    /// Attempt budget before the task is marked failed.
    pub max_attempts: u32,

    /// Most recently recorded outcome (None before the first attempt is
    /// recorded; carries the last failure while a retry is pending).
    pub result: Option<TaskResult>,

    /// Ad hoc per-source fields, e.g. the trainer strategy that produced
    /// this task.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extensions: HashMap<String, serde_json::Value>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(
        source: TaskSource,
        goal: impl Into<String>,
        difficulty: f64,
        priority: u32,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            goal: goal.into(),
            difficulty,
            constraints: Vec::new(),
            required_skills: BTreeSet::new(),
            priority,
            created_at: Utc::now(),
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts,
            result: None,
            extensions: HashMap::new(),
        }
    }

    /// Builder-style helper to attach constraints.
    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Builder-style helper to attach required skills.
    pub fn with_skills(mut self, skills: impl IntoIterator<Item = String>) -> Self {
        self.required_skills = skills.into_iter().collect();
        self
    }

    /// Whether the task will never be mutated again.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_defaults() {
        let task = Task::new(TaskSource::Trainer, "write a parser", 0.5, 10, 3);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert!(task.result.is_none());
        assert!(!task.is_terminal());
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn task_serde_roundtrip() {
        let task = Task::new(TaskSource::User, "sort a file", 0.3, 1, 3)
            .with_constraints(vec!["no external crates".to_string()])
            .with_skills(["file_io".to_string(), "algorithms".to_string()]);

        let json = serde_json::to_string(&task).expect("serialize");
        let deserialized: Task = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(task, deserialized);
    }

    #[test]
    fn extensions_absent_from_json_when_empty() {
        let task = Task::new(TaskSource::Trainer, "anything", 0.5, 10, 3);
        let json = serde_json::to_string(&task).expect("serialize");
        assert!(!json.contains("extensions"));
    }

    #[test]
    fn source_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskSource::Trainer).unwrap(),
            "\"trainer\""
        );
        assert_eq!(serde_json::to_string(&TaskSource::User).unwrap(), "\"user\"");
    }
}
