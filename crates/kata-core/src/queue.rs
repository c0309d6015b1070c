//! Durable task queue with priority ordering and retry bookkeeping.
//!
//! The queue record holds pending tasks in serve order: lower numeric
//! priority first, FIFO among equals. Every task also has its own record
//! under `tasks/` that outlives its time on the queue, so completed and
//! failed tasks stay inspectable.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use kata_store::JsonStore;

use crate::config::LoopConfig;
use crate::domain::{Task, TaskResult, TaskSource, TaskStatus};
use crate::error::{KataError, Result};
use crate::keys;

/// Durable shape of the pending queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueRecord {
    pub queue: Vec<Task>,
}

/// What recording a result did with the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RecordOutcome {
    /// The attempt succeeded; the task is done.
    Completed,
    /// The attempt failed with budget left; the task is pending again.
    Retried { attempts: u32 },
    /// The attempt failed and spent the last of the budget.
    Exhausted { attempts: u32 },
    /// The task was already terminal; nothing changed.
    AlreadyTerminal,
}

impl RecordOutcome {
    /// Whether the task is in a terminal state after this outcome.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecordOutcome::Retried { .. })
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, RecordOutcome::Completed)
    }
}

/// Queue operations over the store.
pub struct TaskQueue {
    store: Arc<JsonStore>,
    retry_priority: u32,
    default_max_attempts: u32,
}

impl TaskQueue {
    pub fn new(store: Arc<JsonStore>, config: &LoopConfig) -> Self {
        Self {
            store,
            retry_priority: config.retry_priority,
            default_max_attempts: config.max_attempts_default,
        }
    }

    /// Persist the task record and insert the task in serve order.
    pub async fn enqueue(&self, task: Task) -> Result<()> {
        self.store.save(&keys::task_record(&task.id), &task).await?;
        let task_id = task.id;
        let priority = task.priority;
        self.store
            .mutate::<QueueRecord, _, _>(keys::TASK_QUEUE, move |record| {
                let position = record
                    .queue
                    .iter()
                    .position(|queued| queued.priority > task.priority)
                    .unwrap_or(record.queue.len());
                record.queue.insert(position, task);
            })
            .await?;
        debug!(%task_id, priority, "task enqueued");
        Ok(())
    }

    /// Build and enqueue a user task, returning its id.
    pub async fn submit_task(
        &self,
        goal: impl Into<String>,
        difficulty: f64,
        constraints: Vec<String>,
        skills: Vec<String>,
        priority: u32,
    ) -> Result<Uuid> {
        let task = Task::new(
            TaskSource::User,
            goal,
            difficulty,
            priority,
            self.default_max_attempts,
        )
        .with_constraints(constraints)
        .with_skills(skills);
        let task_id = task.id;
        self.enqueue(task).await?;
        info!(%task_id, "user task submitted");
        Ok(task_id)
    }

    /// Pop the next task to serve and mark it running.
    ///
    /// An empty queue returns `None`; that is the signal to synthesize.
    pub async fn dequeue_next(&self) -> Result<Option<Task>> {
        let popped = self
            .store
            .mutate::<QueueRecord, _, _>(keys::TASK_QUEUE, |record| {
                if record.queue.is_empty() {
                    None
                } else {
                    Some(record.queue.remove(0))
                }
            })
            .await?;
        let Some(mut task) = popped else {
            return Ok(None);
        };
        task.status = TaskStatus::Running;
        self.store.save(&keys::task_record(&task.id), &task).await?;
        debug!(task_id = %task.id, "task dequeued");
        Ok(Some(task))
    }

    /// Record the outcome of an attempt.
    ///
    /// Success completes the task. Failure consumes one attempt and either
    /// requeues the task at the retry priority or, with the budget spent,
    /// marks it failed. A result for an already-terminal task changes
    /// nothing; in particular it never double counts attempts.
    pub async fn record_result(&self, task_id: Uuid, result: TaskResult) -> Result<RecordOutcome> {
        let key = keys::task_record(&task_id);
        let Some(mut task) = self.store.load::<Task>(&key).await? else {
            return Err(KataError::TaskNotFound(task_id));
        };
        if task.status.is_terminal() {
            debug!(%task_id, "result for an already-terminal task ignored");
            return Ok(RecordOutcome::AlreadyTerminal);
        }

        let outcome = if result.success {
            task.status = TaskStatus::Completed;
            RecordOutcome::Completed
        } else {
            task.attempts += 1;
            if task.attempts >= task.max_attempts {
                task.status = TaskStatus::Failed;
                RecordOutcome::Exhausted {
                    attempts: task.attempts,
                }
            } else {
                task.status = TaskStatus::Pending;
                task.priority = self.retry_priority;
                RecordOutcome::Retried {
                    attempts: task.attempts,
                }
            }
        };
        task.result = Some(result);
        self.store.save(&key, &task).await?;

        match outcome {
            RecordOutcome::Retried { attempts } => {
                self.store
                    .mutate::<QueueRecord, _, _>(keys::TASK_QUEUE, move |record| {
                        let position = record
                            .queue
                            .iter()
                            .position(|queued| queued.priority > task.priority)
                            .unwrap_or(record.queue.len());
                        record.queue.insert(position, task);
                    })
                    .await?;
                info!(%task_id, attempts, "task requeued for retry");
            }
            RecordOutcome::Completed => {
                info!(%task_id, "task completed");
            }
            RecordOutcome::Exhausted { attempts } => {
                info!(%task_id, attempts, "task failed, attempt budget spent");
            }
            RecordOutcome::AlreadyTerminal => {}
        }
        Ok(outcome)
    }

    /// The lifecycle record for one task, queued or not.
    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        Ok(self.store.load(&keys::task_record(&task_id)).await?)
    }

    /// Pending tasks in serve order.
    pub async fn pending(&self) -> Result<Vec<Task>> {
        let record = self
            .store
            .load_or_default::<QueueRecord>(keys::TASK_QUEUE)
            .await?;
        Ok(record.queue)
    }

    /// Every task record ever written, newest first.
    ///
    /// Backs the inspection commands; the loop itself only reads the queue.
    pub async fn all_tasks(&self) -> Result<Vec<Task>> {
        let dir = self.store.root().join("tasks");
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut tasks = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(id) = name
                .strip_prefix("task_")
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };
            let Ok(id) = id.parse::<Uuid>() else { continue };
            if let Some(task) = self.store.load::<Task>(&keys::task_record(&id)).await? {
                tasks.push(task);
            }
        }
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }
}
