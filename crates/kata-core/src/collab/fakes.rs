//! Scripted collaborator doubles for exercising the loop without real
//! generation or execution.
//!
//! Each double replays queued responses in order and falls back to a benign
//! default once the queue runs dry, so long-running loop tests do not need
//! exhaustive scripts.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::Task;
use crate::error::Result;
use crate::reflection::Reflection;

use super::{CodeGenerator, ExecutionOutcome, Reflector, SandboxExecutor};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A run that exited cleanly with a little output.
pub fn passing_outcome() -> ExecutionOutcome {
    ExecutionOutcome {
        stdout: "ok\n".to_string(),
        stderr: String::new(),
        exit_code: 0,
        duration: Duration::from_millis(40),
    }
}

/// A run that failed with the given exit code and stderr.
pub fn failing_outcome(exit_code: i32, stderr: &str) -> ExecutionOutcome {
    ExecutionOutcome {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code,
        duration: Duration::from_millis(40),
    }
}

#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<Uuid>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, response: Result<String>) {
        lock(&self.responses).push_back(response);
    }

    /// Task ids generation was requested for, in order.
    pub fn calls(&self) -> Vec<Uuid> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl CodeGenerator for ScriptedGenerator {
    async fn generate_code(&self, task: &Task) -> Result<String> {
        lock(&self.calls).push(task.id);
        match lock(&self.responses).pop_front() {
            Some(response) => response,
            None => Ok("print('ok')\n".to_string()),
        }
    }
}

#[derive(Default)]
pub struct ScriptedExecutor {
    responses: Mutex<VecDeque<Result<ExecutionOutcome>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, response: Result<ExecutionOutcome>) {
        lock(&self.responses).push_back(response);
    }

    /// Code snippets executed, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl SandboxExecutor for ScriptedExecutor {
    async fn execute(&self, code: &str, _timeout: Duration) -> Result<ExecutionOutcome> {
        lock(&self.calls).push(code.to_string());
        match lock(&self.responses).pop_front() {
            Some(response) => response,
            None => Ok(passing_outcome()),
        }
    }
}

#[derive(Default)]
pub struct ScriptedReflector {
    responses: Mutex<VecDeque<Result<Reflection>>>,
    calls: Mutex<Vec<Uuid>>,
}

impl ScriptedReflector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, response: Result<Reflection>) {
        lock(&self.responses).push_back(response);
    }

    /// Task ids reflected on, in order.
    pub fn calls(&self) -> Vec<Uuid> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Reflector for ScriptedReflector {
    async fn reflect(&self, task: &Task, _outcome: &ExecutionOutcome) -> Result<Reflection> {
        lock(&self.calls).push(task.id);
        match lock(&self.responses).pop_front() {
            Some(response) => response,
            None => Ok(Reflection::default()),
        }
    }
}
