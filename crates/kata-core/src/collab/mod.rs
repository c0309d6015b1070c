//! Seams to the builder collaborators.
//!
//! The loop drives three external capabilities through traits: generating
//! code for a task, executing that code in a sandbox, and reflecting on the
//! outcome. Production wiring plugs real collaborators in here; tests plug
//! in the scripted doubles from [`fakes`].

pub mod fakes;
pub mod process;
pub mod shims;

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::Task;
use crate::error::Result;
use crate::reflection::Reflection;

/// What one sandboxed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Produces runnable source code for a task.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate_code(&self, task: &Task) -> Result<String>;

    /// File extension the generated code should be archived under.
    fn language_extension(&self) -> &str {
        "py"
    }
}

/// Runs generated code under a wall-clock limit.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn execute(&self, code: &str, timeout: Duration) -> Result<ExecutionOutcome>;
}

/// Turns a finished run into strengths, weaknesses, and lessons.
#[async_trait]
pub trait Reflector: Send + Sync {
    async fn reflect(&self, task: &Task, outcome: &ExecutionOutcome) -> Result<Reflection>;
}
