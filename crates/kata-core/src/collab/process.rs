//! Subprocess-based sandbox executor.

use std::io::Write;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{KataError, Result};

use super::{ExecutionOutcome, SandboxExecutor};

/// Runs generated code as a child process of a configured interpreter.
///
/// The code is written to a temp file the interpreter is pointed at. On
/// timeout the child is killed rather than left running.
pub struct ProcessExecutor {
    interpreter: Vec<String>,
    extension: String,
}

impl ProcessExecutor {
    /// Python executor, the default builder target.
    pub fn new() -> Self {
        Self::with_interpreter(vec!["python3".to_string()], "py")
    }

    /// Run code under an arbitrary interpreter command, e.g. `["node"]`
    /// with extension `js`.
    pub fn with_interpreter(interpreter: Vec<String>, extension: impl Into<String>) -> Self {
        Self {
            interpreter,
            extension: extension.into(),
        }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxExecutor for ProcessExecutor {
    async fn execute(&self, code: &str, timeout: Duration) -> Result<ExecutionOutcome> {
        let (program, args) = self
            .interpreter
            .split_first()
            .ok_or_else(|| KataError::Execution("empty interpreter command".to_string()))?;

        let mut file = tempfile::Builder::new()
            .prefix("kata-run-")
            .suffix(&format!(".{}", self.extension))
            .tempfile()?;
        file.write_all(code.as_bytes())?;

        let started = Instant::now();
        let child = tokio::process::Command::new(program)
            .args(args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the future on timeout kills the child via kill_on_drop.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| KataError::ExecutionTimeout(timeout))??;
        let duration = started.elapsed();

        let outcome = ExecutionOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            duration,
        };
        debug!(
            exit_code = outcome.exit_code,
            millis = duration.as_millis() as u64,
            "sandboxed run finished"
        );
        Ok(outcome)
    }
}
