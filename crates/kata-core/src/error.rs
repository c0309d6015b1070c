//! Error taxonomy for the practice loop.

use std::time::Duration;

use kata_store::StoreError;

/// Errors produced while driving a practice cycle.
#[derive(Debug, thiserror::Error)]
pub enum KataError {
    #[error("code generation failed: {0}")]
    Generation(String),

    #[error("code generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("execution timed out after {0:?}")]
    ExecutionTimeout(Duration),

    #[error("reflection failed: {0}")]
    Reflection(String),

    #[error("task {task_id} exhausted all {attempts} attempts")]
    RetryExhausted { task_id: uuid::Uuid, attempts: u32 },

    #[error("task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal invariant broken: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KataError {
    /// Fatal errors halt the loop. Everything else is converted into a
    /// failed attempt and the loop keeps going.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KataError::Store(e) if e.is_corrupt())
    }
}

/// Result type for kata-core operations.
pub type Result<T> = std::result::Result<T, KataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_store_is_fatal() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = KataError::Store(StoreError::Corrupt {
            path: "memory/core/score_log.json".into(),
            source,
        });
        assert!(err.is_fatal());
    }

    #[test]
    fn collaborator_errors_are_recoverable() {
        assert!(!KataError::Generation("model unavailable".into()).is_fatal());
        assert!(!KataError::ExecutionTimeout(Duration::from_secs(120)).is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!KataError::Store(StoreError::Io(io)).is_fatal());
    }

    #[test]
    fn retry_exhausted_names_the_task() {
        let task_id = uuid::Uuid::new_v4();
        let err = KataError::RetryExhausted {
            task_id,
            attempts: 3,
        };
        assert!(err.to_string().contains(&task_id.to_string()));
        assert!(err.to_string().contains('3'));
    }
}
