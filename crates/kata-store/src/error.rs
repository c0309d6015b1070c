//! Error types for kata-store

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A record exists on disk but does not parse. This is fatal for the
    /// control loop: the record is never silently replaced with a default.
    #[error("corrupt record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Value could not be serialized for writing
    #[error("serialization failed: {0}")]
    Serialization(serde_json::Error),

    /// Another process already holds the instance lock
    #[error("another instance holds the lock at {0}")]
    InstanceHeld(PathBuf),
}

impl StoreError {
    /// True for errors that indicate unusable on-disk state rather than a
    /// transient failure.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Corrupt { .. })
    }
}
