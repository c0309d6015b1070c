//! Single-instance pidfile guard.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{Result, StoreError};

const LOCK_FILE: &str = "kata.pid";

/// Exclusive claim on a memory root, taken by the loop daemon at startup.
///
/// Acquisition fails if the pidfile already exists; a stale file left by a
/// killed daemon must be removed by the operator before restarting. The
/// file is removed when the lock is dropped.
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Claim `root` for this process.
    pub fn acquire(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let path = root.join(LOCK_FILE);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StoreError::InstanceHeld(path))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the pidfile backing this lock.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
