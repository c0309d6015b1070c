//! Named JSON records with atomic replacement and per-key write locking.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::{Result, StoreError};

/// How long a writer sentinel may sit on disk before it is presumed
/// abandoned and stolen.
const STALE_LOCK: Duration = Duration::from_secs(10);

/// Poll interval while waiting for a sentinel held by another process.
const LOCK_RETRY: Duration = Duration::from_millis(25);

/// Store for named JSON records under a single memory root.
///
/// A key like `core/skill_map` maps to `<root>/core/skill_map.json`. Writes
/// go to a temp file in the record's directory and are renamed into place,
/// so readers observe either the previous or the new record, never a
/// partial one. Writers take a per-key async mutex (same process) plus an
/// on-disk sentinel file (other processes, e.g. the CLI next to the
/// daemon) so read-modify-write cycles do not lose updates.
pub struct JsonStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl JsonStore {
    /// Open a store rooted at `root`. Creates the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// The memory root this store writes under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Load a record, or `None` if it has never been written.
    ///
    /// A record that exists but fails to parse surfaces as
    /// [`StoreError::Corrupt`]; it is never coerced to a default.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.read_value(key)
    }

    /// Load a record, falling back to `T::default()` when missing.
    pub async fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        Ok(self.read_value(key)?.unwrap_or_default())
    }

    /// Atomically replace the record at `key` with `value`.
    pub async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock_owned().await;
        let _sentinel = WriteSentinel::acquire(&self.record_path(key)).await?;
        self.write_value(key, value)
    }

    /// Read-modify-write under the key's write locks.
    ///
    /// Missing records start from `T::default()`. Returns whatever the
    /// closure returns, after the new value is committed.
    pub async fn mutate<T, R, F>(&self, key: &str, f: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> R,
    {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock_owned().await;
        let _sentinel = WriteSentinel::acquire(&self.record_path(key)).await?;
        let mut value: T = self.read_value(key)?.unwrap_or_default();
        let out = f(&mut value);
        self.write_value(key, &value)?;
        Ok(out)
    }

    /// Append one entry to an array-shaped record, creating it if missing.
    pub async fn append<T: Serialize>(&self, key: &str, entry: &T) -> Result<()> {
        let entry = serde_json::to_value(entry).map_err(StoreError::Serialization)?;
        self.mutate::<Vec<serde_json::Value>, _, _>(key, |items| items.push(entry))
            .await
    }

    /// Set one field of an object-shaped record, preserving the rest.
    pub async fn update(&self, key: &str, field: &str, value: serde_json::Value) -> Result<()> {
        self.mutate::<serde_json::Map<String, serde_json::Value>, _, _>(key, |object| {
            object.insert(field.to_string(), value);
        })
        .await
    }

    fn read_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.record_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt { path, source })?;
        Ok(Some(value))
    }

    fn write_value<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.record_path(key);
        let parent = path.parent().expect("record path always has parent");
        fs::create_dir_all(parent)?;

        let bytes = serde_json::to_vec_pretty(value).map_err(StoreError::Serialization)?;

        // Atomic write: write to temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(())
    }
}

/// On-disk writer sentinel guarding one record across processes.
///
/// Created with `create_new`, removed on drop. A sentinel older than
/// [`STALE_LOCK`] is treated as abandoned by a crashed writer and stolen.
struct WriteSentinel {
    path: PathBuf,
}

impl WriteSentinel {
    async fn acquire(record_path: &Path) -> Result<Self> {
        let path = record_path.with_extension("json.lock");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if sentinel_is_stale(&path) {
                        tracing::warn!(path = %path.display(), "stealing stale write sentinel");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn sentinel_is_stale(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        // Vanished between the failed create and here: retry immediately.
        return true;
    };
    match metadata.modified().map(|m| m.elapsed()) {
        Ok(Ok(age)) => age > STALE_LOCK,
        _ => false,
    }
}

impl Drop for WriteSentinel {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
