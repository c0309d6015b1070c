//! Digest-addressed archive for generated program text.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::Result;

/// Archive of every program the generator produced, kept per task.
///
/// Layout: `<root>/<task_id>/<first 16 digest hex chars>.<ext>`. Identical
/// code archived twice lands on the same path, so retries of an unchanged
/// program do not pile up copies.
pub struct CodeArchive {
    root: PathBuf,
}

impl CodeArchive {
    /// Create an archive rooted at `root`. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn entry_path(&self, task_id: &str, extension: &str, code: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(code.as_bytes()));
        self.root
            .join(task_id)
            .join(format!("{}.{extension}", &digest[..16]))
    }

    /// Archive `code` for `task_id` and return the path it was stored at.
    pub fn store(&self, task_id: &str, extension: &str, code: &str) -> Result<PathBuf> {
        let path = self.entry_path(task_id, extension, code);
        if path.exists() {
            return Ok(path);
        }

        let task_dir = path.parent().expect("archive path always has parent");
        fs::create_dir_all(task_dir)?;

        let mut tmp = NamedTempFile::new_in(task_dir)?;
        tmp.write_all(code.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(path)
    }

    /// All archived entries for `task_id`, sorted by file name. A task that
    /// never archived anything yields an empty list.
    pub fn list(&self, task_id: &str) -> Result<Vec<PathBuf>> {
        let task_dir = self.root.join(task_id);
        let entries = match fs::read_dir(&task_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_archive() -> (tempfile::TempDir, CodeArchive) {
        let dir = tempfile::tempdir().unwrap();
        let archive = CodeArchive::new(dir.path()).unwrap();
        (dir, archive)
    }

    #[test]
    fn store_and_list() {
        let (_dir, archive) = make_archive();
        let path = archive.store("task-1", "py", "print('hi')").unwrap();
        assert!(path.is_file());
        let listed = archive.list("task-1").unwrap();
        assert_eq!(listed, vec![path]);
    }

    #[test]
    fn identical_code_dedupes() {
        let (_dir, archive) = make_archive();
        let a = archive.store("task-1", "py", "print('hi')").unwrap();
        let b = archive.store("task-1", "py", "print('hi')").unwrap();
        assert_eq!(a, b);
        assert_eq!(archive.list("task-1").unwrap().len(), 1);
    }

    #[test]
    fn different_attempts_kept_apart() {
        let (_dir, archive) = make_archive();
        archive.store("task-1", "py", "print('first')").unwrap();
        archive.store("task-1", "py", "print('second')").unwrap();
        assert_eq!(archive.list("task-1").unwrap().len(), 2);
    }

    #[test]
    fn unknown_task_lists_empty() {
        let (_dir, archive) = make_archive();
        assert!(archive.list("never-ran").unwrap().is_empty());
    }
}
