//! flock(2)-based locks: one for journal appends, one per mutating run.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// An exclusive file lock. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("open lock file {}", path.display()))
}

impl FileLock {
    /// Acquire an exclusive lock, blocking until available.
    pub fn exclusive(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        file.lock_exclusive()
            .with_context(|| format!("acquire lock {}", path.display()))?;
        Ok(Self { _file: file })
    }

    /// Try to acquire an exclusive lock without blocking.
    /// Returns `Ok(None)` if another process holds it.
    pub fn try_exclusive(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { _file: file })),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            // fs2 on Linux may report EAGAIN as Other
            Err(ref e) if e.raw_os_error() == Some(11) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("try lock {}", path.display())),
        }
    }

    /// Lock the workspace for a mutating run, failing fast if another run holds it.
    pub fn for_run(path: &Path) -> Result<Self> {
        match Self::try_exclusive(path)? {
            Some(lock) => Ok(lock),
            None => bail!(
                "another keyfleet run is using this workspace (lock held on {})",
                path.display()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lock");
        let held = FileLock::for_run(&path).unwrap();
        let err = FileLock::for_run(&path).unwrap_err();
        assert!(err.to_string().contains("another keyfleet run"));
        drop(held);
        assert!(FileLock::for_run(&path).is_ok());
    }

    #[test]
    fn test_exclusive_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.lock");
        let _lock = FileLock::exclusive(&path).unwrap();
        assert!(path.exists());
        assert!(FileLock::try_exclusive(&path).unwrap().is_none());
    }
}
