//! core::lock
//!
//! Exclusive cross-process lock on a persistent checkout.
//!
//! # Architecture
//!
//! The in-process registry serializes passes that share a handle. Two
//! processes pointed at the same on-disk checkout are serialized by this
//! lock instead: a mutating pass holds it from open until publish.
//!
//! # Storage
//!
//! - `<git_dir>/gitconverge/lock` - lock file with an OS-level exclusive lock
//!
//! # Invariants
//!
//! - Lock is released on drop (RAII)
//! - Acquisition is non-blocking and fails fast with [`LockError::AlreadyLocked`]

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("checkout {path} is locked by another gitconverge process")]
    AlreadyLocked {
        /// Lock file path
        path: PathBuf,
    },

    /// Failed to create lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),
}

/// An exclusive lock on one checkout, released on drop.
///
/// # Example
///
/// ```
/// use gitconverge::core::lock::RepoLock;
///
/// let dir = tempfile::TempDir::new().unwrap();
/// let lock = RepoLock::acquire(dir.path()).unwrap();
/// assert!(lock.path().ends_with("gitconverge/lock"));
/// assert!(RepoLock::acquire(dir.path()).is_err());
/// drop(lock);
/// assert!(RepoLock::acquire(dir.path()).is_ok());
/// ```
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    file: File,
}

impl RepoLock {
    /// Acquire the lock for the repository whose git directory is `git_dir`.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if another holder has it
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be taken
    pub fn acquire(git_dir: &Path) -> Result<Self, LockError> {
        let lock_dir = git_dir.join("gitconverge");
        fs::create_dir_all(&lock_dir).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", lock_dir.display(), e))
        })?;

        let path = lock_dir.join("lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { path, file }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(LockError::AlreadyLocked { path })
            }
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        // Best-effort; the OS drops the lock with the descriptor anyway
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_creates_lock_dir() {
        let temp = TempDir::new().unwrap();
        let lock = RepoLock::acquire(temp.path()).expect("acquire");
        assert_eq!(lock.path(), temp.path().join("gitconverge").join("lock"));
        assert!(lock.path().exists());
    }

    #[test]
    fn second_acquire_fails() {
        let temp = TempDir::new().unwrap();
        let _lock = RepoLock::acquire(temp.path()).expect("first acquire");
        assert!(matches!(
            RepoLock::acquire(temp.path()),
            Err(LockError::AlreadyLocked { .. })
        ));
    }

    #[test]
    fn released_on_drop() {
        let temp = TempDir::new().unwrap();
        {
            let _lock = RepoLock::acquire(temp.path()).expect("first acquire");
        }
        RepoLock::acquire(temp.path()).expect("second acquire");
    }

    #[test]
    fn error_display() {
        let err = LockError::AlreadyLocked {
            path: PathBuf::from("/x/.git/gitconverge/lock"),
        };
        assert!(err.to_string().contains("locked"));
        assert!(LockError::CreateFailed("t".into())
            .to_string()
            .contains("create"));
    }
}
