//! storage
//!
//! Backing storage for a managed repository.
//!
//! # Backends
//!
//! - **Ephemeral**: a process-private temporary directory, removed when the
//!   handle is dropped. Used for one-shot passes such as commit resources
//!   and read-only lookups.
//! - **Persistent**: a caller-chosen directory that survives the process.
//!   Parent directories are created on demand.
//!
//! Both hold a normal (non-bare) repository with exactly one working tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

/// Errors from storage management.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Creating the storage directory failed.
    #[error("failed to create storage at {path}: {source}")]
    Create {
        /// Directory being created
        path: PathBuf,
        /// Underlying cause
        source: io::Error,
    },

    /// Inspecting the storage location failed.
    #[error("failed to inspect storage at {path}: {source}")]
    Inspect {
        /// Directory being inspected
        path: PathBuf,
        /// Underlying cause
        source: io::Error,
    },

    /// Removing the storage failed.
    #[error("failed to remove storage at {path}: {source}")]
    Remove {
        /// Directory being removed
        path: PathBuf,
        /// Underlying cause
        source: io::Error,
    },
}

/// What currently occupies a storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationState {
    /// Nothing exists at the path.
    Missing,
    /// An empty directory.
    Empty,
    /// A directory holding a `.git` entry.
    Repository,
    /// Something else: a file, or a non-empty directory without `.git`.
    Foreign,
}

#[derive(Debug)]
enum Backing {
    Ephemeral(Option<TempDir>),
    Persistent,
}

/// A storage backend handle.
#[derive(Debug)]
pub struct Storage {
    backing: Backing,
    path: PathBuf,
}

impl Storage {
    /// Create fresh ephemeral storage.
    pub fn ephemeral() -> Result<Self, StorageError> {
        let dir = tempfile::Builder::new()
            .prefix("gitconverge-")
            .tempdir()
            .map_err(|source| StorageError::Create {
                path: std::env::temp_dir(),
                source,
            })?;
        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "created ephemeral storage");
        Ok(Self {
            backing: Backing::Ephemeral(Some(dir)),
            path,
        })
    }

    /// Use `path` as persistent storage. Nothing is created yet.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::Persistent,
            path: path.into(),
        }
    }

    /// Root of the working tree.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the storage disappears with this handle.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self.backing, Backing::Ephemeral(_))
    }

    /// Classify what is at the storage path.
    pub fn location_state(&self) -> Result<LocationState, StorageError> {
        let inspect = |source| StorageError::Inspect {
            path: self.path.clone(),
            source,
        };
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LocationState::Missing),
            Err(e) => return Err(inspect(e)),
        };
        if !meta.is_dir() {
            return Ok(LocationState::Foreign);
        }
        if self.path.join(".git").exists() {
            return Ok(LocationState::Repository);
        }
        let mut entries = fs::read_dir(&self.path).map_err(inspect)?;
        if entries.next().is_none() {
            Ok(LocationState::Empty)
        } else {
            Ok(LocationState::Foreign)
        }
    }

    /// Make sure the storage directory exists.
    pub fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.path).map_err(|source| StorageError::Create {
            path: self.path.clone(),
            source,
        })
    }

    /// Remove the storage entirely. Removing absent storage succeeds.
    pub fn teardown(&mut self) -> Result<(), StorageError> {
        let remove = |path: &Path, source| StorageError::Remove {
            path: path.to_path_buf(),
            source,
        };
        match &mut self.backing {
            Backing::Ephemeral(dir) => {
                if let Some(dir) = dir.take() {
                    dir.close().map_err(|e| remove(&self.path, e))?;
                }
                // the directory may have been recreated by a later clone
                remove_tree(&self.path).map_err(|e| remove(&self.path, e))?;
            }
            Backing::Persistent => {
                remove_tree(&self.path).map_err(|e| remove(&self.path, e))?;
            }
        }
        debug!(path = %self.path.display(), "storage removed");
        Ok(())
    }
}

fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
