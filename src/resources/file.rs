//! resources::file
//!
//! One file inside a checkout managed by a repository resource.
//!
//! The `repository` field names a registry id. A checkout directory on disk
//! is accepted as well, for checkouts left by an earlier process.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::absent_if_missing;
use crate::core::lock::RepoLock;
use crate::core::state::{validate_tree_path, FileEntry};
use crate::engine::{worktree, Engine, EngineError};
use crate::git::Git;

/// Declared file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileDescriptor {
    /// Registry id or checkout directory
    pub repository: String,
    /// Tree-relative path
    pub path: String,
    /// File content
    #[serde(default)]
    pub content: String,
}

impl FileDescriptor {
    /// External identity: repository joined with path.
    pub fn id(&self) -> String {
        file_id(&self.repository, &self.path)
    }
}

/// Observed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// Repository joined with path
    pub id: String,
    /// Current content
    pub content: String,
}

fn file_id(repository: &str, path: &str) -> String {
    format!("{}/{}", repository.trim_end_matches('/'), path)
}

/// File lifecycle over an [`Engine`].
#[derive(Debug, Clone, Copy)]
pub struct FileResource<'e> {
    engine: &'e Engine,
}

impl<'e> FileResource<'e> {
    /// Adapter over `engine`.
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// Write the declared content.
    ///
    /// # Errors
    ///
    /// [`EngineError::RepositoryNotFound`] if the repository is unknown.
    pub fn create(&self, descriptor: &FileDescriptor) -> Result<FileState, EngineError> {
        validate_tree_path(&descriptor.path)?;
        let entry = FileEntry::file(descriptor.path.as_str(), descriptor.content.as_str());
        self.with_checkout(&descriptor.repository, true, |git| {
            worktree::write_files(git, std::slice::from_ref(&entry)).map(|_| ())
        })?
        .ok_or_else(|| EngineError::RepositoryNotFound {
            path: PathBuf::from(&descriptor.repository),
        })?;
        debug!(id = %descriptor.id(), "file written");
        Ok(FileState {
            id: descriptor.id(),
            content: descriptor.content.clone(),
        })
    }

    /// Current content, or `None` when the repository or the file is gone.
    pub fn read(&self, repository: &str, path: &str) -> Result<Option<FileState>, EngineError> {
        validate_tree_path(path)?;
        let content = self
            .with_checkout(repository, false, |git| {
                absent_if_missing(worktree::read_file(git, path))
            })?
            .flatten();
        Ok(content.map(|content| FileState {
            id: file_id(repository, path),
            content,
        }))
    }

    /// Rewrite the file with the new content.
    pub fn update(&self, descriptor: &FileDescriptor) -> Result<FileState, EngineError> {
        self.create(descriptor)
    }

    /// Remove the file. A missing file or repository is not an error.
    pub fn delete(&self, descriptor: &FileDescriptor) -> Result<(), EngineError> {
        validate_tree_path(&descriptor.path)?;
        let removed = self.with_checkout(&descriptor.repository, true, |git| {
            worktree::remove_files(git, &[descriptor.path.as_str()])
        })?;
        debug!(id = %descriptor.id(), found = removed.is_some(), "file removed");
        Ok(())
    }

    /// Run `f` against the checkout behind `repository`, or return `None`
    /// when there is none. Exclusive access also takes the on-disk lock.
    fn with_checkout<T>(
        &self,
        repository: &str,
        exclusive: bool,
        f: impl FnOnce(&Git) -> Result<T, EngineError>,
    ) -> Result<Option<T>, EngineError> {
        let run = |path: Option<&Path>, is_ephemeral: bool| -> Result<Option<T>, EngineError> {
            let Some(path) = path else {
                return Ok(None);
            };
            let git = match Git::open(path) {
                Ok(git) => git,
                Err(source) if source.is_not_found() => return Ok(None),
                Err(source) => {
                    return Err(EngineError::Open {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            };
            let _lock = if exclusive && !is_ephemeral {
                Some(RepoLock::acquire(git.git_dir())?)
            } else {
                None
            };
            f(&git).map(Some)
        };

        match self.engine.registry().get(repository) {
            Some(shared) if exclusive => shared.write(|slot| {
                let ephemeral = slot.storage.as_ref().is_some_and(|s| s.is_ephemeral());
                run(slot.path(), ephemeral)
            }),
            Some(shared) => shared.read(|slot| {
                let ephemeral = slot.storage.as_ref().is_some_and(|s| s.is_ephemeral());
                run(slot.path(), ephemeral)
            }),
            None => {
                let dir = Path::new(repository);
                if dir.is_dir() {
                    run(Some(dir), false)
                } else {
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_joins_repository_and_path() {
        let descriptor = FileDescriptor {
            repository: "docs/".into(),
            path: "guide/intro.md".into(),
            content: String::new(),
        };
        assert_eq!(descriptor.id(), "docs/guide/intro.md");
    }

    #[test]
    fn unknown_repository_is_absent() {
        let engine = Engine::default();
        let files = FileResource::new(&engine);
        assert!(files.read("nowhere", "a.txt").unwrap().is_none());
        let descriptor = FileDescriptor {
            repository: "nowhere".into(),
            path: "a.txt".into(),
            content: "x".into(),
        };
        assert!(files.delete(&descriptor).is_ok());
        assert!(files.create(&descriptor).unwrap_err().is_not_found());
    }
}
