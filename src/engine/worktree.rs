//! engine::worktree
//!
//! Working-tree synchronization: forced checkout, declared file writes,
//! idempotent removals, and reads.
//!
//! Multi-file writes are not transactional. A failure partway through a
//! file list leaves the earlier files written; the next pass starts with a
//! forced checkout, so nothing leaks into a later commit.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::errors::EngineError;
use super::resolver::ResolvedRef;
use crate::core::state::{validate_tree_path, FileEntry};
use crate::git::Git;

fn work_dir(git: &Git) -> Result<PathBuf, EngineError> {
    git.work_dir()
        .map(Path::to_path_buf)
        .map_err(|source| EngineError::Open {
            path: git.git_dir().to_path_buf(),
            source,
        })
}

/// Force the working tree to the resolved commit.
pub fn checkout(git: &Git, resolved: &ResolvedRef) -> Result<(), EngineError> {
    debug!(oid = %resolved.oid, via = resolved.interpretation.as_str(), "checking out");
    git.checkout_detached(&resolved.oid)
        .map_err(|source| EngineError::Checkout {
            oid: resolved.oid.to_string(),
            source,
        })
}

/// Write every declared file that carries content, creating parent
/// directories. Returns the paths written, in declaration order.
///
/// # Errors
///
/// [`EngineError::FileWrite`] for the first path that fails.
pub fn write_files(git: &Git, files: &[FileEntry]) -> Result<Vec<String>, EngineError> {
    let root = work_dir(git)?;
    let mut written = Vec::new();
    for entry in files {
        let FileEntry::Path {
            path,
            content: Some(content),
        } = entry
        else {
            continue;
        };
        validate_tree_path(path)?;
        write_one(&root.join(path), content).map_err(|source| EngineError::FileWrite {
            path: path.clone(),
            source,
        })?;
        written.push(path.clone());
    }
    debug!(count = written.len(), "wrote declared files");
    Ok(written)
}

fn write_one(target: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, content)
}

/// Delete paths from the working tree and the index. Missing paths are
/// skipped.
pub fn remove_files<S: AsRef<str>>(git: &Git, paths: &[S]) -> Result<(), EngineError> {
    let root = work_dir(git)?;
    for path in paths {
        let path = path.as_ref();
        validate_tree_path(path)?;
        let target = root.join(path);
        let removed = match fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&target),
            Ok(_) => fs::remove_file(&target),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        };
        removed.map_err(|source| EngineError::FileRemove {
            path: path.to_string(),
            source,
        })?;
        git.remove_from_index(path)
            .map_err(|source| EngineError::Stage {
                item: path.to_string(),
                source,
            })?;
    }
    Ok(())
}

/// Read a tree-relative file as UTF-8.
///
/// A missing file yields an [`EngineError::FileRead`] whose kind is
/// `NotFound`.
pub fn read_file(git: &Git, path: &str) -> Result<String, EngineError> {
    validate_tree_path(path)?;
    let root = work_dir(git)?;
    fs::read_to_string(root.join(path)).map_err(|source| EngineError::FileRead {
        path: path.to_string(),
        source,
    })
}
