//! engine::commit
//!
//! Stage the declared files and, only if something changed, create a commit
//! on top of the checked-out head.

use tracing::{debug, info};

use super::errors::EngineError;
use crate::core::state::{FileEntry, Identity};
use crate::core::types::Oid;
use crate::git::Git;

/// What to commit.
#[derive(Debug, Clone, Copy)]
pub struct CommitRequest<'a> {
    /// Declared entries to stage, in order
    pub files: &'a [FileEntry],
    /// Paths removed from the tree this pass
    pub removed: &'a [String],
    /// Commit message
    pub message: &'a str,
    /// Author override from the declaration
    pub author: Option<&'a Identity>,
}

/// Result of the commit step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Head after the step
    pub oid: Oid,
    /// Whether the step created `oid`
    pub is_new: bool,
}

/// Stage `request` and commit if the staged tree differs from head.
///
/// Staging always runs. Status omits ignored paths, so the tree comparison
/// alone decides whether a commit is needed.
pub fn build(
    git: &Git,
    request: &CommitRequest<'_>,
    fallback: &Identity,
) -> Result<CommitOutcome, EngineError> {
    let head = git.head_oid().map_err(|source| EngineError::RefResolution {
        refname: "HEAD".to_string(),
        source,
    })?;

    stage(git, request)?;

    let tree = git
        .write_index_tree()
        .map_err(|source| EngineError::CommitCreate { source })?;
    let head_tree = git
        .commit_tree_id(&head)
        .map_err(|source| EngineError::CommitCreate { source })?;
    if tree == head_tree {
        debug!(%head, "staged tree matches head; keeping head");
        return Ok(CommitOutcome {
            oid: head,
            is_new: false,
        });
    }

    let author = select_author(git, request.author, fallback);
    let oid = git
        .create_commit(&tree, Some(&head), request.message, &author)
        .map_err(|source| EngineError::CommitCreate { source })?;
    git.set_head_detached(&oid)
        .map_err(|source| EngineError::UpdateRef {
            refname: "HEAD".to_string(),
            source,
        })?;
    info!(parent = %head.short(7), commit = %oid.short(7), "created commit");
    Ok(CommitOutcome { oid, is_new: true })
}

fn stage(git: &Git, request: &CommitRequest<'_>) -> Result<(), EngineError> {
    for entry in request.files {
        let staged = match entry {
            FileEntry::Path { path, .. } => git.stage_path(path),
            FileEntry::Pattern { pattern } => git.stage_pattern(pattern),
        };
        staged.map_err(|source| EngineError::Stage {
            item: entry.target().to_string(),
            source,
        })?;
    }
    for path in request.removed {
        git.stage_path(path).map_err(|source| EngineError::Stage {
            item: path.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Author precedence: declaration, `GIT_AUTHOR_NAME`/`GIT_AUTHOR_EMAIL`,
/// repository config, then `fallback`.
fn select_author(git: &Git, declared: Option<&Identity>, fallback: &Identity) -> Identity {
    if let Some(author) = declared {
        return author.clone();
    }
    let env = std::env::var("GIT_AUTHOR_NAME")
        .ok()
        .zip(std::env::var("GIT_AUTHOR_EMAIL").ok())
        .filter(|(name, email)| !name.is_empty() && !email.is_empty());
    if let Some((name, email)) = env {
        return Identity { name, email };
    }
    git.config_identity().unwrap_or_else(|| fallback.clone())
}
