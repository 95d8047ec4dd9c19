//! resources::data
//!
//! Read-only lookups. Each one clones into ephemeral storage, answers, and
//! leaves nothing behind.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::absent_if_missing;
use crate::auth::{self, AuthSpec};
use crate::core::cancel::CancelSignal;
use crate::core::state::{validate_tree_path, DesiredState, RefSummary};
use crate::core::types::Oid;
use crate::engine::{resolver, worktree, Engine, EngineError, ReconcilePlan, RepositoryHandle};
use crate::git::CloneOptions;
use crate::storage::Storage;

/// A repository's state at a ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    /// Remote URL
    pub url: String,
    /// Commit the ref resolved to
    pub head: Oid,
    /// Remote branches
    pub branches: Vec<RefSummary>,
    /// Remote tags
    pub tags: Vec<RefSummary>,
}

/// A file's content at a ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    /// URL joined with path
    pub id: String,
    /// File content
    pub content: String,
}

fn depth_for(engine: &Engine) -> Option<u32> {
    engine.config().shallow_reads().then_some(1)
}

/// Resolve `ref_name` on `url` and report the remote inventory.
///
/// The clone skips the initial checkout and is shallow when the engine
/// allows it and the transport supports it.
pub fn inspect_repository(
    engine: &Engine,
    url: &str,
    ref_name: &str,
    auth: &AuthSpec,
    cancel: &CancelSignal,
) -> Result<RepositoryInfo, EngineError> {
    let mut desired = DesiredState::new(url, ref_name);
    desired.auth = auth.clone();
    desired.validate()?;
    let auth = auth::resolve(&desired.auth)?;

    let handle = RepositoryHandle::clone_or_open(
        url,
        Storage::ephemeral()?,
        &auth,
        &CloneOptions {
            depth: depth_for(engine),
            checkout: false,
        },
        cancel,
    )?;
    let outcome = engine.reconcile(
        &handle,
        &desired,
        &ReconcilePlan::observe(ref_name),
        &auth,
        cancel,
    )?;
    Ok(RepositoryInfo {
        url: url.to_string(),
        head: outcome.observed.head,
        branches: outcome.observed.branches,
        tags: outcome.observed.tags,
    })
}

/// Content of `path` on `url`, at `ref_name` or the remote's default
/// branch. Returns `None` when the file does not exist there.
///
/// # Errors
///
/// [`EngineError::RefNotFound`] when `ref_name` resolves to nothing.
pub fn read_file(
    engine: &Engine,
    url: &str,
    ref_name: Option<&str>,
    path: &str,
    auth: &AuthSpec,
    cancel: &CancelSignal,
) -> Result<Option<FileContent>, EngineError> {
    let desired = DesiredState {
        auth: auth.clone(),
        ..DesiredState::new(url, ref_name.unwrap_or("HEAD"))
    };
    desired.validate()?;
    validate_tree_path(path)?;
    let auth = auth::resolve(&desired.auth)?;

    let handle = RepositoryHandle::clone_or_open(
        url,
        Storage::ephemeral()?,
        &auth,
        &CloneOptions {
            // an arbitrary revision may lie below a shallow boundary
            depth: ref_name.is_none().then(|| depth_for(engine)).flatten(),
            checkout: ref_name.is_none(),
        },
        cancel,
    )?;
    let git = handle.git();
    if let Some(name) = ref_name {
        let resolved = resolver::resolve(git, name)?;
        worktree::checkout(git, &resolved)?;
    }

    let content = absent_if_missing(worktree::read_file(git, path))?;
    debug!(url, path, found = content.is_some(), "read remote file");
    Ok(content.map(|content| FileContent {
        id: format!("{}/{}", url.trim_end_matches('/'), path),
        content,
    }))
}
