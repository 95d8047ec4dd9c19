//! engine::resolver
//!
//! Reference resolution with a fixed fallback order.
//!
//! A symbolic name is tried, in order, as:
//! 1. a remote-tracking branch (`refs/remotes/origin/<name>`)
//! 2. a local branch (`refs/heads/<name>`)
//! 3. a tag (`refs/tags/<name>`)
//! 4. a revision expression (full or abbreviated hash, `HEAD~1`, ...)
//!
//! The first hit wins. Remote branches come first because the remote is the
//! source of truth. "Not found" falls through; any other failure aborts.

use tracing::debug;

use super::errors::EngineError;
use crate::core::types::{Oid, RefName};
use crate::git::{Git, GitError, ORIGIN};

/// Which interpretation of a symbolic name produced the commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefInterpretation {
    /// `refs/remotes/origin/<name>`
    RemoteBranch,
    /// `refs/heads/<name>`
    LocalBranch,
    /// `refs/tags/<name>`
    Tag,
    /// A revision expression
    Revision,
}

impl RefInterpretation {
    /// Short label for diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            RefInterpretation::RemoteBranch => "remote-branch",
            RefInterpretation::LocalBranch => "local-branch",
            RefInterpretation::Tag => "tag",
            RefInterpretation::Revision => "revision",
        }
    }
}

/// A resolved symbolic name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    /// Commit the name resolved to
    pub oid: Oid,
    /// How it resolved
    pub interpretation: RefInterpretation,
    /// Full ref that matched; `None` for revisions
    pub refname: Option<RefName>,
}

/// Resolve `name` against the repository.
///
/// # Errors
///
/// - [`EngineError::RefNotFound`] if no interpretation matches
/// - [`EngineError::RefResolution`] on any other failure
pub fn resolve(git: &Git, name: &str) -> Result<ResolvedRef, EngineError> {
    let candidates = [
        (
            RefInterpretation::RemoteBranch,
            format!("{}{}/{}", RefName::REMOTES, ORIGIN, name),
        ),
        (
            RefInterpretation::LocalBranch,
            format!("{}{}", RefName::HEADS, name),
        ),
        (RefInterpretation::Tag, format!("{}{}", RefName::TAGS, name)),
    ];

    for (interpretation, refname) in candidates {
        if let Some(oid) = try_step(git.try_resolve_ref(&refname), name)? {
            debug!(refname = name, %oid, via = interpretation.as_str(), "resolved ref");
            return Ok(ResolvedRef {
                oid,
                interpretation,
                // only names that passed ref validation can have resolved
                refname: RefName::new(refname).ok(),
            });
        }
    }

    if let Some(oid) = try_step(git.try_revparse_commit(name), name)? {
        debug!(refname = name, %oid, via = "revision", "resolved ref");
        return Ok(ResolvedRef {
            oid,
            interpretation: RefInterpretation::Revision,
            refname: None,
        });
    }

    Err(EngineError::RefNotFound {
        refname: name.to_string(),
    })
}

/// Resolve a branch: remote-tracking first, then local.
pub fn resolve_branch(git: &Git, branch: &str) -> Result<ResolvedRef, EngineError> {
    let remote = format!("{}{}/{}", RefName::REMOTES, ORIGIN, branch);
    if let Some(oid) = try_step(git.try_resolve_ref(&remote), branch)? {
        return Ok(ResolvedRef {
            oid,
            interpretation: RefInterpretation::RemoteBranch,
            refname: RefName::new(remote).ok(),
        });
    }
    let local = format!("{}{}", RefName::HEADS, branch);
    if let Some(oid) = try_step(git.try_resolve_ref(&local), branch)? {
        return Ok(ResolvedRef {
            oid,
            interpretation: RefInterpretation::LocalBranch,
            refname: RefName::new(local).ok(),
        });
    }
    Err(EngineError::RefNotFound {
        refname: branch.to_string(),
    })
}

fn try_step(
    result: Result<Option<Oid>, GitError>,
    name: &str,
) -> Result<Option<Oid>, EngineError> {
    result.map_err(|source| EngineError::RefResolution {
        refname: name.to_string(),
        source,
    })
}
