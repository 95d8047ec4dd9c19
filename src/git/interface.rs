//! git::interface
//!
//! Local repository operations on top of git2.
//!
//! # Architecture
//!
//! The `Git` struct is the only way to interact with a repository. No other
//! module imports `git2`. This keeps error normalization in one place and
//! strong types (`Oid`, `RefName`, `BranchName`) at the boundary.
//!
//! Network operations (clone, fetch, push, remote listing) live in
//! [`super::transport`] as further `impl Git` blocks.
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: no repository at the path
//! - [`GitError::RefNotFound`]: requested ref does not exist
//! - [`GitError::CasFailed`]: compare-and-swap precondition failed
//! - [`GitError::AuthRejected`]: the remote refused the credentials
//! - [`GitError::NonFastForward`]: the remote refused a history rewrite
//! - [`GitError::Transport`]: any other network-level failure

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::state::Identity;
use crate::core::types::{Oid, RefName, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// No repository at the given path.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Compare-and-swap precondition failed.
    #[error("CAS failed for {refname}: expected {expected}, found {actual}")]
    CasFailed {
        /// The ref being updated
        refname: String,
        /// The expected old value
        expected: String,
        /// The actual current value
        actual: String,
    },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID that was not found
        oid: String,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// Invalid ref name format.
    #[error("invalid ref name: {message}")]
    InvalidRefName {
        /// Description of the problem
        message: String,
    },

    /// Permission or filesystem error.
    #[error("repository access error: {message}")]
    AccessError {
        /// Description of the error
        message: String,
    },

    /// The remote refused the supplied credentials.
    #[error("authentication rejected by {url}: {message}")]
    AuthRejected {
        /// Remote URL
        url: String,
        /// Underlying cause
        message: String,
    },

    /// The SSH host key did not match the declared known hosts.
    #[error("host key verification failed for {host}")]
    HostKeyRejected {
        /// Host that presented the key
        host: String,
    },

    /// The operation observed a cancellation request.
    #[error("operation cancelled")]
    Cancelled,

    /// The remote refused a non-fast-forward update.
    #[error("non-fast-forward update rejected for {refname}: {message}")]
    NonFastForward {
        /// Ref being pushed
        refname: String,
        /// Remote status message
        message: String,
    },

    /// The remote refused the ref update for another reason.
    #[error("push of {refname} rejected: {message}")]
    PushRejected {
        /// Ref being pushed
        refname: String,
        /// Remote status message
        message: String,
    },

    /// Network or protocol failure talking to a remote.
    #[error("transport error for {url}: {message}")]
    Transport {
        /// Remote URL
        url: String,
        /// Underlying cause
        message: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    pub(super) fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => {
                if context.starts_with("refs/") || context == "HEAD" {
                    GitError::RefNotFound {
                        refname: context.to_string(),
                    }
                } else {
                    GitError::ObjectNotFound {
                        oid: context.to_string(),
                    }
                }
            }
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            _ if err.class() == git2::ErrorClass::Os => GitError::AccessError {
                message: format!("{}: {}", context, err.message()),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }

    /// Whether the error means "this thing is not there".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GitError::NotARepo { .. } | GitError::RefNotFound { .. } | GitError::ObjectNotFound { .. }
        )
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            TypeError::InvalidRefName(msg) => GitError::InvalidRefName { message: msg },
            TypeError::InvalidBranchName(msg) => GitError::InvalidRefName { message: msg },
        }
    }
}

/// A ref with its name and target OID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    /// The full ref name
    pub name: RefName,
    /// The commit the ref peels to
    pub oid: Oid,
}

/// Convert a git2 oid into the validated type.
pub(super) fn to_oid(oid: git2::Oid) -> Result<Oid, GitError> {
    Oid::new(oid.to_string()).map_err(GitError::from)
}

fn to_git2_oid(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

/// The Git interface.
///
/// Wraps one non-bare repository. `git2::Repository` is `Send` but not
/// `Sync`, so a `Git` value belongs to one pass at a time; shared access
/// goes through the engine's registry, which reopens per guarded access.
pub struct Git {
    /// The underlying git2 repository
    pub(super) repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Repository Opening and Info
    // =========================================================================

    /// Open the repository whose working tree is exactly `path`.
    ///
    /// Parent directories are not searched: a storage location either holds
    /// a repository or it does not.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if `path` is not a repository
    /// - [`GitError::BareRepo`] if the repository has no working directory
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open(path).map_err(|e| match e.code() {
            git2::ErrorCode::NotFound => GitError::NotARepo {
                path: path.to_path_buf(),
            },
            _ => GitError::from_git2(e, &path.display().to_string()),
        })?;

        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }

        Ok(Self { repo })
    }

    /// Get direct access to the .git directory path.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// The working tree root.
    pub fn work_dir(&self) -> Result<&Path, GitError> {
        self.repo.workdir().ok_or(GitError::BareRepo)
    }

    /// URL of the `origin` remote, if configured.
    pub fn origin_url(&self) -> Result<Option<String>, GitError> {
        match self.repo.find_remote(super::ORIGIN) {
            Ok(remote) => Ok(remote.url().map(str::to_string)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, super::ORIGIN)),
        }
    }

    // =========================================================================
    // Ref Resolution
    // =========================================================================

    /// Resolve a ref to the commit it peels to.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn resolve_ref(&self, refname: &str) -> Result<Oid, GitError> {
        let reference = self
            .repo
            .find_reference(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;

        let commit = reference
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, refname))?;

        to_oid(commit.id())
    }

    /// Resolve a ref, returning None if it doesn't exist.
    ///
    /// A malformed name counts as "doesn't exist": no ref can carry it.
    pub fn try_resolve_ref(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.resolve_ref(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) | Err(GitError::InvalidOid { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve a revision expression (hash, abbreviated hash, `HEAD~1`, ...)
    /// to a commit, returning None if nothing matches.
    pub fn try_revparse_commit(&self, spec: &str) -> Result<Option<Oid>, GitError> {
        let object = match self.repo.revparse_single(spec) {
            Ok(object) => object,
            Err(e) if is_missing(&e) => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, spec)),
        };
        match object.peel_to_commit() {
            Ok(commit) => Ok(Some(to_oid(commit.id())?)),
            Err(e) if is_missing(&e) || e.code() == git2::ErrorCode::Peel => Ok(None),
            Err(e) => Err(GitError::from_git2(e, spec)),
        }
    }

    /// Get HEAD commit OID.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if HEAD is unborn (empty repository)
    pub fn head_oid(&self) -> Result<Oid, GitError> {
        let head = self.repo.head().map_err(|e| match e.code() {
            git2::ErrorCode::UnbornBranch => GitError::RefNotFound {
                refname: "HEAD".to_string(),
            },
            _ => GitError::from_git2(e, "HEAD"),
        })?;

        let commit = head
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;

        to_oid(commit.id())
    }

    // =========================================================================
    // Ref Enumeration
    // =========================================================================

    /// List all refs matching a prefix, sorted by name.
    ///
    /// Symbolic refs (such as `refs/remotes/origin/HEAD`) and refs that do
    /// not peel to a commit are skipped.
    pub fn list_refs_by_prefix(&self, prefix: &str) -> Result<Vec<RefEntry>, GitError> {
        let pattern = format!("{}*", prefix);
        let refs = self
            .repo
            .references_glob(&pattern)
            .map_err(|e| GitError::from_git2(e, prefix))?;

        let mut entries = Vec::new();
        for reference in refs {
            let reference = reference.map_err(|e| GitError::from_git2(e, prefix))?;

            if reference.kind() == Some(git2::ReferenceType::Symbolic) {
                continue;
            }

            // Skip refs with non-UTF8 or invalid names
            let Some(ref_name) = reference.name().and_then(|n| RefName::new(n).ok()) else {
                continue;
            };

            let Ok(commit) = reference.peel_to_commit() else {
                continue;
            };

            entries.push(RefEntry {
                name: ref_name,
                oid: to_oid(commit.id())?,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    // =========================================================================
    // CAS Ref Operations
    // =========================================================================

    /// Update a ref with compare-and-swap semantics.
    ///
    /// The update only succeeds if the ref's current value matches
    /// `expected_old`. If `expected_old` is `None`, the ref must not exist.
    ///
    /// # Errors
    ///
    /// - [`GitError::CasFailed`] if the current value doesn't match expected
    pub fn update_ref_cas(
        &self,
        refname: &RefName,
        new_oid: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError> {
        let refname = refname.as_str();
        let current = self.try_resolve_ref_raw(refname)?;

        match (expected_old, current.as_deref()) {
            (Some(expected), Some(actual)) if expected.as_str() != actual => {
                return Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
            (Some(expected), None) => {
                return Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: expected.to_string(),
                    actual: "<none>".to_string(),
                });
            }
            (None, Some(actual)) => {
                return Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: "<none>".to_string(),
                    actual: actual.to_string(),
                });
            }
            _ => {}
        }

        self.repo
            .reference(refname, to_git2_oid(new_oid)?, true, message)
            .map_err(|e| GitError::from_git2(e, refname))?;

        Ok(())
    }

    /// Raw target of a ref, following symbolic refs, without peeling.
    fn try_resolve_ref_raw(&self, refname: &str) -> Result<Option<String>, GitError> {
        match self.repo.find_reference(refname) {
            Ok(reference) => {
                let resolved = reference
                    .resolve()
                    .map_err(|e| GitError::from_git2(e, refname))?;
                let oid = resolved.target().ok_or_else(|| GitError::Internal {
                    message: format!("ref {} has no target", refname),
                })?;
                Ok(Some(oid.to_string()))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }

    // =========================================================================
    // Working Tree
    // =========================================================================

    /// Force the working tree and index to `oid` and detach HEAD there.
    ///
    /// Local modifications and untracked files are discarded.
    pub fn checkout_detached(&self, oid: &Oid) -> Result<(), GitError> {
        let commit = self
            .repo
            .find_commit(to_git2_oid(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;

        self.repo
            .set_head_detached(commit.id())
            .map_err(|e| GitError::from_git2(e, "HEAD"))
    }

    /// Move a detached HEAD without touching the working tree.
    pub fn set_head_detached(&self, oid: &Oid) -> Result<(), GitError> {
        self.repo
            .set_head_detached(to_git2_oid(oid)?)
            .map_err(|e| GitError::from_git2(e, "HEAD"))
    }

    /// Paths that differ between HEAD, the index, and the working tree.
    ///
    /// Untracked files count (recursively); ignored files do not.
    pub fn changed_paths(&self) -> Result<BTreeSet<String>, GitError> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .renames_head_to_index(false);

        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(|e| GitError::from_git2(e, "status"))?;

        let mut paths = BTreeSet::new();
        for entry in statuses.iter() {
            if entry.status().is_empty() || entry.status() == git2::Status::CURRENT {
                continue;
            }
            if let Some(path) = entry.path() {
                paths.insert(path.to_string());
            }
        }
        Ok(paths)
    }

    // =========================================================================
    // Index
    // =========================================================================

    /// Stage one tree-relative path.
    ///
    /// A file is added, a directory is added recursively, and a path that no
    /// longer exists is removed from the index. Removing a path the index
    /// never held is not an error.
    pub fn stage_path(&self, path: &str) -> Result<(), GitError> {
        let on_disk = self.work_dir()?.join(path);
        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;

        if on_disk.is_file() {
            index
                .add_path(Path::new(path))
                .map_err(|e| GitError::from_git2(e, path))?;
        } else if on_disk.is_dir() {
            let spec = format!("{}/*", path.trim_end_matches('/'));
            index
                .add_all([spec.as_str()], git2::IndexAddOption::DEFAULT, None)
                .map_err(|e| GitError::from_git2(e, path))?;
            index
                .update_all([spec.as_str()], None)
                .map_err(|e| GitError::from_git2(e, path))?;
        } else {
            remove_entry(&mut index, path)?;
        }

        index.write().map_err(|e| GitError::from_git2(e, "index"))
    }

    /// Stage every path matching a glob pattern: new and modified files are
    /// added, tracked files that vanished are removed.
    pub fn stage_pattern(&self, pattern: &str) -> Result<(), GitError> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        index
            .add_all([pattern], git2::IndexAddOption::DEFAULT, None)
            .map_err(|e| GitError::from_git2(e, pattern))?;
        index
            .update_all([pattern], None)
            .map_err(|e| GitError::from_git2(e, pattern))?;
        index.write().map_err(|e| GitError::from_git2(e, "index"))
    }

    /// Drop a path from the index, tolerating paths that are not tracked.
    pub fn remove_from_index(&self, path: &str) -> Result<(), GitError> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        remove_entry(&mut index, path)?;
        index.write().map_err(|e| GitError::from_git2(e, "index"))
    }

    /// Write the index as a tree object.
    pub fn write_index_tree(&self) -> Result<Oid, GitError> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        let tree = index
            .write_tree()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        to_oid(tree)
    }

    /// Tree id of a commit.
    pub fn commit_tree_id(&self, commit: &Oid) -> Result<Oid, GitError> {
        let commit_obj = self
            .repo
            .find_commit(to_git2_oid(commit)?)
            .map_err(|e| GitError::from_git2(e, commit.as_str()))?;
        to_oid(commit_obj.tree_id())
    }

    // =========================================================================
    // Commits
    // =========================================================================

    /// Create a commit object for `tree` with an optional parent.
    ///
    /// No ref is moved; publishing is the caller's job.
    pub fn create_commit(
        &self,
        tree: &Oid,
        parent: Option<&Oid>,
        message: &str,
        author: &Identity,
    ) -> Result<Oid, GitError> {
        let tree = self
            .repo
            .find_tree(to_git2_oid(tree)?)
            .map_err(|e| GitError::from_git2(e, tree.as_str()))?;

        let parent = match parent {
            Some(oid) => Some(
                self.repo
                    .find_commit(to_git2_oid(oid)?)
                    .map_err(|e| GitError::from_git2(e, oid.as_str()))?,
            ),
            None => None,
        };
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let signature = git2::Signature::now(&author.name, &author.email)
            .map_err(|e| GitError::from_git2(e, "signature"))?;

        let oid = self
            .repo
            .commit(None, &signature, &signature, message, &tree, &parents)
            .map_err(|e| GitError::from_git2(e, "commit"))?;
        to_oid(oid)
    }

    /// `user.name` / `user.email` from the repository's config stack.
    pub fn config_identity(&self) -> Option<Identity> {
        let config = self.repo.config().ok()?;
        let name = config.get_string("user.name").ok()?;
        let email = config.get_string("user.email").ok()?;
        if name.is_empty() || email.is_empty() {
            return None;
        }
        Some(Identity { name, email })
    }
}

fn is_missing(err: &git2::Error) -> bool {
    matches!(
        err.code(),
        git2::ErrorCode::NotFound | git2::ErrorCode::InvalidSpec | git2::ErrorCode::Ambiguous
    )
}

fn remove_entry(index: &mut git2::Index, path: &str) -> Result<(), GitError> {
    match index.remove_path(Path::new(path)) {
        Ok(()) => Ok(()),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(()),
        Err(e) => Err(GitError::from_git2(e, path)),
    }
}
