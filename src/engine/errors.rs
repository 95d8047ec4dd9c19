//! engine::errors
//!
//! The typed error returned by every engine and resource operation.
//!
//! Each variant names the step that failed and carries the offending
//! identifier (URL, ref, path) plus the low-level cause. [`EngineError::kind`]
//! folds the variants into the coarse [`ErrorKind`] taxonomy callers branch
//! on.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::auth::AuthConfigError;
use crate::core::config::ConfigError;
use crate::core::lock::LockError;
use crate::core::state::StateError;
use crate::git::GitError;
use crate::storage::StorageError;

/// Coarse failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed declaration or configuration. Fix the input.
    Config,
    /// Malformed credential declaration.
    AuthConfig,
    /// The remote refused the credentials or host key.
    AuthRejected,
    /// Repository, ref, or path absent.
    NotFound,
    /// Network-level failure talking to the remote.
    Transport,
    /// The remote diverged (non-fast-forward) or a local ref moved.
    Conflict,
    /// Disk or permission failure.
    LocalIo,
    /// A cancellation request was observed.
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Config => "config",
            ErrorKind::AuthConfig => "auth-config",
            ErrorKind::AuthRejected => "auth-rejected",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Transport => "transport",
            ErrorKind::Conflict => "conflict",
            ErrorKind::LocalIo => "local-io",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Errors from reconciliation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The declaration is invalid.
    #[error("invalid declaration: {0}")]
    Config(#[from] StateError),

    /// The engine configuration is invalid.
    #[error("invalid configuration: {0}")]
    Settings(#[from] ConfigError),

    /// The credential declaration is invalid.
    #[error(transparent)]
    AuthConfig(#[from] AuthConfigError),

    /// The remote refused the credentials.
    #[error("authentication rejected by {url}: {message}")]
    AuthRejected {
        /// Remote URL
        url: String,
        /// Underlying cause
        message: String,
    },

    /// The SSH host key did not verify.
    #[error("host key rejected for {host} ({url})")]
    HostKeyRejected {
        /// Remote URL
        url: String,
        /// Host that presented the key
        host: String,
    },

    /// Cloning failed.
    #[error("failed to clone {url}: {source}")]
    Clone {
        /// Remote URL
        url: String,
        /// Underlying cause
        source: GitError,
    },

    /// Opening the local repository failed.
    #[error("failed to open repository at {path}: {source}")]
    Open {
        /// Storage path
        path: PathBuf,
        /// Underlying cause
        source: GitError,
    },

    /// Fetching failed.
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        /// Remote URL
        url: String,
        /// Underlying cause
        source: GitError,
    },

    /// Listing remote refs failed.
    #[error("failed to list refs of {url}: {source}")]
    ListRefs {
        /// Remote URL
        url: String,
        /// Underlying cause
        source: GitError,
    },

    /// Pushing failed.
    #[error("failed to push {refname} to {url}: {source}")]
    Push {
        /// Remote URL
        url: String,
        /// Ref being pushed
        refname: String,
        /// Underlying cause
        source: GitError,
    },

    /// The remote refused a non-fast-forward update, or a local ref moved
    /// underneath the pass.
    #[error("conflict on {refname}: {message}")]
    Conflict {
        /// Ref in conflict
        refname: String,
        /// Underlying cause
        message: String,
    },

    /// No interpretation of the ref resolved.
    #[error("ref not found: {refname} (tried remote branch, local branch, tag, revision)")]
    RefNotFound {
        /// The symbolic name
        refname: String,
    },

    /// Resolving a ref failed for a reason other than absence.
    #[error("failed to resolve {refname}: {source}")]
    RefResolution {
        /// The symbolic name
        refname: String,
        /// Underlying cause
        source: GitError,
    },

    /// Checking out a commit failed.
    #[error("failed to check out {oid}: {source}")]
    Checkout {
        /// Target commit
        oid: String,
        /// Underlying cause
        source: GitError,
    },

    /// Writing a declared file failed.
    #[error("failed to write {path}: {source}")]
    FileWrite {
        /// Tree-relative path
        path: String,
        /// Underlying cause
        source: io::Error,
    },

    /// Removing a file failed.
    #[error("failed to remove {path}: {source}")]
    FileRemove {
        /// Tree-relative path
        path: String,
        /// Underlying cause
        source: io::Error,
    },

    /// Reading a file failed.
    #[error("failed to read {path}: {source}")]
    FileRead {
        /// Tree-relative path
        path: String,
        /// Underlying cause
        source: io::Error,
    },

    /// Staging a declared item failed.
    #[error("failed to stage {item}: {source}")]
    Stage {
        /// Path or pattern
        item: String,
        /// Underlying cause
        source: GitError,
    },

    /// Computing working tree status failed.
    #[error("failed to compute status: {source}")]
    Status {
        /// Underlying cause
        source: GitError,
    },

    /// Creating the commit object failed.
    #[error("failed to create commit: {source}")]
    CommitCreate {
        /// Underlying cause
        source: GitError,
    },

    /// Moving a local ref failed.
    #[error("failed to update {refname}: {source}")]
    UpdateRef {
        /// Ref being moved
        refname: String,
        /// Underlying cause
        source: GitError,
    },

    /// The checkout lock could not be taken.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Storage management failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A cancellation request was observed.
    #[error("cancelled during {step}")]
    Cancelled {
        /// Step that observed the request
        step: &'static str,
    },

    /// No repository exists where one was expected.
    #[error("no repository at {path}")]
    RepositoryNotFound {
        /// Storage path or registry id
        path: PathBuf,
    },
}

impl EngineError {
    /// The taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Config(_) | EngineError::Settings(_) => ErrorKind::Config,
            EngineError::AuthConfig(_) => ErrorKind::AuthConfig,
            EngineError::AuthRejected { .. } | EngineError::HostKeyRejected { .. } => {
                ErrorKind::AuthRejected
            }
            EngineError::Clone { .. }
            | EngineError::Fetch { .. }
            | EngineError::ListRefs { .. }
            | EngineError::Push { .. } => ErrorKind::Transport,
            EngineError::Conflict { .. } => ErrorKind::Conflict,
            EngineError::UpdateRef {
                source: GitError::CasFailed { .. },
                ..
            } => ErrorKind::Conflict,
            EngineError::RefNotFound { .. } | EngineError::RepositoryNotFound { .. } => {
                ErrorKind::NotFound
            }
            EngineError::Open { source, .. } if source.is_not_found() => ErrorKind::NotFound,
            EngineError::FileRead { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            EngineError::Cancelled { .. } => ErrorKind::Cancelled,
            EngineError::Open { .. }
            | EngineError::RefResolution { .. }
            | EngineError::Checkout { .. }
            | EngineError::FileWrite { .. }
            | EngineError::FileRemove { .. }
            | EngineError::FileRead { .. }
            | EngineError::Stage { .. }
            | EngineError::Status { .. }
            | EngineError::CommitCreate { .. }
            | EngineError::UpdateRef { .. }
            | EngineError::Lock(_)
            | EngineError::Storage(_) => ErrorKind::LocalIo,
        }
    }

    /// Whether a plain retry may succeed: network failures and a checkout
    /// held by another process.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
            || matches!(self, EngineError::Lock(LockError::AlreadyLocked { .. }))
    }

    /// Whether the error means the underlying object is absent.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Map a failed clone.
    pub(crate) fn clone_failed(url: &str, err: GitError) -> Self {
        Self::remote("clone", url, err, |url, source| EngineError::Clone { url, source })
    }

    /// Map a failed fetch.
    pub(crate) fn fetch_failed(url: &str, err: GitError) -> Self {
        Self::remote("fetch", url, err, |url, source| EngineError::Fetch { url, source })
    }

    /// Map a failed remote listing.
    pub(crate) fn list_failed(url: &str, err: GitError) -> Self {
        Self::remote("list-refs", url, err, |url, source| EngineError::ListRefs {
            url,
            source,
        })
    }

    /// Map a failed push.
    pub(crate) fn push_failed(url: &str, refname: &str, err: GitError) -> Self {
        let refname = refname.to_string();
        Self::remote("push", url, err, move |url, source| EngineError::Push {
            url,
            refname,
            source,
        })
    }

    /// Pull the distinctly-classified remote failures out of `err`;
    /// everything else is wrapped by `wrap`.
    fn remote(
        step: &'static str,
        url: &str,
        err: GitError,
        wrap: impl FnOnce(String, GitError) -> EngineError,
    ) -> Self {
        match err {
            GitError::Cancelled => EngineError::Cancelled { step },
            GitError::AuthRejected { url, message } => EngineError::AuthRejected { url, message },
            GitError::HostKeyRejected { host } => EngineError::HostKeyRejected {
                url: url.to_string(),
                host,
            },
            GitError::NonFastForward { refname, message } => {
                EngineError::Conflict { refname, message }
            }
            other => wrap(url.to_string(), other),
        }
    }
}
