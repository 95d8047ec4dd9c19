//! engine::provider
//!
//! Repository Provider: clone or open a repository in a storage backend,
//! refresh it from `origin`, and list the remote inventory.

use std::path::Path;

use tracing::{debug, info, warn};

use super::errors::EngineError;
use crate::auth::Authenticator;
use crate::core::cancel::CancelSignal;
use crate::core::state::RefSummary;
use crate::core::types::RefName;
use crate::git::{CloneOptions, Git, GitError};
use crate::storage::{LocationState, Storage};

/// Branches and tags advertised by the remote, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    /// Remote branches
    pub branches: Vec<RefSummary>,
    /// Remote tags
    pub tags: Vec<RefSummary>,
}

/// An open repository together with the storage that backs it.
#[derive(Debug)]
pub struct RepositoryHandle {
    url: String,
    git: Git,
    storage: Storage,
    cloned: bool,
}

impl RepositoryHandle {
    /// Open the repository in `storage` if there is one, otherwise clone
    /// `url` into it.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Clone`] (or the auth/cancel classes) when cloning fails
    /// - [`EngineError::Open`] when the location is occupied by something
    ///   else or the checkout tracks a different remote
    pub fn clone_or_open(
        url: &str,
        storage: Storage,
        auth: &Authenticator,
        options: &CloneOptions,
        cancel: &CancelSignal,
    ) -> Result<Self, EngineError> {
        match storage.location_state()? {
            LocationState::Repository => Self::open_existing(url, storage),
            LocationState::Missing | LocationState::Empty => {
                Self::clone_into(url, storage, auth, options, cancel)
            }
            LocationState::Foreign => Err(EngineError::Open {
                path: storage.path().to_path_buf(),
                source: GitError::AccessError {
                    message: "location holds files that are not a repository".to_string(),
                },
            }),
        }
    }

    /// Open the repository already present in `storage`.
    ///
    /// A missing repository is reported as [`EngineError::Open`] with a
    /// not-found cause, so callers can treat it as absent.
    pub fn open_existing(url: &str, storage: Storage) -> Result<Self, EngineError> {
        let open_failed = |source| EngineError::Open {
            path: storage.path().to_path_buf(),
            source,
        };
        let git = Git::open(storage.path()).map_err(open_failed)?;
        match git.origin_url().map_err(open_failed)? {
            Some(origin) if origin == url => {}
            Some(origin) => {
                return Err(open_failed(GitError::AccessError {
                    message: format!("checkout tracks {origin}, not {url}"),
                }))
            }
            None => {
                return Err(open_failed(GitError::AccessError {
                    message: "checkout has no origin remote".to_string(),
                }))
            }
        }
        debug!(url, path = %storage.path().display(), "opened repository");
        Ok(Self {
            url: url.to_string(),
            git,
            storage,
            cloned: false,
        })
    }

    fn clone_into(
        url: &str,
        mut storage: Storage,
        auth: &Authenticator,
        options: &CloneOptions,
        cancel: &CancelSignal,
    ) -> Result<Self, EngineError> {
        storage.ensure_dir()?;
        info!(url, path = %storage.path().display(), "cloning");
        match Git::clone_into(url, storage.path(), options, auth, cancel) {
            Ok(git) => Ok(Self {
                url: url.to_string(),
                git,
                storage,
                cloned: true,
            }),
            Err(err) => {
                // leave no half-populated checkout behind
                if let Err(cleanup) = storage.teardown() {
                    warn!(error = %cleanup, "failed to remove partial clone");
                }
                Err(EngineError::clone_failed(url, err))
            }
        }
    }

    /// Whether this handle came from a fresh clone rather than an existing
    /// checkout.
    pub fn is_fresh_clone(&self) -> bool {
        self.cloned
    }

    /// Remote URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The repository.
    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Backing storage.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Root of the working tree.
    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    /// Release the repository and hand back its storage.
    pub fn into_storage(self) -> Storage {
        self.storage
    }

    /// Fetch every branch and tag from `origin`, pruning vanished refs.
    pub fn refresh(&self, auth: &Authenticator, cancel: &CancelSignal) -> Result<(), EngineError> {
        self.git
            .fetch_all(auth, cancel)
            .map_err(|err| EngineError::fetch_failed(&self.url, err))
    }

    /// Ask the remote for its branches and tags.
    pub fn list_refs(
        &self,
        auth: &Authenticator,
        cancel: &CancelSignal,
    ) -> Result<Inventory, EngineError> {
        list_inventory(&self.git, &self.url, auth, cancel)
    }

    /// Remove the backing storage. Idempotent.
    pub fn teardown(self) -> Result<(), EngineError> {
        let Self { git, mut storage, .. } = self;
        drop(git);
        storage.teardown()?;
        Ok(())
    }
}

/// Ask `url`, the `origin` of `git`, for its branches and tags.
pub fn list_inventory(
    git: &Git,
    url: &str,
    auth: &Authenticator,
    cancel: &CancelSignal,
) -> Result<Inventory, EngineError> {
    let heads = git
        .list_remote_refs(auth, cancel)
        .map_err(|err| EngineError::list_failed(url, err))?;

    let mut inventory = Inventory::default();
    for head in heads {
        if let Some(name) = head.name.strip_prefix(RefName::HEADS) {
            inventory.branches.push(RefSummary {
                name: name.to_string(),
                hash: head.oid,
            });
        } else if let Some(name) = head.name.strip_prefix(RefName::TAGS) {
            inventory.tags.push(RefSummary {
                name: name.to_string(),
                hash: head.oid,
            });
        }
    }
    inventory.branches.sort_by(|a, b| a.name.cmp(&b.name));
    inventory.tags.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(
        branches = inventory.branches.len(),
        tags = inventory.tags.len(),
        "listed remote refs"
    );
    Ok(inventory)
}
