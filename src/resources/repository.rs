//! resources::repository
//!
//! A checkout of a remote repository kept alive across operations.
//!
//! The checkout lives in the engine's registry under the descriptor's id
//! (caller-supplied, or the URL). Storage is chosen at create time:
//! `storage_location` if given, else a directory under the configured
//! `work_root`, else an ephemeral directory that lives as long as the
//! registry entry.
//!
//! Reads and updates take the entry's write lock for the whole pass: fetch
//! with prune, resolve, check out, list. Missing storage or a ref deleted
//! upstream tears the checkout down and reports absence.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::{self, AuthSpec};
use crate::core::cancel::CancelSignal;
use crate::core::state::{DesiredState, RefSummary};
use crate::core::types::Oid;
use crate::engine::provider::list_inventory;
use crate::engine::{
    Engine, EngineError, Inventory, PassOutcome, ReconcilePlan, RepoSlot, RepositoryHandle,
    SharedRepo,
};
use crate::git::{CloneOptions, Git};
use crate::storage::{LocationState, Storage};

fn default_ref() -> String {
    "main".to_string()
}

/// Declared repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryDescriptor {
    /// Registry identifier; defaults to `url`
    #[serde(default)]
    pub id: Option<String>,
    /// Remote URL
    pub url: String,
    /// Ref to check out
    #[serde(rename = "ref", default = "default_ref")]
    pub ref_name: String,
    /// Credentials
    #[serde(default)]
    pub auth: AuthSpec,
    /// Directory for the checkout
    #[serde(default)]
    pub storage_location: Option<PathBuf>,
}

impl RepositoryDescriptor {
    /// Descriptor for `url` at `main`, stored wherever the engine decides.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            ref_name: default_ref(),
            auth: AuthSpec::None,
            storage_location: None,
        }
    }

    /// Registry identifier.
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.url)
    }

    fn desired(&self) -> DesiredState {
        let mut desired = DesiredState::new(self.url.as_str(), self.ref_name.as_str());
        desired.auth = self.auth.clone();
        desired
    }
}

/// Observed repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryState {
    /// Registry identifier
    pub id: String,
    /// Working-tree root
    pub dir: PathBuf,
    /// Checked-out commit
    pub head: Oid,
    /// Remote branches
    pub branches: Vec<RefSummary>,
    /// Remote tags
    pub tags: Vec<RefSummary>,
}

/// Repository lifecycle over an [`Engine`].
#[derive(Debug, Clone, Copy)]
pub struct RepositoryResource<'e> {
    engine: &'e Engine,
}

impl<'e> RepositoryResource<'e> {
    /// Adapter over `engine`.
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// Clone (or adopt an existing checkout of) the repository, check out
    /// the declared ref, and register it.
    pub fn create(
        &self,
        descriptor: &RepositoryDescriptor,
        cancel: &CancelSignal,
    ) -> Result<RepositoryState, EngineError> {
        let desired = descriptor.desired();
        desired.validate()?;
        let auth = auth::resolve(&desired.auth)?;

        let handle = RepositoryHandle::clone_or_open(
            &desired.url,
            self.storage_for(descriptor)?,
            &auth,
            &CloneOptions {
                depth: None,
                checkout: false,
            },
            cancel,
        )?;
        let mut plan = ReconcilePlan::observe(desired.ref_name.as_str());
        plan.fetch = !handle.is_fresh_clone();

        let outcome = match self.engine.reconcile(&handle, &desired, &plan, &auth, cancel) {
            Ok(outcome) => outcome,
            Err(err) => {
                if handle.is_fresh_clone() {
                    if let Err(cleanup) = handle.teardown() {
                        warn!(error = %cleanup, "failed to remove checkout after failed create");
                    }
                }
                return Err(err);
            }
        };

        let state = state_of(descriptor.id(), handle.path(), outcome);
        self.engine
            .registry()
            .register(descriptor.id(), &desired.url, handle.into_storage());
        info!(id = descriptor.id(), dir = %state.dir.display(), "repository created");
        Ok(state)
    }

    /// Refresh the checkout and report it, or `None` if it is gone.
    pub fn read(
        &self,
        descriptor: &RepositoryDescriptor,
        cancel: &CancelSignal,
    ) -> Result<Option<RepositoryState>, EngineError> {
        let desired = descriptor.desired();
        desired.validate()?;
        let auth = auth::resolve(&desired.auth)?;
        let id = descriptor.id();

        let Some(shared) = self.lookup(descriptor) else {
            debug!(id, "repository not registered");
            return Ok(None);
        };

        let outcome = shared.write(|slot| {
            let Some(storage) = slot.storage.take() else {
                return Ok(None);
            };
            let kept = (!storage.is_ephemeral()).then(|| storage.path().to_path_buf());
            let handle = match RepositoryHandle::open_existing(&slot.url, storage) {
                Ok(handle) => handle,
                Err(err) if err.is_not_found() => return Ok(None),
                Err(err) => {
                    // an on-disk checkout outlives the failed open
                    slot.storage = kept.map(Storage::persistent);
                    return Err(err);
                }
            };
            let mut plan = ReconcilePlan::observe(desired.ref_name.as_str());
            plan.fetch = true;
            plan.upstream_only = true;

            match self.engine.reconcile(&handle, &desired, &plan, &auth, cancel) {
                Ok(outcome) => {
                    let state = state_of(id, handle.path(), outcome);
                    slot.storage = Some(handle.into_storage());
                    Ok(Some(state))
                }
                Err(err) if err.is_not_found() => {
                    info!(id, error = %err, "ref gone upstream; removing checkout");
                    handle.teardown()?;
                    Ok(None)
                }
                Err(err) => {
                    slot.storage = Some(handle.into_storage());
                    Err(err)
                }
            }
        })?;

        if outcome.is_none() {
            self.engine.registry().remove(id);
        }
        Ok(outcome)
    }

    /// Converge on a changed descriptor. A changed URL replaces the
    /// checkout; an absent checkout is recreated.
    pub fn update(
        &self,
        descriptor: &RepositoryDescriptor,
        cancel: &CancelSignal,
    ) -> Result<RepositoryState, EngineError> {
        let moved = self
            .engine
            .registry()
            .get(descriptor.id())
            .is_some_and(|shared| shared.read(|slot| slot.url != descriptor.url));
        if moved {
            debug!(id = descriptor.id(), "remote changed; replacing checkout");
            self.delete(descriptor)?;
        }
        match self.read(descriptor, cancel)? {
            Some(state) => Ok(state),
            None => self.create(descriptor, cancel),
        }
    }

    /// Remove the checkout. Removing an absent checkout succeeds.
    pub fn delete(&self, descriptor: &RepositoryDescriptor) -> Result<(), EngineError> {
        let id = descriptor.id();
        match self.engine.registry().remove(id) {
            Some(shared) => {
                if let Some(mut storage) = shared.write(|slot: &mut RepoSlot| slot.storage.take()) {
                    storage.teardown()?;
                }
            }
            None => {
                // only an unregistered checkout is removed, never foreign files
                if let Some(path) = self.persistent_path(descriptor) {
                    let mut storage = Storage::persistent(path);
                    if storage.location_state()? == LocationState::Repository {
                        storage.teardown()?;
                    }
                }
            }
        }
        info!(id, "repository deleted");
        Ok(())
    }

    /// Branches and tags of a registered checkout, under the shared lock.
    pub fn inventory(
        &self,
        descriptor: &RepositoryDescriptor,
        cancel: &CancelSignal,
    ) -> Result<Option<Inventory>, EngineError> {
        let auth = auth::resolve(&descriptor.auth)?;
        let Some(shared) = self.engine.registry().get(descriptor.id()) else {
            return Ok(None);
        };
        let list = |slot: &RepoSlot| -> Result<Option<Inventory>, EngineError> {
            let Some(path) = slot.path() else {
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
            list_inventory(&git, &slot.url, &auth, cancel).map(Some)
        };
        // header-based credentials list through a fetch, which writes refs
        if auth.requires_headers() {
            shared.write(|slot| list(&*slot))
        } else {
            shared.read(list)
        }
    }

    fn storage_for(&self, descriptor: &RepositoryDescriptor) -> Result<Storage, EngineError> {
        match self.persistent_path(descriptor) {
            Some(path) => Ok(Storage::persistent(path)),
            None => Ok(Storage::ephemeral()?),
        }
    }

    fn persistent_path(&self, descriptor: &RepositoryDescriptor) -> Option<PathBuf> {
        if let Some(path) = &descriptor.storage_location {
            return Some(path.clone());
        }
        self.engine
            .config()
            .work_root()
            .map(|root| root.join(dir_name(descriptor.id())))
    }

    /// The registry entry for `descriptor`, adopting an on-disk checkout
    /// left by an earlier process.
    fn lookup(&self, descriptor: &RepositoryDescriptor) -> Option<Arc<SharedRepo>> {
        let registry = self.engine.registry();
        if let Some(shared) = registry.get(descriptor.id()) {
            return Some(shared);
        }
        let path = self.persistent_path(descriptor)?;
        if !path.join(".git").exists() {
            return None;
        }
        Some(registry.register(descriptor.id(), &descriptor.url, Storage::persistent(path)))
    }
}

fn state_of(id: &str, dir: &Path, outcome: PassOutcome) -> RepositoryState {
    RepositoryState {
        id: id.to_string(),
        dir: dir.to_path_buf(),
        head: outcome.observed.head,
        branches: outcome.observed.branches,
        tags: outcome.observed.tags,
    }
}

/// Directory name for an identifier: anything outside `[A-Za-z0-9._-]`
/// becomes `_`.
fn dir_name(id: &str) -> String {
    let name: String = id
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();
    if name.trim_matches('.').is_empty() {
        "_".to_string()
    } else {
        name
    }
}
