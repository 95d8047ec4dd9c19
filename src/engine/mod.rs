//! engine
//!
//! The reconciliation engine.
//!
//! # Pass
//!
//! One pass over a [`RepositoryHandle`] runs these blocking steps in order,
//! each one optional according to the [`ReconcilePlan`]:
//!
//! ```text
//! fetch -> resolve -> checkout -> remove -> write -> drift -> commit -> publish -> list
//! ```
//!
//! The cancellation signal is observed before the pass and at every
//! network-bound step. Steps that completed stay completed.
//!
//! # Invariants
//!
//! - A pass over persistent storage holds the checkout's [`RepoLock`]
//! - A commit is only created when the staged tree differs from head
//! - `is_new_commit` is true iff this pass created the reported head
//!
//! # Example
//!
//! ```no_run
//! use gitconverge::core::cancel::CancelSignal;
//! use gitconverge::core::config::Config;
//! use gitconverge::core::state::{DesiredState, FileEntry};
//! use gitconverge::engine::Engine;
//! use gitconverge::storage::Storage;
//!
//! let engine = Engine::new(Config::default());
//! let mut desired = DesiredState::new("https://example.com/org/repo.git", "main");
//! desired.files.push(FileEntry::file("docs/readme.md", "v1"));
//! desired.message = Some("update".to_string());
//!
//! let observed = engine
//!     .reconcile_once(&desired, Storage::ephemeral()?, &CancelSignal::new())?;
//! println!("{} new={}", observed.head, observed.is_new_commit);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod commit;
pub mod drift;
mod errors;
pub mod provider;
pub mod publish;
pub mod registry;
pub mod resolver;
pub mod worktree;

pub use drift::DriftReport;
pub use errors::{EngineError, ErrorKind};
pub use provider::{Inventory, RepositoryHandle};
pub use registry::{RepoRegistry, RepoSlot, SharedRepo};
pub use resolver::{RefInterpretation, ResolvedRef};

use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::{self, Authenticator};
use crate::core::cancel::CancelSignal;
use crate::core::config::Config;
use crate::core::lock::RepoLock;
use crate::core::state::{DesiredState, ObservedState};
use crate::core::types::BranchName;
use crate::git::CloneOptions;
use crate::storage::Storage;

use commit::CommitRequest;

/// What a pass resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Any symbolic name, through the full fallback chain
    Ref(String),
    /// A branch: remote-tracking first, then local
    Branch(BranchName),
}

impl Target {
    fn name(&self) -> &str {
        match self {
            Target::Ref(name) => name,
            Target::Branch(branch) => branch.as_str(),
        }
    }
}

/// The steps of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// What to check out
    pub target: Target,
    /// Fetch from `origin` before resolving
    pub fetch: bool,
    /// A name that only resolves as a local branch counts as not found.
    /// Used after a pruning fetch to notice branches deleted upstream.
    pub upstream_only: bool,
    /// Paths to delete before writing
    pub remove: Vec<String>,
    /// Write the declared files
    pub write: bool,
    /// Commit (and publish to the target branch) with this message
    pub commit: Option<String>,
    /// Ask the remote for its branches and tags
    pub inventory: bool,
}

impl ReconcilePlan {
    /// Check out `name` and report the inventory.
    pub fn observe(name: impl Into<String>) -> Self {
        Self {
            target: Target::Ref(name.into()),
            fetch: false,
            upstream_only: false,
            remove: Vec::new(),
            write: false,
            commit: None,
            inventory: true,
        }
    }

    /// Write the declaration onto `branch` and commit it with `message`.
    pub fn converge(branch: BranchName, message: impl Into<String>) -> Self {
        Self {
            target: Target::Branch(branch),
            fetch: false,
            upstream_only: false,
            remove: Vec::new(),
            write: true,
            commit: Some(message.into()),
            inventory: false,
        }
    }

    /// Write the declaration onto `branch` without committing.
    pub fn inspect(branch: BranchName) -> Self {
        Self {
            commit: None,
            ..Self::converge(branch, String::new())
        }
    }
}

/// Everything one pass observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    /// Reported state
    pub observed: ObservedState,
    /// Drift after writing, before committing
    pub drift: DriftReport,
    /// How the target resolved
    pub resolved: ResolvedRef,
}

/// The reconciliation engine.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: Config,
    registry: Arc<RepoRegistry>,
}

impl Engine {
    /// An engine with its own empty registry.
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, Arc::new(RepoRegistry::new()))
    }

    /// An engine sharing `registry` with other engines.
    pub fn with_registry(config: Config, registry: Arc<RepoRegistry>) -> Self {
        Self { config, registry }
    }

    /// Engine settings.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared repositories.
    pub fn registry(&self) -> &RepoRegistry {
        &self.registry
    }

    /// Run one pass over `handle`.
    ///
    /// # Errors
    ///
    /// Any [`EngineError`]; the steps completed before the failure persist.
    pub fn reconcile(
        &self,
        handle: &RepositoryHandle,
        desired: &DesiredState,
        plan: &ReconcilePlan,
        auth: &Authenticator,
        cancel: &CancelSignal,
    ) -> Result<PassOutcome, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled { step: "reconcile" });
        }
        let _lock = if handle.storage().is_ephemeral() {
            None
        } else {
            Some(RepoLock::acquire(handle.git().git_dir())?)
        };
        let git = handle.git();

        if plan.fetch {
            handle.refresh(auth, cancel)?;
        }

        let resolved = match &plan.target {
            Target::Ref(name) => resolver::resolve(git, name)?,
            Target::Branch(branch) => resolver::resolve_branch(git, branch.as_str())?,
        };
        if plan.upstream_only && resolved.interpretation == RefInterpretation::LocalBranch {
            debug!(refname = plan.target.name(), "branch is gone upstream");
            return Err(EngineError::RefNotFound {
                refname: plan.target.name().to_string(),
            });
        }
        worktree::checkout(git, &resolved)?;

        if !plan.remove.is_empty() {
            worktree::remove_files(git, &plan.remove)?;
        }
        if plan.write {
            worktree::write_files(git, &desired.files)?;
        }
        let drift = drift::detect(git)?;

        let mut head = resolved.oid.clone();
        let mut is_new_commit = false;
        if let (Some(message), Target::Branch(branch)) = (&plan.commit, &plan.target) {
            let request = CommitRequest {
                files: &desired.files,
                removed: &plan.remove,
                message,
                author: desired.author.as_ref(),
            };
            let outcome = commit::build(git, &request, &self.config.fallback_author())?;
            if outcome.is_new {
                publish::publish(git, &outcome.oid, branch, handle.url(), auth, cancel)?;
            }
            head = outcome.oid;
            is_new_commit = outcome.is_new;
        }

        let inventory = if plan.inventory {
            handle.list_refs(auth, cancel)?
        } else {
            Inventory::default()
        };

        info!(
            url = handle.url(),
            target = plan.target.name(),
            head = %head.short(7),
            is_new_commit,
            "reconciled"
        );
        Ok(PassOutcome {
            observed: ObservedState {
                head,
                branches: inventory.branches,
                tags: inventory.tags,
                is_new_commit,
            },
            drift,
            resolved,
        })
    }

    /// Converge `desired` in `storage` in a single pass: clone or open, write
    /// the files, commit and push if anything changed, and report the
    /// remote inventory.
    pub fn reconcile_once(
        &self,
        desired: &DesiredState,
        storage: Storage,
        cancel: &CancelSignal,
    ) -> Result<ObservedState, EngineError> {
        desired.validate_for_commit()?;
        let branch = desired.target_branch()?;
        let auth = auth::resolve(&desired.auth)?;

        let handle = RepositoryHandle::clone_or_open(
            &desired.url,
            storage,
            &auth,
            &CloneOptions {
                depth: None,
                checkout: false,
            },
            cancel,
        )?;

        let mut plan =
            ReconcilePlan::converge(branch, desired.message_for_create(self.config.default_message()));
        plan.fetch = !handle.is_fresh_clone();
        plan.inventory = true;

        Ok(self.reconcile(&handle, desired, &plan, &auth, cancel)?.observed)
    }
}
