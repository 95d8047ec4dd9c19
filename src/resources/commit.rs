//! resources::commit
//!
//! A commit of declared files on a branch. Every operation works in a fresh
//! ephemeral clone, so nothing is kept between calls.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::absent_if_missing;
use crate::auth;
use crate::core::cancel::CancelSignal;
use crate::core::state::DesiredState;
use crate::core::types::Oid;
use crate::engine::{Engine, EngineError, PassOutcome, ReconcilePlan, RepositoryHandle};
use crate::git::CloneOptions;
use crate::storage::Storage;

/// Observed commit resource; its identity is `sha`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitState {
    /// Branch head after the operation
    pub sha: Oid,
    /// Whether the operation created `sha`
    #[serde(rename = "new")]
    pub is_new: bool,
}

impl From<PassOutcome> for CommitState {
    fn from(outcome: PassOutcome) -> Self {
        Self {
            sha: outcome.observed.head,
            is_new: outcome.observed.is_new_commit,
        }
    }
}

/// Commit lifecycle over an [`Engine`].
#[derive(Debug, Clone, Copy)]
pub struct CommitResource<'e> {
    engine: &'e Engine,
}

impl<'e> CommitResource<'e> {
    /// Adapter over `engine`.
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// Write the declared files and commit them if anything changed.
    pub fn create(
        &self,
        desired: &DesiredState,
        cancel: &CancelSignal,
    ) -> Result<CommitState, EngineError> {
        let message = desired.message_for_create(self.engine.config().default_message());
        let plan = ReconcilePlan::converge(desired.target_branch()?, message);
        self.run(desired, &plan, cancel).map(CommitState::from)
    }

    /// Whether the branch still carries the declared files.
    ///
    /// Returns `None` when the branch is gone or its tree differs from the
    /// declaration.
    pub fn read(
        &self,
        desired: &DesiredState,
        cancel: &CancelSignal,
    ) -> Result<Option<CommitState>, EngineError> {
        let plan = ReconcilePlan::inspect(desired.target_branch()?);
        let Some(outcome) = absent_if_missing(self.run(desired, &plan, cancel))? else {
            return Ok(None);
        };
        if !outcome.drift.is_clean {
            debug!(
                changed = outcome.drift.changed_paths.len(),
                "branch no longer matches declaration"
            );
            return Ok(None);
        }
        Ok(Some(CommitState {
            sha: outcome.resolved.oid,
            is_new: false,
        }))
    }

    /// Move from `previous` to `desired`. With `prune`, paths only the
    /// previous declaration named are deleted in the same commit.
    pub fn update(
        &self,
        previous: &DesiredState,
        desired: &DesiredState,
        cancel: &CancelSignal,
    ) -> Result<CommitState, EngineError> {
        let message = desired.message_for_update(self.engine.config().default_message());
        let mut plan = ReconcilePlan::converge(desired.target_branch()?, message);
        if desired.prune {
            let keep = desired.declared_paths();
            plan.remove = previous
                .declared_paths()
                .into_iter()
                .filter(|path| !keep.contains(path))
                .map(str::to_string)
                .collect();
        }
        self.run(desired, &plan, cancel).map(CommitState::from)
    }

    /// With `prune`, delete every declared path and push the removal.
    /// Otherwise, and when the branch is already gone, nothing happens.
    pub fn delete(&self, desired: &DesiredState, cancel: &CancelSignal) -> Result<(), EngineError> {
        if !desired.prune {
            return Ok(());
        }
        let message = desired.message_for_delete(self.engine.config().default_message());
        let mut plan = ReconcilePlan::converge(desired.target_branch()?, message);
        plan.write = false;
        plan.remove = desired
            .declared_paths()
            .into_iter()
            .map(str::to_string)
            .collect();
        absent_if_missing(self.run(desired, &plan, cancel)).map(|_| ())
    }

    fn run(
        &self,
        desired: &DesiredState,
        plan: &ReconcilePlan,
        cancel: &CancelSignal,
    ) -> Result<PassOutcome, EngineError> {
        desired.validate_for_commit()?;
        let auth = auth::resolve(&desired.auth)?;
        let handle = RepositoryHandle::clone_or_open(
            &desired.url,
            Storage::ephemeral()?,
            &auth,
            &CloneOptions {
                depth: None,
                checkout: false,
            },
            cancel,
        )?;
        self.engine.reconcile(&handle, desired, plan, &auth, cancel)
    }
}
