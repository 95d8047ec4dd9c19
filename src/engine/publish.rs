//! engine::publish
//!
//! Move the local branch to a new commit and push it to `origin`.
//!
//! The local update is not rolled back when the push fails. A retried pass
//! starts from the same local state and pushes again.

use tracing::{info, warn};

use super::errors::EngineError;
use crate::auth::Authenticator;
use crate::core::cancel::CancelSignal;
use crate::core::types::{BranchName, Oid, RefName};
use crate::git::Git;

/// Point `refs/heads/<branch>` at `oid` and push it as the same ref.
///
/// # Errors
///
/// - [`EngineError::UpdateRef`] when the local ref moved or can't be written
/// - [`EngineError::Conflict`] on a non-fast-forward rejection
/// - [`EngineError::AuthRejected`], [`EngineError::Cancelled`], or
///   [`EngineError::Push`] from the transport
pub fn publish(
    git: &Git,
    oid: &Oid,
    branch: &BranchName,
    url: &str,
    auth: &Authenticator,
    cancel: &CancelSignal,
) -> Result<(), EngineError> {
    let refname = RefName::for_branch(branch);
    let update_failed = |source| EngineError::UpdateRef {
        refname: refname.to_string(),
        source,
    };

    let current = git
        .try_resolve_ref(refname.as_str())
        .map_err(update_failed)?;
    if current.as_ref() != Some(oid) {
        git.update_ref_cas(
            &refname,
            oid,
            current.as_ref(),
            &format!("gitconverge: publish {}", oid.short(7)),
        )
        .map_err(update_failed)?;
    }

    git.push_branch(branch, auth, cancel).map_err(|err| {
        let err = EngineError::push_failed(url, refname.as_str(), err);
        warn!(branch = %branch, error = %err, "push failed; local branch left in place");
        err
    })?;
    info!(branch = %branch, commit = %oid.short(7), url, "pushed");
    Ok(())
}
