//! resources
//!
//! Lifecycle adapters for declared resources.
//!
//! Each adapter exposes create/read/update/delete over the engine. Reads
//! return `Ok(None)` when the underlying object is gone (repository
//! storage removed, branch deleted upstream, file missing) so a lifecycle
//! framework can schedule recreation. Every other failure is an
//! [`EngineError`].
//!
//! - [`commit::CommitResource`]: a commit of declared files on a branch
//! - [`repository::RepositoryResource`]: a checkout kept in the registry
//! - [`file::FileResource`]: one file inside a registered checkout
//! - [`data`]: read-only lookups that leave nothing behind

pub mod commit;
pub mod data;
pub mod file;
pub mod repository;

pub use commit::{CommitResource, CommitState};
pub use data::{FileContent, RepositoryInfo};
pub use file::{FileDescriptor, FileResource, FileState};
pub use repository::{RepositoryDescriptor, RepositoryResource, RepositoryState};

use crate::engine::EngineError;

/// Turn a not-found failure into absence.
pub(crate) fn absent_if_missing<T>(result: Result<T, EngineError>) -> Result<Option<T>, EngineError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
