//! engine::drift
//!
//! Drift between the working tree (plus index) and the checked-out commit.

use std::collections::BTreeSet;

use tracing::debug;

use super::errors::EngineError;
use crate::git::Git;

/// Paths that differ from the last commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// True iff no path differs
    pub is_clean: bool,
    /// Tree-relative paths that differ, sorted
    pub changed_paths: BTreeSet<String>,
}

impl DriftReport {
    /// Whether any of `paths` drifted.
    pub fn touches<S: AsRef<str>>(&self, paths: &[S]) -> bool {
        paths
            .iter()
            .any(|p| self.changed_paths.contains(p.as_ref()))
    }
}

/// Compute the drift report.
pub fn detect(git: &Git) -> Result<DriftReport, EngineError> {
    let changed_paths = git
        .changed_paths()
        .map_err(|source| EngineError::Status { source })?;
    debug!(changed = changed_paths.len(), "drift computed");
    Ok(DriftReport {
        is_clean: changed_paths.is_empty(),
        changed_paths,
    })
}
