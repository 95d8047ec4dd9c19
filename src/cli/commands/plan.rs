//! plan command - Report whether a branch already matches a manifest

use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Serialize;

use super::{load_manifest, print_json};
use crate::cli::Context;
use crate::core::types::Oid;
use crate::resources::CommitResource;

#[derive(Debug, Serialize)]
struct PlanReport {
    /// Whether `apply` would leave the branch unchanged
    converged: bool,
    /// Branch head when converged
    head: Option<Oid>,
}

/// Check the manifest against its branch without committing.
pub fn plan(ctx: &Context, manifest: &Path) -> Result<()> {
    let desired = load_manifest(manifest)?;
    let current = CommitResource::new(&ctx.engine)
        .read(&desired, &ctx.cancel)
        .with_context(|| format!("failed to plan {}", manifest.display()))?;
    print_json(&PlanReport {
        converged: current.is_some(),
        head: current.map(|state| state.sha),
    })
}
