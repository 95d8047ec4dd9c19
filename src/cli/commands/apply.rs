//! apply command - Converge a repository on a manifest

use std::path::Path;

use anyhow::{Context as _, Result};

use super::{load_manifest, print_json};
use crate::cli::Context;
use crate::storage::Storage;

/// Converge on the manifest at `manifest` and print the observed state.
///
/// Without `storage` the pass runs in a temporary clone.
pub fn apply(ctx: &Context, manifest: &Path, storage: Option<&Path>) -> Result<()> {
    let desired = load_manifest(manifest)?;
    let storage = match storage {
        Some(dir) => Storage::persistent(dir),
        None => Storage::ephemeral().context("failed to create temporary storage")?,
    };

    let observed = ctx
        .engine
        .reconcile_once(&desired, storage, &ctx.cancel)
        .with_context(|| format!("failed to apply {}", manifest.display()))?;
    print_json(&observed)
}
