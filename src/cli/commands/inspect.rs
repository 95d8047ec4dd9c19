//! inspect command - Resolve a ref on a remote and list its inventory

use std::path::Path;

use anyhow::{Context as _, Result};

use super::{load_auth, print_json};
use crate::cli::Context;
use crate::resources::data;

/// Print head, branches, and tags of `url` at `ref_name`.
pub fn inspect(ctx: &Context, url: &str, ref_name: &str, auth: Option<&Path>) -> Result<()> {
    let auth = load_auth(auth)?;
    let info = data::inspect_repository(&ctx.engine, url, ref_name, &auth, &ctx.cancel)
        .with_context(|| format!("failed to inspect {url} at {ref_name}"))?;
    print_json(&info)
}
