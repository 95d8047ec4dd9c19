//! cat command - Print a file from a remote

use std::path::Path;

use anyhow::{bail, Context as _, Result};

use super::load_auth;
use crate::cli::Context;
use crate::resources::data;

/// Print the content of `path` on `url` to stdout.
pub fn cat(
    ctx: &Context,
    url: &str,
    path: &str,
    ref_name: Option<&str>,
    auth: Option<&Path>,
) -> Result<()> {
    let auth = load_auth(auth)?;
    let found = data::read_file(&ctx.engine, url, ref_name, path, &auth, &ctx.cancel)
        .with_context(|| format!("failed to read {path} from {url}"))?;
    match found {
        Some(file) => {
            print!("{}", file.content);
            Ok(())
        }
        None => bail!("{path} does not exist in {url}"),
    }
}
