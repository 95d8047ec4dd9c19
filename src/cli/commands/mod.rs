//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! Each handler:
//! 1. Loads and validates its input (manifest, credentials)
//! 2. Calls a resource adapter or the engine
//! 3. Prints the result as JSON

mod apply;
mod cat;
mod inspect;
mod plan;
mod teardown;

pub use apply::apply;
pub use cat::cat;
pub use inspect::inspect;
pub use plan::plan;
pub use teardown::teardown;

use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Serialize;

use super::args::Command;
use super::Context;
use crate::auth::AuthSpec;
use crate::core::state::DesiredState;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Apply { manifest, storage } => apply::apply(ctx, &manifest, storage.as_deref()),
        Command::Plan { manifest } => plan::plan(ctx, &manifest),
        Command::Inspect {
            url,
            ref_name,
            auth,
        } => inspect::inspect(ctx, &url, &ref_name, auth.as_deref()),
        Command::Cat {
            url,
            path,
            ref_name,
            auth,
        } => cat::cat(ctx, &url, &path, ref_name.as_deref(), auth.as_deref()),
        Command::Teardown { dir } => teardown::teardown(&dir),
    }
}

/// Read, parse, and validate a desired-state manifest.
pub(crate) fn load_manifest(path: &Path) -> Result<DesiredState> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let desired: DesiredState = toml::from_str(&text)
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;
    desired
        .validate()
        .with_context(|| format!("invalid manifest {}", path.display()))?;
    Ok(desired)
}

/// Read a credentials file, or anonymous access when none is given.
pub(crate) fn load_auth(path: Option<&Path>) -> Result<AuthSpec> {
    let Some(path) = path else {
        return Ok(AuthSpec::None);
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read credentials {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse credentials {}", path.display()))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{text}");
    Ok(())
}
