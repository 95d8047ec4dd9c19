//! teardown command - Remove a persistent checkout

use std::path::Path;

use anyhow::{bail, Context as _, Result};

use crate::storage::{LocationState, Storage};

/// Remove the checkout at `dir`. A missing directory is fine; a directory
/// that is not a checkout is refused.
pub fn teardown(dir: &Path) -> Result<()> {
    let mut storage = Storage::persistent(dir);
    match storage.location_state()? {
        LocationState::Repository | LocationState::Missing | LocationState::Empty => {}
        LocationState::Foreign => bail!("{} is not a checkout; refusing to remove it", dir.display()),
    }
    storage
        .teardown()
        .with_context(|| format!("failed to remove {}", dir.display()))?;
    Ok(())
}
