//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Location
//!
//! Searched in order:
//! 1. `$GITCONVERGE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/gitconverge/config.toml`
//! 3. `~/.gitconverge/config.toml`
//!
//! # Validation
//!
//! Values are validated after parsing: an author needs both a name and an
//! email, and the default message may not be blank.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::state::Identity;

/// Engine configuration (user scope).
///
/// # Example
///
/// ```toml
/// default_message = "Committed by CI"
/// shallow_reads = true
/// work_root = "/var/lib/gitconverge"
///
/// [author]
/// name = "CI Bot"
/// email = "ci@example.com"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Commit message used when a declaration carries none
    pub default_message: Option<String>,

    /// Fallback commit identity
    pub author: Option<Identity>,

    /// Whether read-only lookups clone with depth 1
    pub shallow_reads: Option<bool>,

    /// Parent directory for persistent checkouts
    pub work_root: Option<PathBuf>,
}

impl EngineConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(message) = &self.default_message {
            if message.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "default_message must not be blank".into(),
                ));
            }
        }

        if let Some(author) = &self.author {
            if author.name.trim().is_empty() || author.email.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "author needs both name and email".into(),
                ));
            }
        }

        if let Some(root) = &self.work_root {
            if root.is_relative() {
                return Err(ConfigError::InvalidValue(format!(
                    "work_root must be absolute, got '{}'",
                    root.display()
                )));
            }
        }

        Ok(())
    }
}
