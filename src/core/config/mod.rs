//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. The first config file found (see below)
//! 3. Per-declaration values such as a manifest's `message` or `author`
//!    (not handled here)
//!
//! # Config Locations
//!
//! Searched in order, first hit wins:
//! 1. `$GITCONVERGE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/gitconverge/config.toml`
//! 3. `~/.gitconverge/config.toml`
//!
//! A missing file means defaults. A file that exists but fails to parse is
//! an error.
//!
//! # Example
//!
//! ```no_run
//! use gitconverge::core::config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("default message: {}", config.default_message());
//! println!("shallow reads: {}", config.shallow_reads());
//! ```

pub mod schema;

pub use schema::EngineConfig;

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::state::Identity;

/// Message used when neither the declaration nor the config sets one.
pub const DEFAULT_MESSAGE: &str = "Committed with gitconverge";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "GITCONVERGE_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Loaded engine configuration with defaults applied by the accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Raw values from the config file
    pub engine: EngineConfig,
    /// Path the values were loaded from
    loaded_from: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed,
    /// or validated. Missing files are not an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::locate() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let engine: EngineConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        engine.validate()?;

        Ok(Self {
            engine,
            loaded_from: Some(path.to_path_buf()),
        })
    }

    /// Wrap already-built values.
    pub fn from_engine(engine: EngineConfig) -> Result<Self, ConfigError> {
        engine.validate()?;
        Ok(Self {
            engine,
            loaded_from: None,
        })
    }

    /// The first existing config file in search order.
    fn locate() -> Option<PathBuf> {
        // 1. $GITCONVERGE_CONFIG
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. $XDG_CONFIG_HOME/gitconverge/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("gitconverge/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. ~/.gitconverge/config.toml
        let path = dirs::home_dir()?.join(".gitconverge/config.toml");
        path.exists().then_some(path)
    }

    // =========================================================================
    // Accessors with defaults
    // =========================================================================

    /// Commit message when a declaration has none.
    pub fn default_message(&self) -> &str {
        self.engine
            .default_message
            .as_deref()
            .unwrap_or(DEFAULT_MESSAGE)
    }

    /// Identity of last resort for commits.
    pub fn fallback_author(&self) -> Identity {
        self.engine.author.clone().unwrap_or_else(|| Identity {
            name: "gitconverge".to_string(),
            email: "gitconverge@localhost".to_string(),
        })
    }

    /// Whether read-only lookups clone with depth 1. Default: true.
    pub fn shallow_reads(&self) -> bool {
        self.engine.shallow_reads.unwrap_or(true)
    }

    /// Parent directory for persistent checkouts.
    pub fn work_root(&self) -> Option<&Path> {
        self.engine.work_root.as_deref()
    }

    /// Path the configuration was loaded from.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }
}
