//! cli
//!
//! Command-line interface layer for gitconverge.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the log subscriber
//! - Load engine configuration and manifests, then delegate to command
//!   handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and dispatches to
//! [`crate::resources`] and [`crate::engine`]. Results go to stdout as JSON,
//! logs go to stderr.

pub mod args;
pub mod commands;

pub use args::Cli;

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::cancel::CancelSignal;
use crate::core::config::Config;
use crate::engine::Engine;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "GITCONVERGE_LOG";

/// Shared state for command handlers.
#[derive(Debug)]
pub struct Context {
    /// Engine built from the loaded configuration
    pub engine: Engine,
    /// Cancellation signal for network steps
    pub cancel: CancelSignal,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(&cli);

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    let ctx = Context {
        engine: Engine::new(config),
        cancel: CancelSignal::new(),
    };
    commands::dispatch(cli.command, &ctx)
}

/// `--debug` and `--quiet` win over `GITCONVERGE_LOG`.
fn init_logging(cli: &Cli) {
    let filter = if cli.debug || cli.quiet {
        EnvFilter::new(cli.log_level())
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(cli.log_level()))
    };
    // a subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
