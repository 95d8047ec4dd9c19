//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Use this config file instead of the search path
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Only log errors

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// gitconverge - declarative reconciliation of git repositories
#[derive(Parser, Debug)]
#[command(name = "gitconverge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Engine config file (overrides the search path)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub debug: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Default log filter for the chosen verbosity.
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Converge a repository on a manifest: write, commit, push
    #[command(
        name = "apply",
        long_about = "Converge a repository on a manifest.\n\n\
            Clones the repository (or opens the checkout given by --storage), checks out \
            the target branch, writes the declared files, and commits and pushes them \
            if anything changed. Running apply twice with the same manifest creates no \
            second commit.",
        after_help = "\
EXAMPLES:
    # One-shot, in a temporary clone
    gitconverge apply site.toml

    # Keep the checkout around between runs
    gitconverge apply site.toml --storage ./checkouts/site"
    )]
    Apply {
        /// TOML manifest describing the desired state
        manifest: PathBuf,

        /// Persistent checkout directory
        #[arg(long, value_name = "DIR")]
        storage: Option<PathBuf>,
    },

    /// Report whether the branch already matches a manifest
    #[command(name = "plan")]
    Plan {
        /// TOML manifest describing the desired state
        manifest: PathBuf,
    },

    /// Resolve a ref on a remote and list its branches and tags
    #[command(name = "inspect")]
    Inspect {
        /// Remote URL
        url: String,

        /// Branch, tag, or revision
        #[arg(long = "ref", default_value = "main")]
        ref_name: String,

        /// TOML file with credentials (`[bearer]`, `[basic]`, or `[ssh_key]`)
        #[arg(long, value_name = "PATH")]
        auth: Option<PathBuf>,
    },

    /// Print a file from a remote
    #[command(name = "cat")]
    Cat {
        /// Remote URL
        url: String,

        /// Tree-relative path
        path: String,

        /// Branch, tag, or revision (default: the remote's HEAD)
        #[arg(long = "ref")]
        ref_name: Option<String>,

        /// TOML file with credentials (`[bearer]`, `[basic]`, or `[ssh_key]`)
        #[arg(long, value_name = "PATH")]
        auth: Option<PathBuf>,
    },

    /// Remove a persistent checkout
    #[command(name = "teardown")]
    Teardown {
        /// Checkout directory
        dir: PathBuf,
    },
}
