//! gitconverge - declarative reconciliation of git repositories
//!
//! gitconverge converges a local working copy of a remote repository on a
//! declared state (URL, ref, files, credentials) and reports what it
//! observed: the resolved head, the remote's branches and tags, and whether
//! the pass created a commit.
//!
//! # Architecture
//!
//! The codebase is layered, leaf modules first:
//!
//! - [`core`] - Domain types, desired/observed state, configuration, locking
//! - [`auth`] - Turns declared credentials into a transport authenticator
//! - [`git`] - Single interface for all Git operations
//! - [`storage`] - Ephemeral and persistent backing directories
//! - [`engine`] - The reconciliation pass and its error taxonomy
//! - [`resources`] - Create/read/update/delete adapters over the engine
//! - [`cli`] - Command-line interface layer
//!
//! # Correctness Invariants
//!
//! 1. Reference resolution order is fixed: remote branch, local branch, tag,
//!    revision
//! 2. A pass creates a commit only when the staged tree differs from head
//! 3. Absent repositories, refs, and files read as "no resource", never as
//!    a failure
//! 4. Every failure names the ref, path, or URL involved

pub mod auth;
pub mod cli;
pub mod core;
pub mod engine;
pub mod git;
pub mod resources;
pub mod storage;
