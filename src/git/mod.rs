//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **only doorway** to Git. All repository reads and
//! writes, local or remote, flow through [`Git`]. No other module imports
//! `git2`, and no module shells out to the git CLI.
//!
//! # Responsibilities
//!
//! - Repository opening and cloning
//! - Ref resolution and CAS ref updates
//! - Checkout, status, index staging, and commit creation
//! - Fetch, push, and remote ref listing with credential, host key, and
//!   cancellation callbacks
//!
//! # Invariants
//!
//! - Local ref updates use CAS (compare-and-swap) semantics
//! - The only remote is `origin`
//! - All operations return strong types (Oid, BranchName, RefName)
//!
//! # Example
//!
//! ```ignore
//! use gitconverge::git::{CloneOptions, Git};
//!
//! let git = Git::clone_into(url, dest, &CloneOptions::default(), &auth, &cancel)?;
//! let head = git.resolve_ref("refs/remotes/origin/main")?;
//! git.checkout_detached(&head)?;
//! ```

mod interface;
mod transport;

pub use interface::{Git, GitError, RefEntry};
pub use transport::{supports_shallow, CloneOptions, RemoteHead};

/// Name of the single remote every managed repository uses.
pub const ORIGIN: &str = "origin";
