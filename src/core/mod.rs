//! core
//!
//! Core domain types, descriptors, and configuration.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Oid, RefName
//! - [`state`] - Desired and observed state descriptors
//! - [`config`] - Engine configuration schema and loading
//! - [`lock`] - Cross-process lock on a persistent checkout
//! - [`cancel`] - Cooperative cancellation signal
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Declarations are validated once, at the boundary
//! - Schemas are strict: unknown keys are rejected

pub mod cancel;
pub mod config;
pub mod lock;
pub mod state;
pub mod types;
