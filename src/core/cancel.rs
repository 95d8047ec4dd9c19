//! core::cancel
//!
//! Cooperative cancellation shared between a caller and a reconciliation pass.
//!
//! The engine polls the signal before every network-bound step and from
//! inside libgit2 transfer callbacks. Completed steps are never undone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation flag. All clones observe the same state.
///
/// # Example
///
/// ```
/// use gitconverge::core::cancel::CancelSignal;
///
/// let signal = CancelSignal::new();
/// let observer = signal.clone();
/// assert!(!observer.is_cancelled());
/// signal.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    /// Create a signal that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
