//! Cooperative cancellation for spin waits.
//!
//! There is no blocking primitive across the trust boundary, so a side that
//! is polling for a frame (or for free space) can only be stopped by flipping
//! a flag from another thread of its own process. Every spin loop in this
//! crate checks a [`CancelToken`] on each iteration and unwinds with the
//! buffer and cursor state untouched.

use crate::sync::{AtomicBool, Ordering};

/// A wait was interrupted by an external shutdown signal.
///
/// This is the recoverable outcome: no slot or cursor state was mutated, and
/// the operation may be retried on a fresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl core::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "wait cancelled")
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for Cancelled {}

/// Shutdown signal shared between a polling side and whoever tears it down.
#[derive(Debug)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    /// Request cancellation. Idempotent; never un-cancels.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Poll-point helper: `Err(Cancelled)` once [`cancel`](Self::cancel) has
    /// been called.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.check(), Ok(()));
    }

    #[test]
    fn cancel_is_sticky() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(Cancelled));
    }
}
