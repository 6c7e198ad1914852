//! Process-wide cooperative shutdown flag.
//! The driver's Ctrl-C handler sets it; polling waits and parallel batches check it
//! between steps and bail out with `TreeSyncError::Interrupted`.
//!
//! Relaxed atomics are sufficient for a one-way "stop" flag, and `request()` is
//! safe to call from a signal handler.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Request a cooperative shutdown (idempotent).
#[inline]
pub fn request() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

/// Check whether a shutdown has been requested.
#[inline]
pub fn is_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}
