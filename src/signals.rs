//! Interrupt handling for graceful shutdown
//!
//! Process-wide state toggled by the Ctrl+C handler and polled by the
//! TUI loop and long-running transfers.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check whether Ctrl+C has been pressed.
#[inline]
pub fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Set the interrupted flag (called from the signal handler).
#[inline]
pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Clear the interrupted flag.
#[inline]
pub fn reset_interrupted() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}
