//! Mock console for platforms without a real diagnostics channel.

/// Nothing buffered, nothing to flush.
pub fn flush() {}

/// Overflow reports are dropped on the mok port; tests observe the killed
/// task through the manager's state instead.
pub fn note_overflow() {}
