//! Interrupt control shim.
//!
//! Queue mutations performed from thread mode must appear atomic to the
//! tick and switch handlers, so every one of them is bracketed by the
//! critical section here. The mask nests: re-masking inside a critical
//! section is a no-op and only the outermost guard unmasks on drop, so
//! release happens on every exit path including early returns and panics.

use crate::ports::{Port, PortTrait};

/// Process-wide interrupt mask. Returns whether interrupts were already
/// masked, so nested masking can restore correctly.
#[inline]
pub fn interrupt_mask() -> bool {
    Port::interrupt_mask()
}

/// Undo [`interrupt_mask`]. Callers must only unmask if their own mask
/// call reported "was not masked"; [`critical_section`] does this for you.
#[inline]
pub fn interrupt_unmask() {
    Port::interrupt_unmask()
}

struct MaskGuard {
    was_masked: bool,
}

impl Drop for MaskGuard {
    fn drop(&mut self) {
        if !self.was_masked {
            Port::interrupt_unmask();
        }
    }
}

/// Run `f` with interrupts masked, restoring the previous mask state
/// afterwards no matter how `f` exits.
#[inline]
pub fn critical_section<R>(f: impl FnOnce() -> R) -> R {
    let _guard = MaskGuard {
        was_masked: Port::interrupt_mask(),
    };
    f()
}
