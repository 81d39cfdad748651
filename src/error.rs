//! Error kinds reported by the kernel API.
//!
//! Thread-mode entry points return these directly. Handler-mode code never
//! returns errors to userspace; a broken invariant there is fatal and
//! panics with a `scheduler-fault` style message.

/// Status values the thread-mode kernel API can report.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum KernelError {
    /// A null entry function, out-of-range priority, or invalid handle.
    BadParameter,
    /// A TCB, stack, or waiter record could not be allocated.
    OutOfMemory,
    /// The object still has users (e.g. a semaphore with live waiters).
    InUse,
    /// A collaborator peripheral failed.
    Device,
    /// The operation is not available on this port or configuration.
    NotSupported,
    /// A timed wait expired without consuming a post. Not a failure of the
    /// primitive; the caller decides what it means.
    Timeout,
    /// The scheduler was misused (e.g. an API call before `start`).
    SchedulerFault,
}

/// Result alias used across the kernel API.
pub type KernelResult<T> = Result<T, KernelError>;
