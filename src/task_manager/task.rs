//! Task types: control block, handles, states, and creation options.

use crate::config::{STACK_GUARD_BYTES, STACK_GUARD_FILL};
use crate::list::Link;
use crate::timer::TickType;

#[cfg(not(feature = "c-library"))]
/// Type of a task entry function. Receives the opaque argument supplied at
/// creation; terminating the task is done by returning (the exit trampoline
/// then destroys it) or by calling `destroy_task` on itself.
pub type TaskEntryFn = fn(TaskArg);
#[cfg(feature = "c-library")]
/// Type of a task entry function. Receives the opaque argument supplied at
/// creation; terminating the task is done by returning (the exit trampoline
/// then destroys it) or by calling `destroy_task` on itself.
pub type TaskEntryFn = extern "C" fn(TaskArg);

/// Opaque argument handed to the entry function.
pub type TaskArg = *mut core::ffi::c_void;

/// Task priority. 0 is reserved for the idle task; applications use
/// `1..N_PRIORITIES`. Higher values run first.
pub type TaskPriority = usize;

/// Opaque task handle: an arena index plus a generation counter. The
/// generation changes whenever a slot is reused, so handles to destroyed
/// tasks are detected instead of aliasing their successors.
#[repr(C)]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct TaskId {
    pub(crate) index: u16,
    pub(crate) generation: u16,
}

/// Lifecycle state of a task.
///
/// Exactly one task is `Active` while the kernel runs; every other live
/// task sits in the one queue matching its state.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum TaskState {
    /// Runnable, queued at its priority.
    Ready,
    /// Currently executing in thread mode. Not a member of any queue.
    Active,
    /// Waiting for a tick count to reach zero.
    Delayed,
    /// Waiting indefinitely on a primitive (see [`BlockReason`]).
    Blocked,
    /// Terminated, queued for the idle reaper.
    Exited,
}

/// What a blocked task is waiting on.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum BlockReason {
    /// Pending on a semaphore with no timeout.
    Semaphore,
}

/// Per-state bookkeeping that accompanies [`TaskState`].
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub(crate) enum BlockInfo {
    None,
    /// Remaining delay, in ticks.
    Ticks(TickType),
    /// Why the task is blocked.
    Reason(BlockReason),
}

/// Options for `create_task`.
pub struct TaskConfig {
    /// Caller-provided stack base (lowest address), or `None` to have the
    /// kernel allocate one. A provided stack is never freed by the kernel.
    pub stack: Option<*mut u8>,
    /// Stack size in bytes. With `stack: None`, 0 means
    /// `DEFAULT_STACK_BYTES`.
    pub stack_size: usize,
    /// Priority in `1..N_PRIORITIES`.
    pub priority: TaskPriority,
    /// Optional human-readable label.
    pub name: Option<&'static str>,
}

impl Default for TaskConfig {
    fn default() -> TaskConfig {
        TaskConfig {
            stack: None,
            stack_size: 0,
            priority: 1,
            name: None,
        }
    }
}

/// Task control block.
///
/// `repr(C)` with `stack_pointer` first: the context-switch glue loads and
/// stores the saved process stack pointer through the TCB's base address.
/// That offset is an implementation contract with the port layer, not part
/// of the public API.
#[repr(C)]
pub(crate) struct Tcb {
    /// Saved top of the task's stack while the task is not active.
    pub(crate) stack_pointer: *mut u32,
    /// Lowest address of the stack region.
    pub(crate) stack_end: *mut u8,
    /// Highest address of the stack region (the initial top).
    pub(crate) stack_start: *mut u8,
    /// First address above the overflow pad; a saved stack pointer at or
    /// below this means the task overflowed.
    pub(crate) stack_soft_end: *mut u8,
    /// Whether the kernel allocated the stack and must free it on destroy.
    pub(crate) stack_owned: bool,
    pub(crate) entry: TaskEntryFn,
    pub(crate) arg: TaskArg,
    pub(crate) name: Option<&'static str>,
    pub(crate) priority: TaskPriority,
    pub(crate) state: TaskState,
    pub(crate) block_info: BlockInfo,
    /// Intrusive queue linkage. A TCB is in at most one queue at a time.
    pub(crate) link: Link,
}

impl Tcb {
    /// Write the sentinel over the overflow pad `[stack_end, stack_soft_end)`.
    pub(crate) fn fill_stack_guard(&mut self) {
        let mut p = self.stack_end;
        while p < self.stack_soft_end {
            unsafe {
                p.write_volatile(STACK_GUARD_FILL);
                p = p.add(1);
            }
        }
    }

    /// Whether the overflow pad still holds the sentinel. Trivially true
    /// when the guard is disabled.
    pub(crate) fn stack_guard_intact(&self) -> bool {
        if STACK_GUARD_BYTES == 0 {
            return true;
        }
        let mut p = self.stack_end;
        while p < self.stack_soft_end {
            if unsafe { p.read_volatile() } != STACK_GUARD_FILL {
                return false;
            }
            p = unsafe { p.add(1) };
        }
        true
    }

    /// Whether the saved stack pointer lies inside the usable region.
    pub(crate) fn stack_pointer_in_bounds(&self) -> bool {
        let sp = self.stack_pointer as usize;
        sp > self.stack_soft_end as usize && sp <= self.stack_start as usize
    }
}
