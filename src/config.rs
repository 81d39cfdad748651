//! Compile-time kernel configuration.
//!
//! Everything here is a build-time constant; there is no runtime
//! configuration store. Scheduling policy (preemptive or purely
//! cooperative) is selected with the `preemption` cargo feature.

use crate::timer::TickType;

/// Number of distinct task priority levels.
///
/// Valid task priorities are `1..N_PRIORITIES`; priority 0 is reserved for
/// the idle task and is scanned last by the scheduler.
pub const N_PRIORITIES: usize = 7;

/// Tick frequency in Hz. Governs the resolution of `delay` and of
/// semaphore timeouts.
pub const TICK_HZ: u32 = 1000;

/// Core clock the tick source divides down from. The Cortex-M4 port runs
/// SysTick from the processor clock; boards with a different clock tree
/// adjust this.
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Stack size, in bytes, used when `TaskConfig` does not supply one.
pub const DEFAULT_STACK_BYTES: usize = 2048;

/// Stack size of the idle task. It only runs the reaper loop, so it can be
/// smaller than a default task stack but must still hold a full saved
/// register frame plus the allocator release path.
pub const IDLE_STACK_BYTES: usize = 1024;

/// Size of the stack-overflow pad at the low end of every task stack.
/// Zero disables the guard entirely.
pub const STACK_GUARD_BYTES: usize = 32;

/// Byte written over the guard pad at task creation. A well-behaved task
/// never touches the pad, so any other value there means an overflow.
pub const STACK_GUARD_FILL: u8 = 0xDE;

/// Sentinel timeout for `pend`: any value less than or equal to zero means
/// "wait forever".
pub const WAIT_FOREVER: TickType = -1;

/// Whether the tick handler may displace a running task in favour of a
/// strictly higher-priority one.
pub const PREEMPTION: bool = cfg!(feature = "preemption");
