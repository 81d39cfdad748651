//! Kernel tick time base.
//!
//! A single system timer counts ticks delivered by the port's periodic
//! tick source (SysTick on the Cortex-M4 port). The counter is advanced
//! only by the tick handler and read under the interrupt mask, so thread
//! code always observes a consistent value.

use crate::config::TICK_HZ;
use crate::critical;
use crate::ports::{Port, PortTrait};

/// Type for tick counting. Signed so that non-positive values can serve as
/// the infinite-timeout sentinel for semaphore pends.
pub type TickType = i64;

/// Operating system timer.
pub struct Timer {
    /// Number of ticks since `start`.
    tick_counter: TickType,
}

static mut TIMER: Timer = Timer { tick_counter: 0 };

fn timer() -> &'static mut Timer {
    // Single-core: mutation happens in the tick handler, reads are masked.
    unsafe { &mut *core::ptr::addr_of_mut!(TIMER) }
}

impl Timer {
    /// Program the port's tick source at [`TICK_HZ`]. Called once during
    /// `start`; the tick does not run before the scheduler does.
    pub fn setup_timer() {
        Port::setup_hardware_timer(TICK_HZ);
    }

    /// Advance the counter by one tick. Tick-handler context only.
    pub(crate) fn advance() {
        timer().tick_counter += 1;
    }

    /// Returns the tick counter.
    pub fn get_tick_counter() -> TickType {
        critical::critical_section(|| timer().tick_counter)
    }

    /// Convert milliseconds to ticks, rounding to the nearest tick.
    pub fn ms_to_ticks(ms: u32) -> TickType {
        ((u64::from(ms) * u64::from(TICK_HZ) + 500) / 1000) as TickType
    }

    /// Reset the counter to zero. Intended for tests that measure tick
    /// distances from a known origin.
    pub fn reset_timer() {
        critical::critical_section(|| timer().tick_counter = 0);
    }
}
