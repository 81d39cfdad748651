//! SysTick tick source for the Cortex-M4 port.

use cortex_m::peripheral::{SCB, SYST};

use crate::config::SYSTEM_CLOCK_HZ;

/// Program SysTick for `tick_hz` interrupts from the core clock and give
/// SVCall, PendSV and SysTick the lowest exception priority so kernel
/// entries never preempt application interrupt handlers (PendSV then
/// tail-chains behind them). The counter stays disabled until
/// [`start_tick`].
pub fn setup_hardware_timer(tick_hz: u32) {
    let reload = SYSTEM_CLOCK_HZ / tick_hz - 1;
    unsafe {
        let syst = &*SYST::PTR;
        syst.rvr.write(reload);
        syst.cvr.write(0);
        // processor clock as source, counter and interrupt still off
        syst.csr.write(1 << 2);

        let scb = &*SCB::PTR;
        // One priority byte per system handler: 7 = SVCall, 10 = PendSV,
        // 11 = SysTick.
        scb.shpr[7].write(0xFF);
        scb.shpr[10].write(0xFF);
        scb.shpr[11].write(0xFF);
    }
}

/// Enable the SysTick counter and its interrupt. Called from the start
/// handler with interrupts masked, so the first tick arrives only after
/// the first task is running.
pub fn start_tick() {
    unsafe {
        let syst = &*SYST::PTR;
        syst.csr.modify(|csr| csr | 0b11);
    }
}

/// SysTick exception: the kernel tick.
#[unsafe(no_mangle)]
extern "C" fn SysTick() {
    crate::task_manager::TaskManager::handle_tick();
}
