//! Mok port: host-side stand-in for real hardware.
//!
//! There is no exception machinery on the host, so a pended switch runs
//! the scheduler bookkeeping synchronously and the tick only advances when
//! a test calls the tick entry point. Stack frames are not built and task
//! code is never actually entered; tests observe the scheduler through the
//! manager's state accessors instead.

pub mod hardware_timer;
pub mod memory_manager;
pub mod console;

use core::alloc::Layout;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::ports::PortTrait;

static MASKED: AtomicBool = AtomicBool::new(false);

/// PortTrait implementation for the Mok platform.
pub struct Mok;

impl PortTrait for Mok {
    fn init_heap() {
        memory_manager::init_heap();
    }

    fn setup_hardware_timer(tick_hz: u32) {
        hardware_timer::setup_hardware_timer(tick_hz);
    }

    fn start_tick() {
        hardware_timer::start_tick();
    }

    fn pend_switch() {
        crate::task_manager::simulate_switch();
    }

    fn enter_first_task() {
        crate::task_manager::simulate_switch();
    }

    fn interrupt_mask() -> bool {
        MASKED.swap(true, Ordering::Acquire)
    }

    fn interrupt_unmask() {
        MASKED.store(false, Ordering::Release);
    }

    fn initial_frame(top: *mut u32, _entry: usize, _arg: usize, _exit: usize) -> *mut u32 {
        // No frame to build; the saved stack pointer starts at the top.
        top
    }

    fn allocate(layout: Layout) -> *mut u8 {
        memory_manager::allocate(layout)
    }

    fn release(ptr: *mut u8, layout: Layout) {
        memory_manager::release(ptr, layout)
    }

    fn wait_for_interrupt() {}

    fn console_flush() {
        console::flush();
    }

    fn console_note_overflow() {
        console::note_overflow();
    }
}
