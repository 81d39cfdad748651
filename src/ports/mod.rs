//! Hardware abstraction layer.
//!
//! Everything the kernel core needs from the outside world goes through
//! [`PortTrait`]: the periodic tick source, the context-switch trigger and
//! frame layout, the interrupt mask, the memory allocator, and the console
//! writer. The active port is selected at compile time: the Cortex-M4 port
//! on bare-metal ARM builds, the mok port everywhere else so the kernel's
//! logic can be exercised with `cargo test` on the host.

use core::alloc::Layout;

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "arm", target_os = "none"))] {
        pub mod cortex_m4;
        pub type Port = cortex_m4::CortexM4;
    } else {
        pub mod mok;
        pub type Port = mok::Mok;
    }
}

/// Operations every port provides to the kernel core.
pub trait PortTrait {
    /// Prepare the heap backing the kernel allocator.
    fn init_heap();

    /// Program the periodic tick source at `tick_hz`. The tick must not
    /// fire until [`PortTrait::start_tick`].
    fn setup_hardware_timer(tick_hz: u32);

    /// Let the configured tick source run. Called from the start handler
    /// while interrupts are masked.
    fn start_tick();

    /// Request that the context-switch handler runs once current handlers
    /// (and, on hardware, the interrupt mask) allow it.
    fn pend_switch();

    /// Transfer control into the first selected task. On hardware this
    /// raises the one-shot supervisor call and does not return.
    fn enter_first_task();

    /// Disable interrupts process-wide. Returns whether they were already
    /// disabled, so nesting can restore correctly.
    fn interrupt_mask() -> bool;

    /// Re-enable interrupts process-wide.
    fn interrupt_unmask();

    /// Lay out the architectural frame a fresh task resumes from. `top`
    /// is the 8-byte-aligned upper end of the stack; returns the resulting
    /// stack pointer to store in the TCB.
    fn initial_frame(top: *mut u32, entry: usize, arg: usize, exit: usize) -> *mut u32;

    /// Allocate memory for kernel objects (TCB stacks, semaphores).
    /// Thread context only. Null on exhaustion.
    fn allocate(layout: Layout) -> *mut u8;

    /// Release memory obtained from [`PortTrait::allocate`]. Thread
    /// context only.
    fn release(ptr: *mut u8, layout: Layout);

    /// Idle until something happens (WFI on hardware).
    fn wait_for_interrupt();

    /// Flush any buffered console output. Used by the idle reaper.
    fn console_flush();

    /// Report a detected task stack overflow on the diagnostics console.
    fn console_note_overflow();
}
