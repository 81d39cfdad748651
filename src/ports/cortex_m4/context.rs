//! Cortex-M4 context switching.
//!
//! The Cortex-M split-stack model does most of the work: the kernel and
//! all handlers run on MSP, tasks run in thread mode on PSP. On exception
//! entry the hardware stacks {xPSR, PC, LR, R12, R3-R0} onto the process
//! stack; the handlers here stack the remaining callee-saved bank R4-R11
//! plus nothing else, so a task's complete suspended state is sixteen
//! words on its own stack with the TCB holding the resulting PSP.
//!
//! Three exception handlers make up the layer:
//!
//! - `SVCall` runs once, from `start`: it throws away the boot stack by
//!   resetting MSP to its initial value (first word of the vector table),
//!   selects the first task and enables the tick with interrupts masked,
//!   and returns from the exception into that task.
//! - `PendSV` is the deferred context switch. It runs at the lowest
//!   priority so it tail-chains after every other interrupt.
//! - `SysTick` (in `hardware_timer`) drives delays and preemption and
//!   pends `PendSV` when a switch is due.
//!
//! The application's vector table must route these three exceptions here;
//! with `cortex-m-rt` that happens automatically by symbol name.
//!
//! TODO: FPU lazy stacking is not handled; tasks must not use the FPU
//! until the switch path saves S16-S31 and honours EXC_RETURN bit 4.

use core::arch::{asm, naked_asm};

/// xPSR for a fresh task: only the Thumb execution bit, as Armv7E-M
/// supports nothing else.
const INITIAL_XPSR: u32 = 1 << 24;

/// Helper for pushing words onto a full-descending AAPCS stack.
struct StackPusher(*mut u32);

impl StackPusher {
    /// # Safety
    ///
    /// There must be room below `top` for everything that will be pushed.
    unsafe fn new(top: *mut u32) -> StackPusher {
        StackPusher(top)
    }

    fn push(&mut self, value: u32) {
        unsafe {
            self.0 = self.0.offset(-1);
            self.0.write_volatile(value);
        }
    }

    fn current(&self) -> *mut u32 {
        self.0
    }
}

/// Build the frame a new task first resumes from: the hardware-stacked
/// exception frame (xPSR, PC = entry, LR = exit trampoline, R12, R3-R1
/// dummies, R0 = argument) followed by a dummy R11-R4 bank.
pub fn initial_frame(top: *mut u32, entry: usize, arg: usize, exit: usize) -> *mut u32 {
    // create_task guarantees the stack fits a frame plus headroom.
    let mut pusher = unsafe { StackPusher::new(top) };

    pusher.push(INITIAL_XPSR);
    pusher.push(entry as u32);
    pusher.push(exit as u32);
    pusher.push(0); // R12
    pusher.push(0); // R3
    pusher.push(0); // R2
    pusher.push(0); // R1
    pusher.push(arg as u32);

    for _ in 0..8 {
        pusher.push(0); // R11 down to R4
    }

    pusher.current()
}

/// Pend the context-switch exception. It fires once no other handler is
/// active and interrupts are unmasked.
pub fn pend_switch() {
    cortex_m::peripheral::SCB::set_pendsv();
    cortex_m::asm::isb();
}

/// Raise the one-shot supervisor call that starts the scheduler. Does not
/// return: the handler rewinds MSP and exits into the first task.
pub fn enter_first_task() {
    unsafe {
        asm!("svc 0", options(nomem, nostack));
    }
    // The SVCall handler never returns here.
    unreachable!();
}

pub fn interrupt_mask() -> bool {
    let was_masked = !cortex_m::register::primask::read().is_active();
    cortex_m::interrupt::disable();
    was_masked
}

pub fn interrupt_unmask() {
    unsafe { cortex_m::interrupt::enable() }
}

pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

extern "C" fn switch_save(psp: *mut u32) {
    crate::task_manager::switch_save_context(psp);
}

extern "C" fn switch_select() -> *mut u32 {
    crate::task_manager::switch_select_next()
}

extern "C" fn start_first() -> *mut u32 {
    crate::task_manager::start_select_first()
}

/// PendSV: the context switch.
///
/// On entry the hardware has stacked {xPSR, PC, LR, R12, R3-R0} on the
/// outgoing task's PSP. Stack R4-R11 after them, let the kernel record
/// the resulting PSP (and run the stack-overflow check) and pick the next
/// task, then rebuild in reverse and return to thread mode on the process
/// stack.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn PendSV() {
    naked_asm!(
        r#"
        mrs     r0, psp
        stmdb   r0!, {{r4-r11}}

        // record the outgoing stack pointer in its TCB
        bl      {save}

        // pick the incoming task; returns its saved PSP
        bl      {select}

        ldmia   r0!, {{r4-r11}}
        msr     psp, r0

        // return to thread mode on the process stack
        mov     lr, #0xFFFFFFFD
        bx      lr
        "#,
        save = sym switch_save,
        select = sym switch_select,
    );
}

/// SVCall: the start handler.
///
/// Resets MSP to its initial value (the boot stack is abandoned, handlers
/// get the whole main stack from here on), lets the kernel select the
/// first task and start the tick, and returns from the exception into
/// that task's entry function.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn SVCall() {
    naked_asm!(
        r#"
        // initial MSP = first word of the vector table
        ldr     r0, =0xE000ED08
        ldr     r0, [r0]
        ldr     r0, [r0]
        msr     msp, r0

        // first selection + tick enable; returns the first task's PSP
        bl      {start}

        ldmia   r0!, {{r4-r11}}
        msr     psp, r0

        mov     lr, #0xFFFFFFFD
        bx      lr
        "#,
        start = sym start_first,
    );
}
