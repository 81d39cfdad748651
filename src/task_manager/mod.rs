//! Task Manager Module for the Cortos kernel.
//!
//! This module provides the task management infrastructure: the task
//! control block arena, the priority scheduler, the public task lifecycle
//! API, and the idle task that reclaims exited tasks. The manager is a
//! process-wide singleton; all operations are associated functions on
//! [`TaskManager`].
//!
//! # Architecture
//!
//! Tasks live in an arena of control-block slots addressed by opaque
//! generational handles ([`TaskId`]). A task is either *active* (executing
//! in thread mode, member of no queue) or sits in exactly one queue
//! matching its state: a ready queue at its priority, or the global
//! delayed, blocked, or exited queue. Context switches are requested by
//! pending the port's switch handler; the handler saves the outgoing
//! register bank, asks the scheduler for the next task, and restores the
//! incoming bank. The periodic tick ages delayed tasks and, when the
//! `preemption` feature is enabled, displaces the active task as soon as a
//! strictly higher-priority task becomes ready.
//!
//! # Usage
//!
//! ```rust,no_run
//! use cortos::task_manager::{TaskArg, TaskConfig, TaskManager};
//!
//! fn blink(_arg: TaskArg) {
//!     loop {
//!         // toggle a LED here
//!         TaskManager::delay(500);
//!     }
//! }
//!
//! fn run() -> ! {
//!     cortos::init_system();
//!     TaskManager::create_task(
//!         blink,
//!         core::ptr::null_mut(),
//!         TaskConfig {
//!             name: Some("blink"),
//!             ..TaskConfig::default()
//!         },
//!     )
//!     .unwrap();
//!     TaskManager::start();
//! }
//! ```

extern crate alloc;

use core::alloc::Layout;
use core::ptr;

use crate::config::{
    DEFAULT_STACK_BYTES, IDLE_STACK_BYTES, N_PRIORITIES, STACK_GUARD_BYTES,
};
use crate::critical;
use crate::error::{KernelError, KernelResult};
use crate::list::NIL;
use crate::ports::{Port, PortTrait};
use crate::timer::{TickType, Timer};

mod scheduler;
mod task;

pub use task::{
    BlockReason, TaskArg, TaskConfig, TaskEntryFn, TaskId, TaskPriority, TaskState,
};

use scheduler::QueueId;
use task::{BlockInfo, Tcb};

/// The task manager implementation used by this kernel.
pub type TaskManager = scheduler::PreemptiveTaskManager;

/// Global task manager instance.
///
/// Mutated only under the interrupt mask or from handler mode; all access
/// funnels through [`manager`], never through the static directly.
static mut TASK_MANAGER: TaskManager = TaskManager::new();

pub(crate) fn manager() -> &'static mut TaskManager {
    // Single-core kernel singleton: exclusive access is guaranteed by the
    // interrupt-mask discipline, not by the borrow checker.
    unsafe { &mut *ptr::addr_of_mut!(TASK_MANAGER) }
}

/// A saved register frame (16 words) must fit on every stack, along with
/// the guard pad and a little working headroom.
pub(crate) const MIN_TASK_STACK_BYTES: usize = 16 * 4 + STACK_GUARD_BYTES + 32;

impl TaskManager {
    /// Create a task and queue it at `config.priority`.
    ///
    /// The task will not execute before the scheduler next runs. Fails
    /// with `BadParameter` for a priority outside `1..N_PRIORITIES` or a
    /// stack smaller than the saved-frame minimum, and `OutOfMemory` when
    /// the TCB slot or stack cannot be allocated.
    pub fn create_task(
        entry: TaskEntryFn,
        arg: TaskArg,
        config: TaskConfig,
    ) -> KernelResult<TaskId> {
        if config.priority == 0 || config.priority >= N_PRIORITIES {
            return Err(KernelError::BadParameter);
        }
        let priority = config.priority;
        Self::create_with_priority(entry, arg, config, priority)
    }

    fn create_with_priority(
        entry: TaskEntryFn,
        arg: TaskArg,
        config: TaskConfig,
        priority: TaskPriority,
    ) -> KernelResult<TaskId> {
        let requested = if config.stack_size == 0 && config.stack.is_none() {
            DEFAULT_STACK_BYTES
        } else {
            config.stack_size
        };
        if requested < MIN_TASK_STACK_BYTES {
            return Err(KernelError::BadParameter);
        }
        // Keep the region a multiple of the AAPCS stack alignment so the
        // initial top needs no rounding and the release layout is exact.
        let size = (requested + 7) & !7;

        let (stack_end, stack_owned) = match config.stack {
            Some(base) => {
                if base.is_null() {
                    return Err(KernelError::BadParameter);
                }
                (base, false)
            }
            None => {
                let layout = match Layout::from_size_align(size, 8) {
                    Ok(layout) => layout,
                    Err(_) => return Err(KernelError::BadParameter),
                };
                let base = Port::allocate(layout);
                if base.is_null() {
                    return Err(KernelError::OutOfMemory);
                }
                (base, true)
            }
        };

        // Full-descending stack: the top is one past the region, aligned
        // down for caller-provided buffers of arbitrary alignment.
        let top = ((stack_end as usize + size) & !7) as *mut u8;

        let mut tcb = Tcb {
            stack_pointer: ptr::null_mut(),
            stack_end,
            stack_start: top,
            stack_soft_end: unsafe { stack_end.add(STACK_GUARD_BYTES) },
            stack_owned,
            entry,
            arg,
            name: config.name,
            priority,
            state: TaskState::Ready,
            block_info: BlockInfo::None,
            link: crate::list::Link::detached(),
        };
        tcb.fill_stack_guard();
        tcb.stack_pointer = Port::initial_frame(
            tcb.stack_start as *mut u32,
            tcb.entry as usize,
            tcb.arg as usize,
            task_exit_trampoline as usize,
        );

        let id = critical::critical_section(|| {
            let tm = manager();
            let index = match tm.allocate_slot() {
                Some(index) => index,
                None => return Err(KernelError::OutOfMemory),
            };
            tm.slots[index as usize].tcb = Some(tcb);
            tm.append_to(QueueId::Ready(priority), index);
            Ok(tm.id_of(index))
        });
        if id.is_err() && stack_owned {
            Port::release(stack_end, Layout::from_size_align(size, 8).unwrap());
        }
        id
    }

    /// Give up the processor. The calling task re-enters its ready queue
    /// at the tail, so equal-priority tasks rotate FIFO. Returns when the
    /// task is scheduled again.
    pub fn yield_task() {
        critical::critical_section(|| {
            let tm = manager();
            if !tm.started {
                panic!("Error: yield_task: scheduler is not started.");
            }
            tm.suspend_active(TaskState::Ready, BlockInfo::None);
        });
        Port::pend_switch();
    }

    /// Suspend the calling task for at least `ms` milliseconds, rounded to
    /// the nearest tick. `delay(0)` is a no-op. The task becomes ready
    /// again when the count expires or an explicit wake cancels the delay.
    pub fn delay(ms: u32) {
        if ms == 0 {
            return;
        }
        let ticks = Timer::ms_to_ticks(ms);
        critical::critical_section(|| {
            let tm = manager();
            if !tm.started {
                panic!("Error: delay: scheduler is not started.");
            }
            tm.suspend_active(TaskState::Delayed, BlockInfo::Ticks(ticks));
        });
        Port::pend_switch();
    }

    /// Destroy a task.
    ///
    /// Destroying the calling task queues it for the idle reaper and does
    /// not return control to it once the pending switch fires. Destroying
    /// any other task detaches it from whatever queue it is in and
    /// releases its TCB immediately, along with its stack if the kernel
    /// allocated it. The idle task cannot be destroyed.
    pub fn destroy_task(id: TaskId) -> KernelResult<()> {
        let outcome = critical::critical_section(|| {
            let tm = manager();
            let index = match tm.resolve(id) {
                Some(index) => index,
                None => return Err(KernelError::BadParameter),
            };
            if index == tm.idle {
                return Err(KernelError::BadParameter);
            }
            if index == tm.active {
                tm.suspend_active(TaskState::Exited, BlockInfo::None);
                return Ok(None);
            }
            let queue = tm.queue_for(index);
            tm.remove_from(queue, index);
            let release = stack_release_of(tm.tcb(index));
            tm.release_slot(index);
            Ok(Some(release))
        })?;
        match outcome {
            None => Port::pend_switch(),
            Some(release) => {
                if let Some((base, layout)) = release {
                    Port::release(base, layout);
                }
            }
        }
        Ok(())
    }

    /// Start the kernel. Creates the idle task, programs the tick source,
    /// and enters the first task through the port's start handler. Never
    /// returns; starting twice is a scheduler fault.
    pub fn start() -> ! {
        Self::prepare_start();
        Port::enter_first_task();
        // Not reached on hardware: the start handler switched to the
        // first task's stack and never returns here.
        loop {
            Port::wait_for_interrupt();
        }
    }

    fn prepare_start() {
        if manager().started {
            panic!("Error: start: scheduler is already started.");
        }
        let idle = Self::create_with_priority(
            idle_entry,
            ptr::null_mut(),
            TaskConfig {
                stack: None,
                stack_size: IDLE_STACK_BYTES,
                priority: 0,
                name: Some("idle"),
            },
            0,
        );
        let idle = match idle {
            Ok(id) => id,
            Err(err) => panic!("Error: start: failed to create the idle task: {:?}.", err),
        };
        Timer::setup_timer();
        critical::critical_section(|| {
            let tm = manager();
            tm.idle = idle.index;
            tm.started = true;
        });
    }

    /// Host-port variant of [`start`]: prepares the same state and
    /// performs the first task selection synchronously, then returns so
    /// tests can drive the scheduler step by step.
    pub fn test_start() {
        Self::prepare_start();
        critical::critical_section(|| manager().select_next_active());
    }

    /// Drain the exited queue, releasing each reaped task's TCB slot and,
    /// when kernel-owned, its stack. This is the only place exited-task
    /// memory is freed. Runs in the idle task; callable from tests.
    /// Returns the number of tasks reaped.
    pub fn reap_exited() -> usize {
        let mut reaped = 0;
        loop {
            let taken = critical::critical_section(|| {
                let tm = manager();
                let index = tm.take_exited()?;
                let release = stack_release_of(tm.tcb(index));
                tm.release_slot(index);
                Some(release)
            });
            match taken {
                Some(release) => {
                    if let Some((base, layout)) = release {
                        Port::release(base, layout);
                    }
                    reaped += 1;
                }
                None => break,
            }
        }
        reaped
    }

    /// Verify the stack-overflow pad of every live task and terminate any
    /// task whose pad was clobbered. Run opportunistically by the idle
    /// task. Returns the number of tasks killed.
    pub fn check_stack_guards() -> usize {
        if STACK_GUARD_BYTES == 0 {
            return 0;
        }
        let (killed, pend) = critical::critical_section(|| {
            let tm = manager();
            let mut killed = 0;
            let mut pend = false;
            for index in 0..tm.slots.len() as u16 {
                if tm.slots[index as usize].tcb.is_none() {
                    continue;
                }
                let tcb = tm.tcb(index);
                if tcb.stack_guard_intact() && tcb.stack_pointer_in_bounds() {
                    continue;
                }
                match tm.tcb(index).state {
                    TaskState::Exited => {}
                    TaskState::Active => {
                        tm.suspend_active(TaskState::Exited, BlockInfo::None);
                        killed += 1;
                        pend = true;
                    }
                    _ => {
                        let queue = tm.queue_for(index);
                        tm.remove_from(queue, index);
                        let tcb = tm.tcb_mut(index);
                        tcb.state = TaskState::Exited;
                        tcb.block_info = BlockInfo::None;
                        tm.append_to(QueueId::Exited, index);
                        killed += 1;
                    }
                }
            }
            (killed, pend)
        });
        if pend {
            Port::pend_switch();
        }
        killed
    }

    /// Handle of the task currently executing, if the kernel has started.
    pub fn current_task() -> Option<TaskId> {
        critical::critical_section(|| {
            let tm = manager();
            if tm.active == NIL {
                None
            } else {
                Some(tm.id_of(tm.active))
            }
        })
    }

    /// Tick entry point: advances the time base, ages delayed tasks, and
    /// pends a switch when preemption demands one. Called by the port's
    /// tick handler; tests call it to simulate ticks.
    pub fn handle_tick() {
        Timer::advance();
        let pend = critical::critical_section(|| manager().tick_delayed());
        if pend {
            Port::pend_switch();
        }
    }

    // ---- state introspection, mainly for tests -------------------------

    /// Current lifecycle state of a task, or `None` for a stale handle.
    pub fn task_state(id: TaskId) -> Option<TaskState> {
        critical::critical_section(|| {
            let tm = manager();
            tm.resolve(id).map(|index| tm.tcb(index).state)
        })
    }

    /// Name given at creation, if any.
    pub fn task_name(id: TaskId) -> Option<&'static str> {
        critical::critical_section(|| {
            let tm = manager();
            tm.resolve(id).and_then(|index| tm.tcb(index).name)
        })
    }

    /// Whether a task's overflow pad is still intact.
    pub fn stack_guard_intact(id: TaskId) -> Option<bool> {
        critical::critical_section(|| {
            let tm = manager();
            tm.resolve(id).map(|index| tm.tcb(index).stack_guard_intact())
        })
    }

    /// Number of tasks queued ready at the given priority. The active
    /// task is in no queue and therefore not counted.
    pub fn count_tasks_with_priority(priority: TaskPriority) -> usize {
        if priority >= N_PRIORITIES {
            panic!(
                "Error: count_tasks_with_priority: priority {} is invalid. It must be between 0 and {}.",
                priority, N_PRIORITIES
            );
        }
        critical::critical_section(|| manager().ready_len(priority))
    }

    /// Count all live tasks, whatever their state.
    pub fn count_all_tasks() -> usize {
        critical::critical_section(|| manager().live_tasks())
    }

    /// Number of tasks currently in the delayed queue.
    pub fn count_delayed_tasks() -> usize {
        critical::critical_section(|| manager().delayed_len())
    }

    /// Number of tasks currently blocked on a primitive.
    pub fn count_blocked_tasks() -> usize {
        critical::critical_section(|| manager().blocked_len())
    }

    /// Number of exited tasks awaiting the reaper.
    pub fn count_exited_tasks() -> usize {
        critical::critical_section(|| manager().exited_len())
    }

    /// Check if the task manager has no tasks at all.
    pub fn is_empty() -> bool {
        Self::count_all_tasks() == 0
    }

    /// Reset the task manager to its default state, releasing every
    /// kernel-owned stack. Intended for tests that share the singleton.
    pub fn reset_task_manager() {
        let tm = manager();
        for slot in tm.slots.iter_mut() {
            if let Some(tcb) = slot.tcb.take() {
                if let Some((base, layout)) = stack_release_of(&tcb) {
                    Port::release(base, layout);
                }
            }
        }
        tm.slots.clear();
        tm.clear_queues();
        tm.active = NIL;
        tm.idle = NIL;
        tm.started = false;
    }

    // ---- internals shared with the semaphore layer ---------------------

    /// Mark the active task blocked for `reason` and pend a switch. The
    /// caller must hold the interrupt mask; the switch fires on unmask.
    pub(crate) fn block_current_masked(reason: BlockReason) {
        manager().suspend_active(TaskState::Blocked, BlockInfo::Reason(reason));
        Port::pend_switch();
    }

    /// Mark the active task delayed for `ticks` and pend a switch. The
    /// caller must hold the interrupt mask.
    pub(crate) fn delay_current_masked(ticks: TickType) {
        manager().suspend_active(TaskState::Delayed, BlockInfo::Ticks(ticks));
        Port::pend_switch();
    }

    /// Wake a blocked or delayed task (post / cancel-delay path). Returns
    /// `false` for a stale handle. Pends a switch when the woken task
    /// outranks the active one.
    pub(crate) fn wake_task(id: TaskId) -> bool {
        let woke = critical::critical_section(|| {
            let tm = manager();
            tm.resolve(id).map(|index| tm.wake(index))
        });
        match woke {
            Some(pend) => {
                if pend {
                    Port::pend_switch();
                }
                true
            }
            None => false,
        }
    }

    /// Whether a handle still designates a live task.
    pub(crate) fn task_is_live(id: TaskId) -> bool {
        critical::critical_section(|| manager().resolve(id).is_some())
    }
}

/// Stack release info for a TCB: `None` when the caller owns the stack.
fn stack_release_of(tcb: &Tcb) -> Option<(*mut u8, Layout)> {
    if !tcb.stack_owned {
        return None;
    }
    let size = tcb.stack_start as usize - tcb.stack_end as usize;
    // The layout mirrors the allocation in `create_with_priority`.
    Some((tcb.stack_end, Layout::from_size_align(size, 8).unwrap()))
}

/// Landing point when an entry function returns: destroy the task. The
/// port pushes this as the initial link register of every task frame.
pub(crate) extern "C" fn task_exit_trampoline() -> ! {
    if let Some(id) = TaskManager::current_task() {
        let _ = TaskManager::destroy_task(id);
    }
    // Not reached once the pended switch fires; the reaper frees us.
    loop {
        Port::wait_for_interrupt();
    }
}

#[cfg(not(feature = "c-library"))]
fn idle_entry(_arg: TaskArg) {
    idle_loop();
}

#[cfg(feature = "c-library")]
extern "C" fn idle_entry(_arg: TaskArg) {
    idle_loop();
}

/// The idle task: reap exited tasks, verify stack guards, flush the
/// console, sleep until the next interrupt, yield. It never blocks,
/// delays, or exits, so the scheduler always has a runnable task.
fn idle_loop() -> ! {
    loop {
        TaskManager::reap_exited();
        TaskManager::check_stack_guards();
        Port::console_flush();
        Port::wait_for_interrupt();
        TaskManager::yield_task();
    }
}

// ---- handler-mode hooks used by the port's exception glue --------------

/// Store the outgoing task's stack pointer from the switch handler and
/// run the overflow check; a task caught overflowing is terminated on the
/// spot (its state becomes `Exited` before the selection below files it).
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) fn switch_save_context(psp: *mut u32) {
    let ok = critical::critical_section(|| manager().record_active_stack_pointer(psp));
    if !ok {
        Port::console_note_overflow();
    }
}

/// Select the next task from the switch handler; returns its saved stack
/// pointer for the restore sequence.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) fn switch_select_next() -> *mut u32 {
    critical::critical_section(|| {
        manager().select_next_active();
        manager().active_stack_pointer()
    })
}

/// First selection, from the start handler: pick the first task and let
/// the tick run from here on, all under the mask.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) fn start_select_first() -> *mut u32 {
    critical::critical_section(|| {
        manager().select_next_active();
        Port::start_tick();
        manager().active_stack_pointer()
    })
}

/// Synchronous bookkeeping switch used by the host port, where no
/// exception machinery exists.
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub(crate) fn simulate_switch() {
    critical::critical_section(|| {
        let tm = manager();
        if tm.started {
            tm.select_next_active();
        }
    });
}
