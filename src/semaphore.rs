//! Counting and binary semaphores.
//!
//! Classical pend/post (P/V) primitives for task synchronization. A pend
//! may suspend the calling task, indefinitely or up to a tick timeout,
//! and a post never blocks. Waiting tasks are served in the FIFO order in
//! which their pends suspended, modulo timeouts.
//!
//! Each semaphore carries its own low-level lock byte, taken with a
//! compare-and-swap and released by a scope guard on every exit path, so
//! value inspection and waiter-queue surgery are atomic with respect to
//! other tasks on this core. A post wakes at most one waiter and does
//! *not* hand the unit over: the woken task races to consume it in its own
//! critical section, and re-suspends if it loses.
//!
//! Semaphores are created from thread context and destroyed only once no
//! live waiter remains. Handles are opaque and copyable; using a handle
//! after destroy is a caller error, exactly as with any other kernel
//! object handle.

extern crate alloc;

use alloc::vec::Vec;
use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::ops::ControlFlow;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::critical;
use crate::error::{KernelError, KernelResult};
use crate::list::{Link, LinkStore, List, NIL};
use crate::ports::{Port, PortTrait};
use crate::task_manager::{BlockReason, TaskId, TaskManager};
use crate::timer::{TickType, Timer};

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
enum SemaphoreKind {
    /// Value counts up without bound.
    Counting,
    /// Value saturates at 1; extra posts are dropped.
    Binary,
}

/// A waiter record: one suspended pend, referencing the waiting task.
struct Waiter {
    task: TaskId,
    link: Link,
}

/// Arena of waiter records owned by one semaphore. Records are allocated
/// by pend (thread context) and reclaimed by the pend that owns them, or
/// by post/destroy when the owning task was destroyed while waiting.
struct WaiterArena {
    slots: Vec<Option<Waiter>>,
}

impl LinkStore for WaiterArena {
    fn link(&self, index: u16) -> Link {
        match self.slots[index as usize].as_ref() {
            Some(waiter) => waiter.link,
            None => panic!("Error: link: waiter slot {} is vacant.", index),
        }
    }

    fn set_link(&mut self, index: u16, link: Link) {
        match self.slots[index as usize].as_mut() {
            Some(waiter) => waiter.link = link,
            None => panic!("Error: set_link: waiter slot {} is vacant.", index),
        }
    }
}

impl WaiterArena {
    const fn new() -> WaiterArena {
        WaiterArena { slots: Vec::new() }
    }

    fn insert(&mut self, task: TaskId) -> u16 {
        let waiter = Waiter {
            task,
            link: Link::detached(),
        };
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(waiter);
                return index as u16;
            }
        }
        self.slots.push(Some(waiter));
        (self.slots.len() - 1) as u16
    }

    fn free(&mut self, index: u16) {
        self.slots[index as usize] = None;
    }

    fn task_of(&self, index: u16) -> TaskId {
        match self.slots[index as usize].as_ref() {
            Some(waiter) => waiter.task,
            None => panic!("Error: task_of: waiter slot {} is vacant.", index),
        }
    }
}

struct SemState {
    kind: SemaphoreKind,
    value: u32,
    waiters: WaiterArena,
    queue: List,
}

impl SemState {
    /// Drop the waiter record owned by a finishing pend, wherever the
    /// record currently is (queued, or already detached by a post).
    fn discard_waiter(&mut self, index: u16) {
        if index == NIL {
            return;
        }
        if !self.waiters.link(index).is_detached() {
            self.queue.remove(&mut self.waiters, index);
        }
        self.waiters.free(index);
    }

    /// Reclaim queued records whose task no longer exists.
    fn prune_stale(&mut self) {
        loop {
            let candidate = self.queue.iterate(&self.waiters, |index| {
                if TaskManager::task_is_live(self.waiters.task_of(index)) {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(())
                }
            });
            match candidate {
                Some(index) if !TaskManager::task_is_live(self.waiters.task_of(index)) => {
                    self.queue.remove(&mut self.waiters, index);
                    self.waiters.free(index);
                }
                _ => break,
            }
        }
    }
}

/// Low-level lock byte guarding one semaphore's state.
struct SpinLock {
    locked: AtomicBool,
}

struct SpinGuard<'a> {
    lock: &'a SpinLock,
}

impl SpinLock {
    const fn new() -> SpinLock {
        SpinLock {
            locked: AtomicBool::new(false),
        }
    }

    fn acquire(&self) -> SpinGuard<'_> {
        while self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        SpinGuard { lock: self }
    }
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// A counting or binary semaphore.
pub struct Semaphore {
    lock: SpinLock,
    state: UnsafeCell<SemState>,
}

// The lock byte serializes all access to `state` on this single core.
unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

/// Opaque handle to a semaphore. Copyable and shareable between tasks.
#[repr(transparent)]
#[derive(Copy, Clone)]
pub struct SemaphoreHandle(NonNull<Semaphore>);

unsafe impl Send for SemaphoreHandle {}
unsafe impl Sync for SemaphoreHandle {}

impl Semaphore {
    fn create(kind: SemaphoreKind, value: u32) -> KernelResult<SemaphoreHandle> {
        let layout = Layout::new::<Semaphore>();
        let raw = Port::allocate(layout) as *mut Semaphore;
        if raw.is_null() {
            return Err(KernelError::OutOfMemory);
        }
        unsafe {
            raw.write(Semaphore {
                lock: SpinLock::new(),
                state: UnsafeCell::new(SemState {
                    kind,
                    value,
                    waiters: WaiterArena::new(),
                    queue: List::new(),
                }),
            });
            Ok(SemaphoreHandle(NonNull::new_unchecked(raw)))
        }
    }

    /// Create a counting semaphore with the given start value.
    pub fn create_counting(initial: u32) -> KernelResult<SemaphoreHandle> {
        Self::create(SemaphoreKind::Counting, initial)
    }

    /// Create a binary semaphore. The initial value is always 0.
    pub fn create_binary() -> KernelResult<SemaphoreHandle> {
        Self::create(SemaphoreKind::Binary, 0)
    }

    /// Destroy a semaphore. Fails with `InUse`, freeing nothing, while
    /// any live task is still waiting on it. Waiter records left by
    /// tasks that were destroyed mid-wait are reclaimed here.
    pub fn destroy(handle: SemaphoreHandle) -> KernelResult<()> {
        let sem = unsafe { handle.0.as_ref() };
        {
            let _guard = sem.lock.acquire();
            let state = unsafe { &mut *sem.state.get() };
            state.prune_stale();
            if !state.queue.is_empty() {
                return Err(KernelError::InUse);
            }
        }
        let raw = handle.0.as_ptr();
        unsafe {
            ptr::drop_in_place(raw);
        }
        Port::release(raw as *mut u8, Layout::new::<Semaphore>());
        Ok(())
    }
}

impl SemaphoreHandle {
    fn sem(&self) -> &Semaphore {
        unsafe { self.0.as_ref() }
    }

    /// Take one unit, suspending the calling task until one is available.
    ///
    /// A `timeout` of [`crate::config::WAIT_FOREVER`] (any value ≤ 0)
    /// blocks indefinitely; a positive `timeout` bounds the wait to that
    /// many ticks and returns `Err(Timeout)` on expiry without consuming a
    /// post. Waiters are woken in the order their pends suspended; a woken
    /// task that loses the race for the unit suspends again for whatever
    /// remains of its timeout.
    pub fn pend(&self, timeout: TickType) -> KernelResult<()> {
        let me = match TaskManager::current_task() {
            Some(id) => id,
            None => return Err(KernelError::SchedulerFault),
        };
        let deadline = if timeout > 0 {
            Some(Timer::get_tick_counter() + timeout)
        } else {
            None
        };
        let mut waiter = NIL;
        loop {
            match self.pend_iteration(me, deadline, &mut waiter) {
                ControlFlow::Break(result) => return result,
                // Resumed by a post or by delay expiry; try again.
                ControlFlow::Continue(()) => {}
            }
        }
    }

    /// Take one unit if immediately available; `Err(Timeout)` otherwise.
    /// Never suspends.
    pub fn try_pend(&self) -> KernelResult<()> {
        let sem = self.sem();
        let _guard = sem.lock.acquire();
        let state = unsafe { &mut *sem.state.get() };
        if state.value > 0 {
            state.value -= 1;
            Ok(())
        } else {
            Err(KernelError::Timeout)
        }
    }

    /// One iteration of [`pend`]'s wait loop: consume if possible,
    /// otherwise enqueue the calling task and suspend it once. Returns
    /// `Ok(true)` when a unit was consumed without suspending and
    /// `Ok(false)` when the task was enqueued and suspended. Exposed so
    /// the host port's tests can walk the blocking protocol one scheduler
    /// step at a time; applications want [`pend`].
    pub fn pend_step(&self, timeout: TickType) -> KernelResult<bool> {
        let me = match TaskManager::current_task() {
            Some(id) => id,
            None => return Err(KernelError::SchedulerFault),
        };
        let deadline = if timeout > 0 {
            Some(Timer::get_tick_counter() + timeout)
        } else {
            None
        };
        let mut waiter = NIL;
        match self.pend_iteration(me, deadline, &mut waiter) {
            ControlFlow::Break(result) => result.map(|()| true),
            ControlFlow::Continue(()) => Ok(false),
        }
    }

    fn pend_iteration(
        &self,
        me: TaskId,
        deadline: Option<TickType>,
        waiter: &mut u16,
    ) -> ControlFlow<KernelResult<()>> {
        let sem = self.sem();
        let guard = sem.lock.acquire();
        let state = unsafe { &mut *sem.state.get() };

        if state.value > 0 {
            state.value -= 1;
            state.discard_waiter(*waiter);
            return ControlFlow::Break(Ok(()));
        }

        let remaining = match deadline {
            None => None,
            Some(deadline) => {
                let now = Timer::get_tick_counter();
                if now >= deadline {
                    state.discard_waiter(*waiter);
                    return ControlFlow::Break(Err(KernelError::Timeout));
                }
                Some(deadline - now)
            }
        };

        if *waiter == NIL {
            *waiter = state.waiters.insert(me);
            state.queue.append(&mut state.waiters, *waiter);
        } else if state.waiters.link(*waiter).is_detached() {
            // A post detached us but the unit was taken by someone else.
            // Re-enter at the head: we were the longest waiter.
            state.queue.prepend(&mut state.waiters, *waiter);
        }

        // Mask before releasing the lock byte: on this single core no post
        // can then slip in between the release and the suspension below,
        // so the wake cannot be lost.
        let was_masked = critical::interrupt_mask();
        drop(guard);
        match remaining {
            None => TaskManager::block_current_masked(BlockReason::Semaphore),
            Some(ticks) => TaskManager::delay_current_masked(ticks),
        }
        if !was_masked {
            // The pended switch fires here on hardware.
            critical::interrupt_unmask();
        }
        ControlFlow::Continue(())
    }

    /// Release one unit. A binary semaphore already at 1 is unchanged.
    /// If tasks are waiting, the longest-waiting live one is woken,
    /// without consuming the unit on its behalf. Records whose task was
    /// destroyed while waiting are reclaimed and skipped. Thread-context
    /// callers only; post never blocks.
    pub fn post(&self) {
        let sem = self.sem();
        let to_wake = {
            let _guard = sem.lock.acquire();
            let state = unsafe { &mut *sem.state.get() };
            if !(state.kind == SemaphoreKind::Binary && state.value == 1) {
                state.value += 1;
            }
            loop {
                match state.queue.head() {
                    None => break None,
                    Some(head) => {
                        let task = state.waiters.task_of(head);
                        state.queue.remove(&mut state.waiters, head);
                        if TaskManager::task_is_live(task) {
                            break Some(task);
                        }
                        // Orphaned record of a destroyed task.
                        state.waiters.free(head);
                    }
                }
            }
        };
        if let Some(task) = to_wake {
            TaskManager::wake_task(task);
        }
    }

    /// Current value. White-box accessor, mainly for tests.
    pub fn value(&self) -> u32 {
        let sem = self.sem();
        let _guard = sem.lock.acquire();
        unsafe { &*sem.state.get() }.value
    }

    /// Number of queued waiter records, stale ones included. White-box
    /// accessor, mainly for tests.
    pub fn waiting(&self) -> usize {
        let sem = self.sem();
        let _guard = sem.lock.acquire();
        unsafe { &*sem.state.get() }.queue.len()
    }
}
