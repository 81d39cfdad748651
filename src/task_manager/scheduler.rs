//! Scheduler core: TCB arena, task queues, and state transitions.
//!
//! Everything in this file is bookkeeping over the kernel singleton; it
//! never touches the port layer. All methods must be called either from
//! handler mode or from thread mode with interrupts masked; the public
//! API in `task_manager` wraps them accordingly.
//!
//! Queue discipline: the active task is in no queue; every other live task
//! is in exactly one of the per-priority ready queues, the delayed queue,
//! the blocked queue, or the exited queue, and that queue always matches
//! its state.

extern crate alloc;

use alloc::vec::Vec;

use crate::config::{N_PRIORITIES, PREEMPTION};
use crate::list::{Link, LinkStore, List, NIL};
use crate::task_manager::task::{BlockInfo, TaskId, TaskState, Tcb};

/// One arena slot. `generation` advances every time the slot is vacated,
/// invalidating outstanding handles to the previous occupant.
pub(crate) struct TaskSlot {
    pub(crate) generation: u16,
    pub(crate) tcb: Option<Tcb>,
}

/// Which kernel queue a TCB sits in.
#[derive(Copy, Clone)]
pub(crate) enum QueueId {
    Ready(usize),
    Delayed,
    Blocked,
    Exited,
}

/// Preemptive task manager: the kernel's process-wide scheduling state.
pub struct PreemptiveTaskManager {
    /// TCB arena. Slots are reused; indices are queue link values.
    pub(crate) slots: Vec<TaskSlot>,
    /// One ready queue per priority level, FIFO within a level.
    ready: [List; N_PRIORITIES],
    delayed: List,
    blocked: List,
    exited: List,
    /// Index of the active task, `NIL` before the first switch.
    pub(crate) active: u16,
    /// Index of the idle task, `NIL` before `start`.
    pub(crate) idle: u16,
    pub(crate) started: bool,
}

impl LinkStore for PreemptiveTaskManager {
    fn link(&self, index: u16) -> Link {
        self.tcb(index).link
    }

    fn set_link(&mut self, index: u16, link: Link) {
        self.tcb_mut(index).link = link;
    }
}

impl PreemptiveTaskManager {
    pub(crate) const fn new() -> PreemptiveTaskManager {
        PreemptiveTaskManager {
            slots: Vec::new(),
            ready: [List::new(); N_PRIORITIES],
            delayed: List::new(),
            blocked: List::new(),
            exited: List::new(),
            active: NIL,
            idle: NIL,
            started: false,
        }
    }

    pub(crate) fn tcb(&self, index: u16) -> &Tcb {
        match self.slots[index as usize].tcb.as_ref() {
            Some(tcb) => tcb,
            None => panic!("Error: tcb: slot {} is vacant.", index),
        }
    }

    pub(crate) fn tcb_mut(&mut self, index: u16) -> &mut Tcb {
        match self.slots[index as usize].tcb.as_mut() {
            Some(tcb) => tcb,
            None => panic!("Error: tcb_mut: slot {} is vacant.", index),
        }
    }

    /// Resolve a public handle, rejecting stale generations.
    pub(crate) fn resolve(&self, id: TaskId) -> Option<u16> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation == id.generation && slot.tcb.is_some() {
            Some(id.index)
        } else {
            None
        }
    }

    pub(crate) fn id_of(&self, index: u16) -> TaskId {
        TaskId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn queue(&self, id: QueueId) -> List {
        match id {
            QueueId::Ready(p) => self.ready[p],
            QueueId::Delayed => self.delayed,
            QueueId::Blocked => self.blocked,
            QueueId::Exited => self.exited,
        }
    }

    fn set_queue(&mut self, id: QueueId, list: List) {
        match id {
            QueueId::Ready(p) => self.ready[p] = list,
            QueueId::Delayed => self.delayed = list,
            QueueId::Blocked => self.blocked = list,
            QueueId::Exited => self.exited = list,
        }
    }

    pub(crate) fn append_to(&mut self, id: QueueId, index: u16) {
        let mut list = self.queue(id);
        list.append(self, index);
        self.set_queue(id, list);
    }

    pub(crate) fn remove_from(&mut self, id: QueueId, index: u16) {
        let mut list = self.queue(id);
        list.remove(self, index);
        self.set_queue(id, list);
    }

    /// The queue a task in `state` belongs to. `Active` has no queue.
    pub(crate) fn queue_for(&self, index: u16) -> QueueId {
        let tcb = self.tcb(index);
        match tcb.state {
            TaskState::Ready => QueueId::Ready(tcb.priority),
            TaskState::Delayed => QueueId::Delayed,
            TaskState::Blocked => QueueId::Blocked,
            TaskState::Exited => QueueId::Exited,
            TaskState::Active => {
                panic!("Error: queue_for: the active task is not in any queue.")
            }
        }
    }

    /// Pick the next task to run and publish it as active.
    ///
    /// Scans the ready queues from the highest priority down; priority 0
    /// (idle) is scanned last and is always populated once the kernel has
    /// started, so this cannot fail. The outgoing task, which is in no
    /// queue, is then filed according to the state recorded for it by the
    /// operation that triggered the switch. A yielded or preempted task
    /// re-enters at the tail of its own queue, giving FIFO rotation among
    /// equals. The first call after start has no outgoing task.
    pub(crate) fn select_next_active(&mut self) {
        let mut incoming = NIL;
        for priority in (0..N_PRIORITIES).rev() {
            if let Some(head) = self.ready[priority].head() {
                incoming = head;
                self.remove_from(QueueId::Ready(priority), head);
                break;
            }
        }
        if incoming == NIL {
            panic!("Error: select_next_active: no runnable task.");
        }

        if self.active != NIL {
            let outgoing = self.active;
            let queue = self.queue_for(outgoing);
            self.append_to(queue, outgoing);
        }

        let tcb = self.tcb_mut(incoming);
        tcb.state = TaskState::Active;
        tcb.block_info = BlockInfo::None;
        self.active = incoming;
    }

    /// Record the suspension state of the active task. The task stays out
    /// of the queues until the switch handler files it.
    pub(crate) fn suspend_active(&mut self, state: TaskState, info: BlockInfo) {
        if self.active == NIL {
            panic!("Error: suspend_active: no active task.");
        }
        let tcb = self.tcb_mut(self.active);
        tcb.state = state;
        tcb.block_info = info;
    }

    /// One tick: age every delayed task, move expired ones to ready (FIFO
    /// into their priority queue), and decide whether the active task must
    /// be displaced. Returns whether a switch should be pended.
    pub(crate) fn tick_delayed(&mut self) -> bool {
        let count = self.delayed.len();
        let mut cursor = self.delayed.head().unwrap_or(NIL);
        for _ in 0..count {
            let index = cursor;
            cursor = List::next_of(self, index);
            let remaining = match self.tcb(index).block_info {
                BlockInfo::Ticks(ticks) => ticks - 1,
                _ => panic!("Error: tick_delayed: delayed task without a tick count."),
            };
            if remaining <= 0 {
                self.remove_from(QueueId::Delayed, index);
                let tcb = self.tcb_mut(index);
                tcb.state = TaskState::Ready;
                tcb.block_info = BlockInfo::None;
                let priority = tcb.priority;
                self.append_to(QueueId::Ready(priority), index);
            } else {
                self.tcb_mut(index).block_info = BlockInfo::Ticks(remaining);
            }
        }

        if !PREEMPTION || !self.started {
            return false;
        }
        self.preempt_check()
    }

    /// Whether a strictly higher-priority task than the active one is
    /// ready. If so, the active task is demoted to ready so the switch
    /// handler files it for round-robin rotation.
    pub(crate) fn preempt_check(&mut self) -> bool {
        if self.active == NIL {
            return false;
        }
        let active_priority = self.tcb(self.active).priority;
        let higher = ((active_priority + 1)..N_PRIORITIES).any(|p| !self.ready[p].is_empty());
        if higher && self.tcb(self.active).state == TaskState::Active {
            self.tcb_mut(self.active).state = TaskState::Ready;
        }
        higher
    }

    /// Make a blocked or delayed task runnable again (semaphore post and
    /// cancel-delay paths). Returns whether a switch should be pended
    /// because the woken task outranks the active one.
    pub(crate) fn wake(&mut self, index: u16) -> bool {
        match self.tcb(index).state {
            TaskState::Blocked => self.remove_from(QueueId::Blocked, index),
            TaskState::Delayed => self.remove_from(QueueId::Delayed, index),
            // Already runnable, active, or exited: the wake has nothing to
            // cancel.
            _ => return false,
        }
        let tcb = self.tcb_mut(index);
        tcb.state = TaskState::Ready;
        tcb.block_info = BlockInfo::None;
        let priority = tcb.priority;
        self.append_to(QueueId::Ready(priority), index);

        if PREEMPTION && self.active != NIL {
            let active = self.tcb(self.active);
            if active.state == TaskState::Active && priority > active.priority {
                self.tcb_mut(self.active).state = TaskState::Ready;
                return true;
            }
        }
        false
    }

    /// Store the outgoing task's saved stack pointer and run the overflow
    /// check. Returns `false` when the task was killed for overflowing.
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    pub(crate) fn record_active_stack_pointer(&mut self, psp: *mut u32) -> bool {
        if self.active == NIL {
            return true;
        }
        let tcb = self.tcb_mut(self.active);
        tcb.stack_pointer = psp;
        if crate::config::STACK_GUARD_BYTES == 0 {
            return true;
        }
        if tcb.stack_pointer_in_bounds() && tcb.stack_guard_intact() {
            return true;
        }
        tcb.state = TaskState::Exited;
        tcb.block_info = BlockInfo::None;
        false
    }

    #[cfg(all(target_arch = "arm", target_os = "none"))]
    pub(crate) fn active_stack_pointer(&self) -> *mut u32 {
        self.tcb(self.active).stack_pointer
    }

    /// Detach the head of the exited queue, if any. The caller frees the
    /// resources; this only touches the queue.
    pub(crate) fn take_exited(&mut self) -> Option<u16> {
        let head = self.exited.head()?;
        self.remove_from(QueueId::Exited, head);
        Some(head)
    }

    /// Find a vacant slot or grow the arena. Thread-mode only (may
    /// allocate).
    pub(crate) fn allocate_slot(&mut self) -> Option<u16> {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.tcb.is_none() {
                return Some(index as u16);
            }
        }
        let index = self.slots.len();
        if index >= NIL as usize {
            return None;
        }
        self.slots.push(TaskSlot {
            generation: 0,
            tcb: None,
        });
        Some(index as u16)
    }

    /// Vacate a slot, invalidating outstanding handles to it.
    pub(crate) fn release_slot(&mut self, index: u16) {
        let slot = &mut self.slots[index as usize];
        slot.tcb = None;
        slot.generation = slot.generation.wrapping_add(1);
    }

    pub(crate) fn ready_len(&self, priority: usize) -> usize {
        self.ready[priority].len()
    }

    pub(crate) fn delayed_len(&self) -> usize {
        self.delayed.len()
    }

    pub(crate) fn blocked_len(&self) -> usize {
        self.blocked.len()
    }

    pub(crate) fn exited_len(&self) -> usize {
        self.exited.len()
    }

    pub(crate) fn live_tasks(&self) -> usize {
        self.slots.iter().filter(|s| s.tcb.is_some()).count()
    }

    /// Empty every queue. Only valid once the slots backing them are gone
    /// (reset path).
    pub(crate) fn clear_queues(&mut self) {
        self.ready = [List::new(); N_PRIORITIES];
        self.delayed = List::new();
        self.blocked = List::new();
        self.exited = List::new();
    }
}
