//! The generic wait/wake protocol (§4.3): a priority-ordered waiter list any
//! blocking object (mutex, semaphore, condvar, ...) can embed, plus the
//! handful of operations — block, wake one, wake all, expire, force-unlink —
//! that are identical no matter which object type owns the list. Per-object
//! code only ever decides *who* to wake and *when*; this module is agnostic
//! to why a task is waiting.
use crate::clock::Tick;
use crate::klock::{Cpu, CpuLockCell};
use crate::system;
use crate::task::{readyqueue, TaskCb, TaskState};
use crate::timeout::{self, TimedRef};
use crate::error::Event;

/// A priority-ordered list of blocked tasks. Embedded in every blocking
/// object; the object itself decides when to call [`wakeup_one`],
/// [`wakeup_all`], or [`wakeup`].
pub struct WaitQueue {
    head: CpuLockCell<Option<&'static TaskCb>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            head: CpuLockCell::new(None),
        }
    }

    /// The highest-priority waiter, without removing it.
    pub fn peek(&self, cpu: Cpu<'_>) -> Option<&'static TaskCb> {
        self.head.get(cpu)
    }

    pub fn is_empty(&self, cpu: Cpu<'_>) -> bool {
        self.head.get(cpu).is_none()
    }
}

unsafe impl Sync for WaitQueue {}

/// Block the caller on `queue` (or on no list at all, for a pure sleep/join)
/// until woken, for at most `delay` ticks. Returns the reason it woke.
///
/// Must be called with no kernel lock held; this is the boundary where the
/// calling task's stack is actually suspended.
pub fn wait_for(task: &'static TaskCb, queue: Option<&'static WaitQueue>, delay: Tick) -> Event {
    {
        let mut guard = crate::klock::lock();
        let cpu = guard.cpu();
        readyqueue::remove(cpu, task);
        match queue {
            Some(queue) => append(cpu, task, queue),
            None => {
                task.state.set(cpu, TaskState::Blocked);
                task.wait_queue.set(cpu, None);
            }
        }
        let now = system::now(cpu);
        timeout::insert(cpu, TimedRef::Task(task), now, delay);
        crate::port::port().ctx_switch_now();
    }
    // Execution resumes here only once this task has been rescheduled; the
    // waker (wakeup/expire/unlink) has already recorded why.
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    task.event.get(cpu)
}

/// Insert `task` into `queue` in priority order (ties broken FIFO), and mark
/// it blocked on `queue`.
pub(crate) fn append(cpu: Cpu<'_>, task: &'static TaskCb, queue: &'static WaitQueue) {
    task.state.set(cpu, TaskState::Blocked);
    task.wait_queue.set(cpu, Some(queue));
    let my_priority = task.priority(cpu);

    let mut prev: Option<&'static TaskCb> = None;
    let mut cursor = queue.head.get(cpu);
    while let Some(candidate) = cursor {
        if candidate.priority(cpu) < my_priority {
            break;
        }
        prev = Some(candidate);
        cursor = candidate.wait_next.get(cpu);
    }

    task.wait_prev.set(cpu, prev);
    task.wait_next.set(cpu, cursor);
    if let Some(next) = cursor {
        next.wait_prev.set(cpu, Some(task));
    }
    match prev {
        Some(prev) => prev.wait_next.set(cpu, Some(task)),
        None => queue.head.set(cpu, Some(task)),
    }
}

/// Detach `task` from whichever `WaitQueue` it is on, if any. Does not touch
/// the timed-wait ring, the ready queue, or `task.event` — callers compose
/// those separately.
fn detach(cpu: Cpu<'_>, task: &'static TaskCb) {
    let queue = match task.wait_queue.get(cpu) {
        Some(q) => q,
        None => return,
    };
    let prev = task.wait_prev.get(cpu);
    let next = task.wait_next.get(cpu);
    match prev {
        Some(prev) => prev.wait_next.set(cpu, next),
        None => queue.head.set(cpu, next),
    }
    if let Some(next) = next {
        next.wait_prev.set(cpu, prev);
    }
    task.wait_prev.set(cpu, None);
    task.wait_next.set(cpu, None);
    task.wait_queue.set(cpu, None);
}

/// Force `task` off whatever waiter list it's on and record `event`, without
/// rescheduling it. Used when the caller is about to leave the task in a
/// non-ready state itself (e.g. `task::reset`, which moves it straight to
/// `Stopped`).
pub fn unlink(cpu: Cpu<'_>, task: &'static TaskCb, event: Event) {
    detach(cpu, task);
    task.event.set(cpu, event);
}

/// Wake `task`: detach it from its waiter list and the timed-wait ring,
/// record `event`, and put it back on the ready queue.
pub fn wakeup(cpu: Cpu<'_>, task: &'static TaskCb, event: Event) {
    if task.state(cpu) != TaskState::Blocked {
        return;
    }
    timeout::remove_if_present(cpu, task);
    detach(cpu, task);
    task.event.set(cpu, event);
    readyqueue::insert(cpu, task);
}

/// Called from the timed-wait ring's expiry sweep: `task`'s deadline passed
/// while it was blocked. Already removed from the timed-wait ring by the
/// caller.
pub(crate) fn expire(cpu: Cpu<'_>, task: &'static TaskCb) {
    detach(cpu, task);
    task.event.set(cpu, Event::Timeout);
    readyqueue::insert(cpu, task);
}

/// Remove `task` from `queue` and reinsert it at its (possibly changed)
/// priority position. Used by the mutex priority-inheritance recomputation
/// when a blocked task's effective priority changes.
pub(crate) fn reposition(cpu: Cpu<'_>, task: &'static TaskCb, queue: &'static WaitQueue) {
    detach(cpu, task);
    append(cpu, task, queue);
}

/// Wake the single highest-priority waiter on `queue`, if any.
pub fn wakeup_one(cpu: Cpu<'_>, queue: &'static WaitQueue, event: Event) -> Option<&'static TaskCb> {
    let task = queue.head.get(cpu)?;
    wakeup(cpu, task, event);
    Some(task)
}

/// Wake every waiter on `queue` (broadcast).
pub fn wakeup_all(cpu: Cpu<'_>, queue: &'static WaitQueue, event: Event) {
    while queue.head.get(cpu).is_some() {
        wakeup_one(cpu, queue, event);
    }
}
