//! The ready queue: a priority-ordered, FIFO-within-priority ring of ready
//! tasks, anchored permanently at the idle task (§4.1).
//!
//! The reference kernel expresses this as a trait (`readyqueue::Queue`) so a
//! port can swap in a bitmap-indexed variant on memory-constrained targets.
//! This crate keeps a single concrete implementation — a sorted doubly
//! linked list through `TaskCb::ready_prev`/`ready_next` — since the `'static`
//! object model here has no const-generic `Traits` parameter to hang an
//! alternate implementation off of (see `DESIGN.md`).
use crate::klock::Cpu;
use crate::system;
use crate::task::{TaskCb, TaskState};

/// Insert `task` into the ring in priority order, after any existing task of
/// equal or higher priority (so equal-priority tasks queue FIFO), and mark
/// it ready. Requests a context switch if this changed who should run.
pub fn insert(cpu: Cpu<'_>, task: &'static TaskCb) {
    task.state.set(cpu, TaskState::Ready);
    task.slice.set(cpu, 0);

    let idle = system::idle(cpu);
    let my_priority = task.priority(cpu);

    let mut cursor = idle.ready_next.get(cpu).unwrap_or(idle);
    while !core::ptr::eq(cursor, idle) && cursor.priority(cpu) >= my_priority {
        cursor = cursor.ready_next.get(cpu).unwrap_or(idle);
    }
    link_before(cpu, cursor, task);

    crate::port::port().ctx_switch();
}

/// Remove `task` from the ring, if it is currently on it. No-op for a task
/// that is not `Ready` (e.g. already removed, or never inserted).
pub fn remove(cpu: Cpu<'_>, task: &'static TaskCb) {
    if task.state(cpu) != TaskState::Ready {
        return;
    }
    unlink(cpu, task);
    crate::port::port().ctx_switch();
}

/// The task that should be running right now: the highest-priority ready
/// task, or the idle task if none is ready.
pub fn head(cpu: Cpu<'_>) -> &'static TaskCb {
    let idle = system::idle(cpu);
    idle.ready_next.get(cpu).unwrap_or(idle)
}

/// Round-robin rotation (§4.1, `robin` feature): if the current head of the
/// ring shares `priority` with the task immediately behind it, move the head
/// to the back of its priority band.
#[cfg(feature = "robin")]
pub fn rotate(cpu: Cpu<'_>, priority: crate::task::Priority) {
    let idle = system::idle(cpu);
    let head = head(cpu);
    if core::ptr::eq(head, idle) || head.priority(cpu) != priority {
        return;
    }
    let next = head.ready_next.get(cpu).unwrap_or(idle);
    if core::ptr::eq(next, idle) || next.priority(cpu) != priority {
        return; // only task at this priority; nothing to rotate
    }
    unlink(cpu, head);
    let mut cursor = next;
    while !core::ptr::eq(cursor, idle) && cursor.priority(cpu) >= priority {
        cursor = cursor.ready_next.get(cpu).unwrap_or(idle);
    }
    link_before(cpu, cursor, head);
    crate::port::port().ctx_switch();
}

fn link_before(cpu: Cpu<'_>, at: &'static TaskCb, task: &'static TaskCb) {
    let prev = at.ready_prev.get(cpu);
    task.ready_prev.set(cpu, prev);
    task.ready_next.set(cpu, Some(at));
    if let Some(prev) = prev {
        prev.ready_next.set(cpu, Some(task));
    }
    at.ready_prev.set(cpu, Some(task));
}

fn unlink(cpu: Cpu<'_>, task: &'static TaskCb) {
    let prev = task.ready_prev.get(cpu);
    let next = task.ready_next.get(cpu);
    if let Some(prev) = prev {
        prev.ready_next.set(cpu, next);
    }
    if let Some(next) = next {
        next.ready_prev.set(cpu, prev);
    }
    task.ready_prev.set(cpu, None);
    task.ready_next.set(cpu, None);
}
