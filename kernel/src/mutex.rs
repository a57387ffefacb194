//! The mutex: priority-inheritance, priority-ceiling, recursive, and robust
//! axes, composed through a single acquire/release state machine (§4.4).
//!
//! Ownership is tracked per task as a singly linked chain (`held_mutexes` /
//! `list_next`, mirroring the reference kernel's `mtx.list`), so a task's
//! effective priority can be recomputed by folding over every mutex it
//! currently holds: the ceiling of a priority-protect mutex contributes
//! unconditionally, and the priority of an inheritance mutex's highest
//! waiter contributes only while someone is actually waiting on it. Walking
//! `blocked_on_mutex` from there propagates a boost transitively along a
//! chain of blocked owners, exactly as priority inheritance requires.
use crate::clock::{Tick, IMMEDIATE};
use crate::error::{Error, Event};
use crate::klock::{Cpu, CpuLockCell};
use crate::system;
use crate::task::{Priority, TaskCb, TaskState};
use crate::wait::{self, WaitQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// No priority adjustment; plain mutual exclusion.
    None,
    /// Classic priority inheritance: the owner is boosted to the priority of
    /// the highest-priority waiter for as long as someone waits.
    Inherit,
    /// Priority ceiling: the owner is boosted to a fixed ceiling for as long
    /// as it holds the mutex, and locking above the ceiling is a protocol
    /// violation.
    Protect(Priority),
}

/// What a successful lock returned: either the mutex was free, or it was
/// handed to the caller because the previous owner died while holding it
/// (a robust mutex only). A `Recovered` lock must be repaired with
/// [`mark_consistent`] before unlocking, or the mutex becomes permanently
/// unusable (`NotRecoverable`, mirroring POSIX `EOWNERDEAD`/`ENOTRECOVERABLE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    Recovered,
}

pub struct MutexCb {
    pub name: &'static str,
    protocol: Protocol,
    robust: bool,
    recursive: bool,

    owner: CpuLockCell<Option<&'static TaskCb>>,
    lock_count: CpuLockCell<u32>,
    /// Robust mutexes only: `false` after a forced handoff until the new
    /// owner calls [`mark_consistent`].
    consistent: CpuLockCell<bool>,
    /// Robust mutexes only: permanently unusable once unlocked while still
    /// inconsistent.
    abandoned: CpuLockCell<bool>,

    waiters: WaitQueue,
    pub(crate) list_next: CpuLockCell<Option<&'static MutexCb>>,
}

unsafe impl Sync for MutexCb {}

impl MutexCb {
    pub const fn new(name: &'static str, protocol: Protocol, robust: bool, recursive: bool) -> Self {
        Self {
            name,
            protocol,
            robust,
            recursive,
            owner: CpuLockCell::new(None),
            lock_count: CpuLockCell::new(0),
            consistent: CpuLockCell::new(true),
            abandoned: CpuLockCell::new(false),
            waiters: WaitQueue::new(),
            list_next: CpuLockCell::new(None),
        }
    }

    pub fn owner(&self, cpu: Cpu<'_>) -> Option<&'static TaskCb> {
        self.owner.get(cpu)
    }
}

/// Lock `mtx`, blocking for at most `delay` ticks if it is already held.
pub fn lock(mtx: &'static MutexCb, delay: Tick) -> Result<LockOutcome, Error> {
    let me;
    {
        let mut guard = crate::klock::lock();
        let cpu = guard.cpu();
        me = system::current(cpu);

        if let Protocol::Protect(ceiling) = mtx.protocol {
            if me.priority(cpu) > ceiling {
                return Err(Error::Failure);
            }
        }

        match mtx.owner.get(cpu) {
            None => {
                acquire(cpu, mtx, me);
                return Ok(outcome(cpu, mtx));
            }
            Some(owner) if core::ptr::eq(owner, me) => {
                if mtx.recursive {
                    mtx.lock_count.set(cpu, mtx.lock_count.get(cpu) + 1);
                    return Ok(outcome(cpu, mtx));
                }
                return Err(Error::Failure);
            }
            Some(_) => {
                if mtx.abandoned.get(cpu) {
                    return Err(Error::Failure);
                }
                if delay == IMMEDIATE {
                    return Err(Error::Timeout);
                }
                me.blocked_on_mutex.set(cpu, Some(mtx));
                crate::task::readyqueue::remove(cpu, me);
                wait::append(cpu, me, &mtx.waiters);
                if mtx.protocol == Protocol::Inherit {
                    propagate(cpu, mtx);
                }
                let now = system::now(cpu);
                crate::timeout::insert(cpu, crate::timeout::TimedRef::Task(me), now, delay);
                crate::port::port().ctx_switch_now();
            }
        }
    }

    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    me.blocked_on_mutex.set(cpu, None);
    match me.event.get(cpu) {
        Event::Success => Ok(LockOutcome::Acquired),
        Event::OwnerDead => Ok(LockOutcome::Recovered),
        Event::Timeout => Err(Error::Timeout),
        Event::Stopped => Err(Error::Stopped),
        Event::Deleted => Err(Error::Deleted),
    }
}

pub fn try_lock(mtx: &'static MutexCb) -> Result<LockOutcome, Error> {
    lock(mtx, IMMEDIATE)
}

/// Release `mtx`. Fails with [`Error::Failure`] if the caller is not the
/// current owner.
pub fn unlock(mtx: &'static MutexCb) -> Result<(), Error> {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    let me = system::current(cpu);

    match mtx.owner.get(cpu) {
        Some(owner) if core::ptr::eq(owner, me) => {}
        _ => return Err(Error::Failure),
    }

    if mtx.robust && !mtx.consistent.get(cpu) {
        // Owner unlocked without recovering: the mutex can never be trusted
        // again (POSIX's ENOTRECOVERABLE).
        mtx.abandoned.set(cpu, true);
        mtx.owner.set(cpu, None);
        mtx.lock_count.set(cpu, 0);
        unlink_from_task(cpu, me, mtx);
        wait::wakeup_all(cpu, &mtx.waiters, Event::Stopped);
        recompute_priority(cpu, me);
        return Ok(());
    }

    if mtx.recursive {
        let count = mtx.lock_count.get(cpu);
        if count > 1 {
            mtx.lock_count.set(cpu, count - 1);
            return Ok(());
        }
    }

    unlink_from_task(cpu, me, mtx);
    transfer_or_clear(cpu, mtx, Event::Success);
    recompute_priority(cpu, me);
    Ok(())
}

/// Clear a robust mutex's inconsistent flag. Must be called by the current
/// owner after a [`LockOutcome::Recovered`] lock, before unlocking.
pub fn mark_consistent(mtx: &'static MutexCb) -> Result<(), Error> {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    let me = system::current(cpu);
    match mtx.owner.get(cpu) {
        Some(owner) if core::ptr::eq(owner, me) => {}
        _ => return Err(Error::Failure),
    }
    if !mtx.robust {
        return Err(Error::Failure);
    }
    mtx.consistent.set(cpu, true);
    Ok(())
}

fn outcome(cpu: Cpu<'_>, mtx: &'static MutexCb) -> LockOutcome {
    if mtx.robust && !mtx.consistent.get(cpu) {
        LockOutcome::Recovered
    } else {
        LockOutcome::Acquired
    }
}

fn acquire(cpu: Cpu<'_>, mtx: &'static MutexCb, task: &'static TaskCb) {
    mtx.owner.set(cpu, Some(task));
    mtx.lock_count.set(cpu, 1);
    mtx.list_next.set(cpu, task.held_mutexes.get(cpu));
    task.held_mutexes.set(cpu, Some(mtx));
    recompute_priority(cpu, task);
}

/// Hand `mtx` to its highest-priority waiter (if any), or mark it free.
fn transfer_or_clear(cpu: Cpu<'_>, mtx: &'static MutexCb, event: Event) {
    match mtx.waiters.peek(cpu) {
        Some(next) => {
            mtx.owner.set(cpu, Some(next));
            mtx.lock_count.set(cpu, 1);
            mtx.list_next.set(cpu, next.held_mutexes.get(cpu));
            next.held_mutexes.set(cpu, Some(mtx));
            wait::wakeup(cpu, next, event);
        }
        None => {
            mtx.owner.set(cpu, None);
            mtx.lock_count.set(cpu, 0);
        }
    }
}

fn unlink_from_task(cpu: Cpu<'_>, task: &'static TaskCb, mtx: &'static MutexCb) {
    let mut cursor = task.held_mutexes.get(cpu);
    let mut prev: Option<&'static MutexCb> = None;
    while let Some(candidate) = cursor {
        if core::ptr::eq(candidate, mtx) {
            let rest = candidate.list_next.get(cpu);
            match prev {
                Some(prev) => prev.list_next.set(cpu, rest),
                None => task.held_mutexes.set(cpu, rest),
            }
            candidate.list_next.set(cpu, None);
            return;
        }
        prev = Some(candidate);
        cursor = candidate.list_next.get(cpu);
    }
}

/// Recompute `task`'s effective priority from its basic priority and every
/// mutex it currently holds, repositioning it on whatever queue it's on if
/// the priority changed, and propagating the boost to whatever it is in
/// turn blocked on.
pub(crate) fn recompute_priority(cpu: Cpu<'_>, task: &'static TaskCb) {
    let mut effective = task.basic_priority(cpu);
    let mut cursor = task.held_mutexes.get(cpu);
    while let Some(mtx) = cursor {
        match mtx.protocol {
            Protocol::Inherit => {
                if let Some(top) = mtx.waiters.peek(cpu) {
                    effective = effective.max(top.priority(cpu));
                }
            }
            Protocol::Protect(ceiling) => effective = effective.max(ceiling),
            Protocol::None => {}
        }
        cursor = mtx.list_next.get(cpu);
    }

    let changed = effective != task.priority(cpu);
    task.set_effective_priority(cpu, effective);
    if changed {
        reposition(cpu, task);
        if let Some(blocking) = task.blocked_on_mutex.get(cpu) {
            propagate(cpu, blocking);
        }
    }
}

fn propagate(cpu: Cpu<'_>, mtx: &'static MutexCb) {
    if let Some(owner) = mtx.owner.get(cpu) {
        recompute_priority(cpu, owner);
    }
}

fn reposition(cpu: Cpu<'_>, task: &'static TaskCb) {
    match task.state(cpu) {
        TaskState::Ready => {
            crate::task::readyqueue::remove(cpu, task);
            crate::task::readyqueue::insert(cpu, task);
        }
        TaskState::Blocked => {
            if let Some(queue) = task.wait_queue.get(cpu) {
                wait::reposition(cpu, task, queue);
            }
        }
        TaskState::Stopped => {}
    }
}

/// Release every mutex `task` currently holds, as if it just stopped or was
/// reset while holding them (§4.6). Robust mutexes are left inconsistent and
/// handed off with [`Event::OwnerDead`]; ordinary mutexes hand off silently.
pub(crate) fn release_all_on_reset(cpu: Cpu<'_>, task: &'static TaskCb) {
    let mut cursor = task.held_mutexes.get(cpu);
    task.held_mutexes.set(cpu, None);
    while let Some(mtx) = cursor {
        let next = mtx.list_next.get(cpu);
        mtx.list_next.set(cpu, None);
        if mtx.robust {
            mtx.consistent.set(cpu, false);
            transfer_or_clear(cpu, mtx, Event::OwnerDead);
        } else {
            transfer_or_clear(cpu, mtx, Event::Success);
        }
        cursor = next;
    }
}

pub(crate) fn release_all_on_exit(cpu: Cpu<'_>, task: &'static TaskCb) {
    release_all_on_reset(cpu, task);
}
