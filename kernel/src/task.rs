//! Tasks: the unit of execution, and their lifecycle operations.
//!
//! A [`TaskCb`] is always a `'static` value — either a `static` item (the
//! common no_std case) or a leaked heap allocation handed to the kernel once
//! at creation time. Every cross-task link (ready-queue ring, timed-wait
//! ring, waiter-list membership, held-mutex chain) is a plain `&'static`
//! reference behind a [`CpuLockCell`], guarded by the kernel-wide critical
//! section rather than a per-object lock (see `klock.rs`).
pub mod readyqueue;

use core::sync::atomic::AtomicUsize;

use crate::clock::{Tick, IMMEDIATE, INFINITE};
use crate::error::{Error, Event};
use crate::klock::{Cpu, CpuLockCell};
use crate::mutex::MutexCb;
use crate::system;
use crate::timeout::TimedLink;
use crate::wait::{self, WaitQueue};

/// Task priority. Higher numerical value = higher priority, per the
/// reference kernel's convention.
pub type Priority = u8;

/// The priority the idle task runs at; no user task may be created at or
/// below this priority.
pub const IDLE_PRIORITY: Priority = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Stopped,
    Ready,
    Blocked,
}

/// The tri-state join/detach owner described in the data model: `Joinable`
/// (nobody owns it yet, can be joined), `Detached` (stops hand themselves to
/// the deleter), or `JoinedBy` (another task is already blocked in `join`).
#[derive(Clone, Copy, PartialEq, Eq)]
enum Owner {
    Joinable,
    Detached,
    JoinedBy(&'static TaskCb),
}

pub type EntryFn = fn(usize);

pub struct TaskCb {
    pub name: &'static str,
    entry: EntryFn,
    arg: usize,

    basic_priority: CpuLockCell<Priority>,
    effective_priority: CpuLockCell<Priority>,
    state: CpuLockCell<TaskState>,

    // Ready-queue ring linkage; meaningful only while `state == Ready`.
    pub(crate) ready_prev: CpuLockCell<Option<&'static TaskCb>>,
    pub(crate) ready_next: CpuLockCell<Option<&'static TaskCb>>,
    /// Round-robin time-slice accounting (ticks run since last rotation).
    pub(crate) slice: CpuLockCell<Tick>,

    // Timed-wait ring linkage; meaningful while blocked with a finite delay
    // or asleep.
    pub(crate) timed: CpuLockCell<TimedLink>,
    pub(crate) start: CpuLockCell<Tick>,
    pub(crate) delay: CpuLockCell<Tick>,

    // Waiter-list linkage; meaningful only while `state == Blocked`.
    pub(crate) wait_queue: CpuLockCell<Option<&'static WaitQueue>>,
    pub(crate) wait_prev: CpuLockCell<Option<&'static TaskCb>>,
    pub(crate) wait_next: CpuLockCell<Option<&'static TaskCb>>,
    pub(crate) event: CpuLockCell<Event>,
    /// Scratch storage for a blocking object to stash what this task is
    /// waiting for when a plain priority-ordered wait queue isn't enough to
    /// decide who to wake (e.g. a flag group's wait mask/mode). Unused by
    /// the core scheduler, mutex, and timer.
    pub(crate) wait_mask: CpuLockCell<u32>,
    pub(crate) wait_all: CpuLockCell<bool>,

    // Lifecycle.
    owner: CpuLockCell<Owner>,
    /// Singly linked list of detached, stopped tasks awaiting the deleter.
    pub(crate) deleter_next: CpuLockCell<Option<&'static TaskCb>>,

    // Mutex linkage: the head of the list of mutexes this task currently
    // holds (`mtx.list` chain, see `mutex.rs`), and a back-edge to the mutex
    // this task is blocked on, for priority-inheritance chain walking.
    pub(crate) held_mutexes: CpuLockCell<Option<&'static MutexCb>>,
    pub(crate) blocked_on_mutex: CpuLockCell<Option<&'static MutexCb>>,

    /// Scratch word reserved for the platform port (e.g. a host-thread id in
    /// a simulator). The kernel never interprets this value.
    pub port_scratch: AtomicUsize,
}

// Safety: all interior mutability is behind `CpuLockCell`, which is `Sync`
// only because access requires the kernel-wide lock token.
unsafe impl Sync for TaskCb {}

impl TaskCb {
    /// Construct a task descriptor. Does not enroll it on the ready queue —
    /// see [`start`].
    pub const fn new(name: &'static str, priority: Priority, entry: EntryFn, arg: usize) -> Self {
        Self {
            name,
            entry,
            arg,
            basic_priority: CpuLockCell::new(priority),
            effective_priority: CpuLockCell::new(priority),
            state: CpuLockCell::new(TaskState::Stopped),
            ready_prev: CpuLockCell::new(None),
            ready_next: CpuLockCell::new(None),
            slice: CpuLockCell::new(0),
            timed: CpuLockCell::new(TimedLink::new()),
            start: CpuLockCell::new(0),
            delay: CpuLockCell::new(INFINITE),
            wait_queue: CpuLockCell::new(None),
            wait_prev: CpuLockCell::new(None),
            wait_next: CpuLockCell::new(None),
            event: CpuLockCell::new(Event::Success),
            wait_mask: CpuLockCell::new(0),
            wait_all: CpuLockCell::new(false),
            owner: CpuLockCell::new(Owner::Joinable),
            deleter_next: CpuLockCell::new(None),
            held_mutexes: CpuLockCell::new(None),
            blocked_on_mutex: CpuLockCell::new(None),
            port_scratch: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn state(&self, cpu: Cpu<'_>) -> TaskState {
        self.state.get(cpu)
    }

    #[inline]
    pub fn basic_priority(&self, cpu: Cpu<'_>) -> Priority {
        self.basic_priority.get(cpu)
    }

    #[inline]
    pub fn priority(&self, cpu: Cpu<'_>) -> Priority {
        self.effective_priority.get(cpu)
    }

    #[inline]
    pub(crate) fn set_effective_priority(&self, cpu: Cpu<'_>, priority: Priority) {
        self.effective_priority.set(cpu, priority);
    }

    #[inline]
    pub(crate) fn set_state(&self, cpu: Cpu<'_>, state: TaskState) {
        self.state.set(cpu, state);
    }

    /// Advance the round-robin slice counter and return its new value.
    #[cfg(feature = "robin")]
    pub(crate) fn bump_slice(&self, cpu: Cpu<'_>) -> Tick {
        let v = self.slice.get(cpu).wrapping_add(1);
        self.slice.set(cpu, v);
        v
    }

    pub(crate) fn entry_point(&self) -> (EntryFn, usize) {
        (self.entry, self.arg)
    }
}

/// Enroll `task` on the ready queue and mark it running. Idempotent-unsafe:
/// calling `start` on an already-started task is a programmer error.
pub fn start(task: &'static TaskCb) {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    debug_assert_eq!(
        task.state(cpu),
        TaskState::Stopped,
        "start() on a task that is not stopped"
    );
    readyqueue::insert(cpu, task);
}

/// The currently running task calls this to terminate itself. If detached,
/// hands itself to the deleter; if joined, wakes the joiner.
pub fn stop() {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    let me = system::current(cpu);

    readyqueue::remove(cpu, me);
    me.state.set(cpu, TaskState::Stopped);

    // Release every mutex still held, as if reset (see mutex.rs); a task
    // should not normally stop while holding mutexes, but we honor the
    // contract defensively, same as `reset`.
    crate::mutex::release_all_on_exit(cpu, me);

    match me.owner.get(cpu) {
        Owner::Joinable => {}
        Owner::Detached => {
            // Hand ourselves to the deleter, headed off `IDLE`.
            let idle = system::idle(cpu);
            me.deleter_next.set(cpu, idle.deleter_next.get(cpu));
            idle.deleter_next.set(cpu, Some(me));
        }
        Owner::JoinedBy(joiner) => {
            wait::wakeup(cpu, joiner, Event::Success);
        }
    }

    crate::port::port().ctx_switch_now();
    drop(guard);
}

/// Detach `task`: when it stops, its deleter entry is processed automatically
/// instead of waiting for a join. Calling this after the task has already
/// stopped is a programmer error (debug-asserted).
pub fn detach(task: &'static TaskCb) {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    debug_assert!(matches!(task.owner.get(cpu), Owner::Joinable));
    task.owner.set(cpu, Owner::Detached);
}

/// Block the caller until `task` stops (or is reset/deleted). Only one
/// joiner may be registered at a time.
pub fn join(task: &'static TaskCb) -> Result<(), Error> {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    let me = system::current(cpu);

    if task.state(cpu) == TaskState::Stopped {
        return Ok(());
    }
    debug_assert!(matches!(task.owner.get(cpu), Owner::Joinable));
    task.owner.set(cpu, Owner::JoinedBy(me));
    drop(guard);

    wait::wait_for(me, None, INFINITE).into_result()
}

/// Force-stop another task (`reset`, §4.6): releases mutexes it held (waking
/// or transferring to waiters per the mutex robustness policy), unlinks it
/// from whatever it was blocked on with `E_STOPPED`, and removes it from the
/// ready queue if it was ready.
pub fn reset(task: &'static TaskCb) {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();

    match task.state(cpu) {
        TaskState::Stopped => return,
        TaskState::Ready => readyqueue::remove(cpu, task),
        TaskState::Blocked => {
            crate::timeout::remove_if_present(cpu, task);
            wait::unlink(cpu, task, Event::Stopped);
        }
    }
    task.state.set(cpu, TaskState::Stopped);

    crate::mutex::release_all_on_reset(cpu, task);

    if let Owner::JoinedBy(joiner) = task.owner.get(cpu) {
        wait::wakeup(cpu, joiner, Event::Stopped);
    }
    task.owner.set(cpu, Owner::Joinable);
}

/// Suspend the caller indefinitely (§4.6): equivalent to blocking forever on
/// an internal queue, woken only by [`resume`].
pub fn suspend(task: &'static TaskCb) {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    readyqueue::remove(cpu, task);
    wait::append(cpu, task, system::suspend_queue(cpu));
    task.delay.set(cpu, INFINITE);
    if core::ptr::eq(task, system::current(cpu)) {
        drop(guard);
        crate::port::port().ctx_switch_now();
    }
}

/// Resume a task suspended via [`suspend`].
pub fn resume(task: &'static TaskCb) {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    if task.state(cpu) == TaskState::Blocked {
        wait::wakeup(cpu, task, Event::Success);
    }
}

/// Set a task's basic priority, then recompute its effective priority (it
/// may still be boosted by held mutexes).
pub fn set_priority(task: &'static TaskCb, priority: Priority) {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    task.basic_priority.set(cpu, priority);
    crate::mutex::recompute_priority(cpu, task);
}

/// Block the caller with an immediate timeout check, used by `sleep_for`.
pub fn sleep_for(delay: Tick) -> Result<(), Error> {
    if delay == IMMEDIATE {
        return Err(Error::Timeout);
    }
    let me = {
        let mut guard = crate::klock::lock();
        let cpu = guard.cpu();
        system::current(cpu)
    };
    wait::wait_for(me, None, delay).into_result()
}
