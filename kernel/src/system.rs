//! The kernel singleton: the idle task, the timed-wait ring's sentinel, the
//! tick counter, the currently running task, and the boot/dispatch entry
//! points a port calls into (§3, §4.6, §4.7).
use crate::clock::Tick;
use crate::klock::{Cpu, CpuLockCell};
use crate::task::{self, readyqueue, TaskCb};
use crate::timer::TimerCb;
use crate::wait::WaitQueue;

fn idle_entry(_arg: usize) {
    loop {
        crate::port::port().wfi();
    }
}

static IDLE: TaskCb = TaskCb::new("idle", task::IDLE_PRIORITY, idle_entry, 0);

/// The anchor of the timed-wait ring (§4.2): a timer that never itself
/// fires, used only so the ring always has a tail node to compare against.
static WAIT: TimerCb = TimerCb::sentinel("wait-sentinel");

/// The waiter list backing [`task::suspend`]/[`task::resume`].
static SUSPEND_QUEUE: WaitQueue = WaitQueue::new();

static CURRENT: CpuLockCell<Option<&'static TaskCb>> = CpuLockCell::new(None);
static TICKS: CpuLockCell<Tick> = CpuLockCell::new(0);
static BOOTED: CpuLockCell<bool> = CpuLockCell::new(false);

pub(crate) fn idle(_cpu: Cpu<'_>) -> &'static TaskCb {
    &IDLE
}

pub(crate) fn wait_sentinel(_cpu: Cpu<'_>) -> &'static TimerCb {
    &WAIT
}

pub(crate) fn suspend_queue(_cpu: Cpu<'_>) -> &'static WaitQueue {
    &SUSPEND_QUEUE
}

/// The task currently presumed running. Before [`boot`], this is the idle
/// task (there is nothing else to run yet).
pub(crate) fn current(cpu: Cpu<'_>) -> &'static TaskCb {
    CURRENT.get(cpu).unwrap_or(&IDLE)
}

pub(crate) fn set_current(cpu: Cpu<'_>, task: &'static TaskCb) {
    CURRENT.set(cpu, Some(task));
}

/// Convenience for a port that doesn't already hold the lock (e.g. deciding,
/// from inside [`crate::port::Port::ctx_switch_now`], who is switching away).
pub fn current_task() -> &'static TaskCb {
    crate::klock::with_lock(current)
}

/// Convenience for a port: the task the ready queue says should be running.
pub fn scheduled_task() -> &'static TaskCb {
    crate::klock::with_lock(scheduled)
}

/// Convenience for a port: the current tick count, without already holding
/// the lock (e.g. a tickless port computing a real-time sleep duration from
/// the last deadline it armed).
pub fn now_tick() -> Tick {
    crate::klock::with_lock(now)
}

pub(crate) fn now(cpu: Cpu<'_>) -> Tick {
    TICKS.get(cpu)
}

/// A deadline that remembers its own start tick lazily, on first use — for
/// synchronization objects that retry a non-blocking check in a loop and
/// must not let each retry reset the caller's timeout to the full `delay`
/// again (§4.2's wrap-safe comparator applies just as much to a deadline
/// re-armed across several `wait_for` calls as to a single one).
pub struct Deadline {
    delay: Tick,
    start: core::cell::Cell<Option<Tick>>,
}

impl Deadline {
    pub fn new(delay: Tick) -> Self {
        Self {
            delay,
            start: core::cell::Cell::new(None),
        }
    }

    /// Ticks left before this deadline expires, as of `cpu`'s current tick.
    /// Returns `IMMEDIATE` once expired.
    pub fn remaining(&self, cpu: Cpu<'_>) -> Tick {
        if self.delay == crate::clock::INFINITE {
            return crate::clock::INFINITE;
        }
        let now = now(cpu);
        let start = match self.start.get() {
            Some(start) => start,
            None => {
                self.start.set(Some(now));
                now
            }
        };
        crate::clock::remaining(start, self.delay, now)
    }
}

/// Bring up the kernel: install the idle task as the sole ring member and
/// close the timed-wait ring's sentinel into a self-loop. Must be called
/// once, after [`crate::port::set_port`], before starting any other task.
pub fn boot() {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    if BOOTED.get(cpu) {
        return;
    }
    BOOTED.set(cpu, true);

    IDLE.ready_prev.set(cpu, Some(&IDLE));
    IDLE.ready_next.set(cpu, Some(&IDLE));
    IDLE.set_state(cpu, task::TaskState::Ready);

    WAIT.timed
        .set(cpu, crate::timeout::TimedLink::looped(crate::timeout::TimedRef::Timer(&WAIT)));

    CURRENT.set(cpu, Some(&IDLE));
}

/// Run a single task's entry point. Called by the port immediately after it
/// switches onto that task's stack for the first time.
pub fn dispatch(task: &'static TaskCb) -> ! {
    let (entry, arg) = task.entry_point();
    entry(arg);
    task::stop();
    unreachable!("task::stop() never returns control to its caller");
}

/// The task that should be running right now according to the ready queue.
pub fn scheduled(cpu: Cpu<'_>) -> &'static TaskCb {
    readyqueue::head(cpu)
}

/// A port calls this immediately after making `task` the running context
/// (new stack dispatched via [`dispatch`], or a previously blocked task's
/// stack resumed), so [`current`] stays accurate for the next kernel call.
pub fn on_switched_in(task: &'static TaskCb) {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    set_current(cpu, task);
}

/// The tick handler: a port calls this once per timer interrupt (periodic
/// mode) or once per programmed one-shot deadline (tickless mode). Advances
/// the tick counter, expires due timed-wait entries, performs round-robin
/// rotation if due, and requests a context switch if the scheduled task
/// changed.
pub fn tick() {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    let now = TICKS.get(cpu).wrapping_add(1);
    TICKS.set(cpu, now);

    crate::timeout::tick(cpu, now);

    #[cfg(feature = "robin")]
    {
        let head = readyqueue::head(cpu);
        if !core::ptr::eq(head, &IDLE) {
            let slice = head.bump_slice(cpu);
            if slice >= ROUND_ROBIN_QUANTUM {
                readyqueue::rotate(cpu, head.priority(cpu));
            }
        }
    }

    drain_deleter(cpu);
}

#[cfg(feature = "robin")]
pub const ROUND_ROBIN_QUANTUM: Tick = 4;

/// Process every task the deleter is holding (detached tasks that have
/// stopped, §4.7): give the application a chance to reclaim resources, then
/// forget them. This crate targets statically allocated tasks, so draining
/// the deleter queue here only clears the linkage; an allocator-aware
/// embedding can observe [`crate::task::TaskCb`] state before a task is ever
/// handed to the deleter if it needs to free anything.
fn drain_deleter(cpu: Cpu<'_>) {
    let mut cursor = IDLE.deleter_next.get(cpu);
    IDLE.deleter_next.set(cpu, None);
    while let Some(task) = cursor {
        let next = task.deleter_next.get(cpu);
        task.deleter_next.set(cpu, None);
        cursor = next;
    }
}
