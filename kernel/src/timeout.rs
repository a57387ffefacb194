//! The timed-wait queue: a single ring, ordered by remaining ticks, shared
//! polymorphically between sleeping/timed-blocked tasks and armed timers
//! (§3, §4.2, §4.5).
//!
//! The reference kernel gets this polymorphism for free because both task
//! and timer control blocks start with the same `{prev, next, id}` header
//! and a tagged union discriminates them at runtine. Rust has no safe
//! equivalent of that header-punning trick, so [`TimedRef`] plays the same
//! role as an explicit two-variant enum instead (see `DESIGN.md`).
use crate::clock::{has_expired, remaining, Tick, INFINITE};
use crate::klock::{Cpu, CpuLockCell};
use crate::system;
use crate::task::TaskCb;
use crate::timer::TimerCb;

/// Doubly linked ring membership for a timed-wait node.
pub struct TimedLink {
    prev: Option<TimedRef>,
    next: Option<TimedRef>,
}

impl TimedLink {
    pub const fn new() -> Self {
        Self {
            prev: None,
            next: None,
        }
    }

    /// A ring containing only `node`, pointing at itself in both directions.
    /// Used once, at boot, to seed the sentinel.
    pub(crate) fn looped(node: TimedRef) -> Self {
        Self {
            prev: Some(node),
            next: Some(node),
        }
    }
}

/// A node on the timed-wait ring: either a task blocked with a finite delay,
/// or an armed timer.
#[derive(Clone, Copy)]
pub enum TimedRef {
    Task(&'static TaskCb),
    Timer(&'static TimerCb),
}

impl TimedRef {
    fn eq(self, other: TimedRef) -> bool {
        match (self, other) {
            (TimedRef::Task(a), TimedRef::Task(b)) => core::ptr::eq(a, b),
            (TimedRef::Timer(a), TimedRef::Timer(b)) => core::ptr::eq(a, b),
            _ => false,
        }
    }

    fn link_cell(self) -> &'static CpuLockCell<TimedLink> {
        match self {
            TimedRef::Task(t) => &t.timed,
            TimedRef::Timer(t) => &t.timed,
        }
    }

    fn start_cell(self) -> &'static CpuLockCell<Tick> {
        match self {
            TimedRef::Task(t) => &t.start,
            TimedRef::Timer(t) => &t.start,
        }
    }

    fn delay_cell(self) -> &'static CpuLockCell<Tick> {
        match self {
            TimedRef::Task(t) => &t.delay,
            TimedRef::Timer(t) => &t.delay,
        }
    }

    fn remaining(self, cpu: Cpu<'_>, now: Tick) -> Tick {
        remaining(self.start_cell().get(cpu), self.delay_cell().get(cpu), now)
    }

    fn is_linked(self, cpu: Cpu<'_>) -> bool {
        self.link_cell().get(cpu).prev.is_some()
    }
}

/// Register `node` on the timed-wait ring to expire after `delay` ticks from
/// `now`. No-op if `delay == INFINITE` — an infinite wait is never on this
/// ring at all (§3 invariant).
pub fn insert(cpu: Cpu<'_>, node: TimedRef, now: Tick, delay: Tick) {
    node.start_cell().set(cpu, now);
    node.delay_cell().set(cpu, delay);
    if delay == INFINITE {
        return;
    }

    let sentinel = TimedRef::Timer(system::wait_sentinel(cpu));
    let target = node.remaining(cpu, now);

    let mut cursor = sentinel.link_cell().get(cpu).next.unwrap_or(sentinel);
    while !cursor.eq(sentinel) && cursor.remaining(cpu, now) <= target {
        cursor = cursor.link_cell().get(cpu).next.unwrap_or(sentinel);
    }
    link_before(cpu, cursor, node);
    reprogram(cpu, now);
}

/// Unlink `node` from the timed-wait ring, if it is currently on it.
pub fn remove_if_present(cpu: Cpu<'_>, node_task: &'static TaskCb) {
    let node = TimedRef::Task(node_task);
    if node.is_linked(cpu) {
        unlink(cpu, node);
    }
}

pub(crate) fn remove(cpu: Cpu<'_>, node: TimedRef) {
    if node.is_linked(cpu) {
        unlink(cpu, node);
    }
}

/// Drain every expired entry and dispatch it (task timeout or timer fire),
/// then reprogram the hardware timer for the next deadline. Called from the
/// tick ISR and, in tickless mode, whenever the one-shot timer fires.
pub fn tick(cpu: Cpu<'_>, now: Tick) {
    let sentinel = TimedRef::Timer(system::wait_sentinel(cpu));
    loop {
        let head = sentinel.link_cell().get(cpu).next.unwrap_or(sentinel);
        if head.eq(sentinel) {
            break;
        }
        if !has_expired(head.start_cell().get(cpu), head.delay_cell().get(cpu), now) {
            break;
        }
        unlink(cpu, head);
        match head {
            TimedRef::Task(t) => crate::wait::expire(cpu, t),
            TimedRef::Timer(t) => crate::timer::fire(cpu, t, now),
        }
    }
    reprogram(cpu, now);
}

#[cfg(feature = "tickless")]
fn reprogram(cpu: Cpu<'_>, now: Tick) {
    let sentinel = TimedRef::Timer(system::wait_sentinel(cpu));
    let head = sentinel.link_cell().get(cpu).next.unwrap_or(sentinel);
    if head.eq(sentinel) {
        crate::port::port().tmr_stop();
    } else {
        let deadline = now.wrapping_add(head.remaining(cpu, now));
        crate::port::port().tmr_start(deadline);
    }
}

#[cfg(not(feature = "tickless"))]
fn reprogram(_cpu: Cpu<'_>, _now: Tick) {}

fn link_before(cpu: Cpu<'_>, at: TimedRef, node: TimedRef) {
    let prev = at.link_cell().get(cpu).prev;
    node.link_cell().with(cpu, |l| {
        l.prev = prev;
        l.next = Some(at);
    });
    if let Some(prev) = prev {
        prev.link_cell().with(cpu, |l| l.next = Some(node));
    }
    at.link_cell().with(cpu, |l| l.prev = Some(node));
}

fn unlink(cpu: Cpu<'_>, node: TimedRef) {
    let link = node.link_cell().get_ref(cpu);
    let (prev, next) = (link.prev, link.next);
    if let Some(prev) = prev {
        prev.link_cell().with(cpu, |l| l.next = next);
    }
    if let Some(next) = next {
        next.link_cell().with(cpu, |l| l.prev = prev);
    }
    node.link_cell().with(cpu, |l| {
        l.prev = None;
        l.next = None;
    });
}

/// Task names of every task currently on the ring, in expiry order. Test-only
/// window into otherwise-private ring linkage.
#[cfg(test)]
pub(crate) fn task_ring_order(cpu: Cpu<'_>) -> std::vec::Vec<&'static str> {
    let sentinel = TimedRef::Timer(system::wait_sentinel(cpu));
    let mut names = std::vec::Vec::new();
    let mut cursor = sentinel.link_cell().get(cpu).next.unwrap_or(sentinel);
    while !cursor.eq(sentinel) {
        if let TimedRef::Task(t) = cursor {
            names.push(t.name);
        }
        cursor = cursor.link_cell().get(cpu).next.unwrap_or(sentinel);
    }
    names
}
