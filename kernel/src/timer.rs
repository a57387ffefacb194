//! Timer objects: one-shot or periodic callbacks dispatched from the tick
//! handler (§4.5). A timer shares the same timed-wait ring as sleeping and
//! timed-blocked tasks (see `timeout.rs`) — it is never itself a task and
//! never blocks anything; firing just invokes a callback.
use crate::clock::Tick;
use crate::klock::{Cpu, CpuLockCell};
use crate::timeout::{self, TimedLink, TimedRef};

pub type TimerFn = fn(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Stopped,
    Armed,
}

pub struct TimerCb {
    pub name: &'static str,
    proc: CpuLockCell<TimerFn>,
    arg: usize,

    pub(crate) timed: CpuLockCell<TimedLink>,
    pub(crate) start: CpuLockCell<Tick>,
    pub(crate) delay: CpuLockCell<Tick>,
    period: CpuLockCell<Tick>,
    state: CpuLockCell<TimerState>,
}

unsafe impl Sync for TimerCb {}

impl TimerCb {
    pub const fn new(name: &'static str, proc: TimerFn, arg: usize) -> Self {
        Self {
            name,
            proc: CpuLockCell::new(proc),
            arg,
            timed: CpuLockCell::new(TimedLink::new()),
            start: CpuLockCell::new(0),
            delay: CpuLockCell::new(crate::clock::INFINITE),
            period: CpuLockCell::new(0),
            state: CpuLockCell::new(TimerState::Stopped),
        }
    }

    /// A timer that never fires on its own: used only as the ring sentinel
    /// (`WAIT`, §4.2).
    pub const fn sentinel(name: &'static str) -> Self {
        Self::new(name, |_| {}, 0)
    }

    pub fn state(&self, cpu: Cpu<'_>) -> TimerState {
        self.state.get(cpu)
    }

    /// Redirect this timer's callback, effective starting with its next
    /// firing. Safe to call from inside the currently-running callback
    /// itself (§4.5's "current-timer" self-modification).
    pub fn set_proc(&self, proc: TimerFn) {
        crate::klock::with_lock(|cpu| self.proc.set(cpu, proc));
    }

    /// Override the delay this timer is re-armed with once its callback
    /// returns. Only meaningful for a periodic timer (`period != 0`); has no
    /// effect on a firing already in flight, only the one queued afterward.
    /// Safe to call from inside the currently-running callback itself.
    pub fn set_delay(&self, delay: Tick) {
        crate::klock::with_lock(|cpu| self.delay.set(cpu, delay));
    }
}

/// Arm `timer` to fire `delay` ticks from now, and every `period` ticks
/// thereafter (`period == 0` means one-shot).
pub fn start(timer: &'static TimerCb, delay: Tick) {
    start_periodic(timer, delay, 0);
}

pub fn start_periodic(timer: &'static TimerCb, delay: Tick, period: Tick) {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    let now = crate::system::now(cpu);

    if timer.state(cpu) == TimerState::Armed {
        timeout::remove(cpu, TimedRef::Timer(timer));
    }
    timer.period.set(cpu, period);
    timer.state.set(cpu, TimerState::Armed);
    timeout::insert(cpu, TimedRef::Timer(timer), now, delay);
}

/// Arm `timer` as a one-shot firing at the absolute tick `deadline`, rather
/// than `delay` ticks from now.
pub fn start_until(timer: &'static TimerCb, deadline: Tick) {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    let now = crate::system::now(cpu);
    let delay = deadline.wrapping_sub(now);

    if timer.state(cpu) == TimerState::Armed {
        timeout::remove(cpu, TimedRef::Timer(timer));
    }
    timer.period.set(cpu, 0);
    timer.state.set(cpu, TimerState::Armed);
    timeout::insert(cpu, TimedRef::Timer(timer), now, delay);
}

/// Disarm `timer`. No-op if already stopped.
pub fn stop(timer: &'static TimerCb) {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    if timer.state(cpu) != TimerState::Armed {
        return;
    }
    timeout::remove(cpu, TimedRef::Timer(timer));
    timer.state.set(cpu, TimerState::Stopped);
}

/// Re-arm `timer` using the delay/period it was last started with, as if
/// just fired (without invoking `proc`).
pub fn start_next(timer: &'static TimerCb) {
    let mut guard = crate::klock::lock();
    let cpu = guard.cpu();
    let now = crate::system::now(cpu);
    let delay = timer.delay.get(cpu);
    if timer.state(cpu) == TimerState::Armed {
        timeout::remove(cpu, TimedRef::Timer(timer));
    }
    timer.state.set(cpu, TimerState::Armed);
    timeout::insert(cpu, TimedRef::Timer(timer), now, delay);
}

/// Called by `timeout::tick` when `timer`'s deadline has passed: invoke its
/// callback, then re-arm for `period` ticks if periodic, else stop.
///
/// `delay` is defaulted to `period` *before* the callback runs so that, if
/// the callback never touches it, re-arming below reproduces the unmodified
/// periodic cadence. The callback may still call `set_delay`/`set_proc` on
/// itself during the call to override either for its next firing; re-arming
/// always reads both fields after the callback returns, so such a
/// self-modification is never clobbered by the default.
pub(crate) fn fire(cpu: Cpu<'_>, timer: &'static TimerCb, now: Tick) {
    let period = timer.period.get(cpu);
    if period != 0 {
        timer.delay.set(cpu, period);
    }

    let proc = timer.proc.get(cpu);
    (proc)(timer.arg);

    if period == 0 {
        timer.state.set(cpu, TimerState::Stopped);
    } else {
        let delay = timer.delay.get(cpu);
        timeout::insert(cpu, TimedRef::Timer(timer), now, delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static ONE_SHOT_FIRES: AtomicU32 = AtomicU32::new(0);
    fn one_shot_cb(_arg: usize) {
        ONE_SHOT_FIRES.fetch_add(1, Ordering::SeqCst);
    }
    static ONE_SHOT: TimerCb = TimerCb::new("timer-one-shot", one_shot_cb, 0);

    /// P5: a one-shot timer fires exactly once, exactly at its deadline.
    #[test]
    fn one_shot_fires_exactly_once_at_its_deadline() {
        let _g = crate::test_support::setup();
        ONE_SHOT_FIRES.store(0, Ordering::SeqCst);
        crate::klock::with_lock(|cpu| {
            start(&ONE_SHOT, 10);
            assert_eq!(ONE_SHOT.state(cpu), TimerState::Armed);
        });
        for _ in 0..9 {
            crate::system::tick();
        }
        assert_eq!(ONE_SHOT_FIRES.load(Ordering::SeqCst), 0, "fired early");
        crate::system::tick();
        assert_eq!(ONE_SHOT_FIRES.load(Ordering::SeqCst), 1, "did not fire at deadline");
        for _ in 0..5 {
            crate::system::tick();
        }
        assert_eq!(ONE_SHOT_FIRES.load(Ordering::SeqCst), 1, "fired more than once");
        crate::klock::with_lock(|cpu| {
            assert_eq!(ONE_SHOT.state(cpu), TimerState::Stopped);
        });
    }

    static PERIODIC_FIRES: AtomicU32 = AtomicU32::new(0);
    fn periodic_cb(_arg: usize) {
        PERIODIC_FIRES.fetch_add(1, Ordering::SeqCst);
    }
    static PERIODIC: TimerCb = TimerCb::new("timer-periodic", periodic_cb, 0);

    /// P6: a periodic timer fires every `period` ticks, drift-free.
    #[test]
    fn periodic_timer_fires_every_period() {
        let _g = crate::test_support::setup();
        PERIODIC_FIRES.store(0, Ordering::SeqCst);
        start_periodic(&PERIODIC, 5, 5);
        for _ in 0..5 {
            crate::system::tick();
        }
        assert_eq!(PERIODIC_FIRES.load(Ordering::SeqCst), 1);
        for _ in 0..5 {
            crate::system::tick();
        }
        assert_eq!(PERIODIC_FIRES.load(Ordering::SeqCst), 2);
        for _ in 0..15 {
            crate::system::tick();
        }
        assert_eq!(PERIODIC_FIRES.load(Ordering::SeqCst), 5);
        stop(&PERIODIC);
        crate::klock::with_lock(|cpu| {
            assert_eq!(PERIODIC.state(cpu), TimerState::Stopped);
        });
    }

    static SELF_ADJUSTING_FIRES: AtomicU32 = AtomicU32::new(0);
    fn self_adjusting_cb(_arg: usize) {
        let n = SELF_ADJUSTING_FIRES.fetch_add(1, Ordering::SeqCst) + 1;
        SELF_ADJUSTING.set_delay(n * 2);
    }
    static SELF_ADJUSTING: TimerCb = TimerCb::new("timer-self-adjusting", self_adjusting_cb, 0);

    /// A timer callback may override its own re-arm delay (via `set_delay`)
    /// during the call; the handler honors the override instead of the
    /// period it started with.
    #[test]
    fn callback_can_override_its_own_rearm_delay() {
        let _g = crate::test_support::setup();
        SELF_ADJUSTING_FIRES.store(0, Ordering::SeqCst);
        start_periodic(&SELF_ADJUSTING, 2, 2);
        for _ in 0..2 {
            crate::system::tick();
        }
        assert_eq!(SELF_ADJUSTING_FIRES.load(Ordering::SeqCst), 1, "fires at its initial delay");
        for _ in 0..2 {
            crate::system::tick();
        }
        assert_eq!(SELF_ADJUSTING_FIRES.load(Ordering::SeqCst), 2, "second fire still at the unmodified period");
        for _ in 0..2 {
            crate::system::tick();
        }
        assert_eq!(
            SELF_ADJUSTING_FIRES.load(Ordering::SeqCst),
            2,
            "third fire delayed past the old period by the callback's override"
        );
        for _ in 0..2 {
            crate::system::tick();
        }
        assert_eq!(SELF_ADJUSTING_FIRES.load(Ordering::SeqCst), 3, "third fire lands where the override put it");
    }

    static INFINITE_PERIOD_FIRES: AtomicU32 = AtomicU32::new(0);
    fn infinite_period_cb(_arg: usize) {
        INFINITE_PERIOD_FIRES.fetch_add(1, Ordering::SeqCst);
    }
    static INFINITE_PERIOD: TimerCb = TimerCb::new("timer-infinite-period", infinite_period_cb, 0);

    /// §9 open question: an `INFINITE`-period timer is legal to arm but,
    /// once fired, never re-fires (re-arming at `now + INFINITE` never
    /// expires).
    #[test]
    fn infinite_period_fires_once_then_never_again() {
        let _g = crate::test_support::setup();
        INFINITE_PERIOD_FIRES.store(0, Ordering::SeqCst);
        start_periodic(&INFINITE_PERIOD, 3, crate::clock::INFINITE);
        for _ in 0..3 {
            crate::system::tick();
        }
        assert_eq!(INFINITE_PERIOD_FIRES.load(Ordering::SeqCst), 1);
        for _ in 0..50 {
            crate::system::tick();
        }
        assert_eq!(INFINITE_PERIOD_FIRES.load(Ordering::SeqCst), 1);
    }

    static STOPPED_BEFORE_FIRE: TimerCb = TimerCb::new("timer-stop-before-fire", |_| {}, 0);

    #[test]
    fn stop_before_deadline_prevents_firing() {
        let _g = crate::test_support::setup();
        start(&STOPPED_BEFORE_FIRE, 10);
        stop(&STOPPED_BEFORE_FIRE);
        crate::klock::with_lock(|cpu| {
            assert_eq!(STOPPED_BEFORE_FIRE.state(cpu), TimerState::Stopped);
            assert!(!crate::timeout::task_ring_order(cpu).contains(&"timer-stop-before-fire"));
        });
    }

    static UNTIL_FIRES: AtomicU32 = AtomicU32::new(0);
    fn until_cb(_arg: usize) {
        UNTIL_FIRES.fetch_add(1, Ordering::SeqCst);
    }
    static UNTIL: TimerCb = TimerCb::new("timer-until", until_cb, 0);

    #[test]
    fn start_until_arms_relative_to_an_absolute_deadline() {
        let _g = crate::test_support::setup();
        UNTIL_FIRES.store(0, Ordering::SeqCst);
        let deadline = crate::klock::with_lock(|cpu| crate::system::now(cpu).wrapping_add(7));
        start_until(&UNTIL, deadline);
        for _ in 0..6 {
            crate::system::tick();
        }
        assert_eq!(UNTIL_FIRES.load(Ordering::SeqCst), 0);
        crate::system::tick();
        assert_eq!(UNTIL_FIRES.load(Ordering::SeqCst), 1);
    }
}
