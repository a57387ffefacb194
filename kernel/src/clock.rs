//! The monotonic tick counter and wrap-safe duration arithmetic.
//!
//! Every duration and deadline in the kernel is expressed in the same
//! unsigned tick type. A deadline is never stored as "now + delay"; it is
//! stored as `(start, delay)` and the remaining time is recomputed with
//! wrapping subtraction on every check, exactly as `core_sys_time` based
//! comparisons are done in the reference kernel this was distilled from.

/// A tick count: either a duration (ticks to wait) or, combined with a
/// `start` tick, a deadline.
pub type Tick = u32;

/// Don't wait; return immediately if the operation can't complete right away.
pub const IMMEDIATE: Tick = 0;

/// Wait forever (enqueue on the waiter list but never on the timed-wait list).
pub const INFINITE: Tick = Tick::MAX;

/// The largest delay a single waiter may legally register with the timed-wait
/// queue. One tick below `INFINITE` is reserved so that `remaining() == 0`
/// unambiguously means "expired" and never collides with an infinite wait.
pub const CNT_LIMIT: Tick = Tick::MAX - 1;

/// Ticks elapsed from `start` to `now`, with wraparound handled by relying on
/// unsigned subtraction modulo `2^32`.
#[inline]
pub fn elapsed(start: Tick, now: Tick) -> Tick {
    now.wrapping_sub(start)
}

/// Ticks remaining until a `(start, delay)` deadline expires, saturating at
/// zero. `delay == INFINITE` never expires (always returns a positive value).
///
/// This is the wrap-safe comparator the timed-wait queue is sorted by:
/// "B follows A iff `B.delay - (B.start - A.start) > A.delay`" from the
/// kernel's ordering invariant, rephrased here as a remaining-ticks function
/// so callers just compare `remaining(..) == 0`.
#[inline]
pub fn remaining(start: Tick, delay: Tick, now: Tick) -> Tick {
    if delay == INFINITE {
        return INFINITE;
    }
    let since = elapsed(start, now);
    delay.wrapping_sub(since)
}

/// True iff a `(start, delay)` deadline has expired at `now`, i.e.
/// `elapsed(start, now) >= delay`. Uses a signed-style compare so the
/// decision stays correct across a single wraparound of `now`, as long as no
/// registered `delay` exceeds [`CNT_LIMIT`].
#[inline]
pub fn has_expired(start: Tick, delay: Tick, now: Tick) -> bool {
    if delay == INFINITE {
        return false;
    }
    elapsed(start, now) >= delay
}
