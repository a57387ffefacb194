//! A single-slot broadcast event (`evt`, StateOS's one-shot event object):
//! `give` stores a value and releases every task currently waiting; `take`
//! consumes whatever value is posted, blocking if none is.
//!
//! The distilled spec flagged the reference kernel's `evq_wait` as
//! ambiguous about whether `E_FAILURE` on `value == 0` was intentional,
//! since zero is a perfectly legal posted value. This type sidesteps the
//! question entirely by tracking "is a value posted" as its own `Option`
//! rather than overloading the value itself as a sentinel.
use crate::clock::{Tick, IMMEDIATE};
use crate::error::Error;
use crate::klock::CpuLockCell;
use crate::system;
use crate::wait::{self, WaitQueue};

pub struct EventGate {
    value: CpuLockCell<Option<u32>>,
    waiters: WaitQueue,
}

impl EventGate {
    pub const fn new() -> Self {
        Self {
            value: CpuLockCell::new(None),
            waiters: WaitQueue::new(),
        }
    }

    /// Consume the posted value, blocking for at most `delay` ticks if none
    /// has been posted yet.
    pub fn take(&'static self, delay: Tick) -> Result<u32, Error> {
        let deadline = system::Deadline::new(delay);
        loop {
            let me;
            let remaining;
            {
                let mut guard = crate::klock::lock();
                let cpu = guard.cpu();
                if let Some(value) = self.value.get(cpu) {
                    self.value.set(cpu, None);
                    return Ok(value);
                }
                remaining = deadline.remaining(cpu);
                if remaining == IMMEDIATE {
                    return Err(Error::Timeout);
                }
                me = system::current(cpu);
            }
            wait::wait_for(me, Some(&self.waiters), remaining).into_result()?;
        }
    }

    /// Post `value` and release every task currently waiting. A `give` with
    /// no one waiting still leaves the value posted for the next `take`.
    pub fn give(&'static self, value: u32) {
        crate::klock::with_lock(|cpu| {
            self.value.set(cpu, Some(value));
            wait::wakeup_all(cpu, &self.waiters, crate::error::Event::Success);
        });
    }

    /// Reset: wake every current waiter with [`Error::Stopped`] and clear
    /// any unconsumed posted value.
    pub fn reset(&'static self) {
        crate::klock::with_lock(|cpu| {
            self.value.set(cpu, None);
            wait::wakeup_all(cpu, &self.waiters, crate::error::Event::Stopped);
        });
    }

    /// Destroy: wake every current waiter with [`Error::Deleted`].
    pub fn destroy(&'static self) {
        crate::klock::with_lock(|cpu| {
            wait::wakeup_all(cpu, &self.waiters, crate::error::Event::Deleted);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskCb;

    fn noop(_arg: usize) {}

    fn as_current(task: &'static TaskCb) {
        crate::klock::with_lock(|cpu| system::set_current(cpu, task));
    }

    static GATE: EventGate = EventGate::new();
    static TASK_TAKER: TaskCb = TaskCb::new("evt-taker", 5, noop, 0);

    #[test]
    fn give_before_take_is_not_lost() {
        let _g = crate::test_support::setup();
        as_current(&TASK_TAKER);
        GATE.give(42);
        assert_eq!(GATE.take(IMMEDIATE), Ok(42));
    }

    #[test]
    fn take_with_nothing_posted_times_out_immediately() {
        let _g = crate::test_support::setup();
        as_current(&TASK_TAKER);
        assert_eq!(GATE.take(IMMEDIATE), Err(Error::Timeout));
    }

    #[test]
    fn zero_is_a_legal_posted_value() {
        let _g = crate::test_support::setup();
        as_current(&TASK_TAKER);
        GATE.give(0);
        assert_eq!(GATE.take(IMMEDIATE), Ok(0));
    }
}
