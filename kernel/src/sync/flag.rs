//! Persistent bitmask event flags (`flg`, §4.8): `set`/`clear` modify a
//! shared bitmask; `wait` blocks a task until either any one, or all, of a
//! requested set of bits become set, per waiter — unlike [`EventQueue`] or
//! [`EventGate`], several waiters can be watching disjoint masks at once, so
//! each waiter records its own wait mask/mode on itself
//! (`TaskCb::wait_mask`/`wait_all`) for `set` to re-check on every waiter.
use crate::clock::{Tick, IMMEDIATE};
use crate::error::Error;
use crate::klock::{Cpu, CpuLockCell};
use crate::system;
use crate::wait::{self, WaitQueue};

pub struct FlagGroup {
    bits: CpuLockCell<u32>,
    waiters: WaitQueue,
}

fn satisfied(cpu: Cpu<'_>, bits: u32, task: &'static crate::task::TaskCb) -> bool {
    let mask = task.wait_mask.get(cpu);
    if task.wait_all.get(cpu) {
        bits & mask == mask
    } else {
        bits & mask != 0
    }
}

impl FlagGroup {
    pub const fn new(initial: u32) -> Self {
        Self {
            bits: CpuLockCell::new(initial),
            waiters: WaitQueue::new(),
        }
    }

    pub fn get(&'static self) -> u32 {
        crate::klock::with_lock(|cpu| self.bits.get(cpu))
    }

    /// Set `mask` into the bitmask, waking every waiter whose condition is
    /// now satisfied.
    pub fn set(&'static self, mask: u32) {
        let mut guard = crate::klock::lock();
        let cpu = guard.cpu();
        let bits = self.bits.get(cpu) | mask;
        self.bits.set(cpu, bits);
        wake_satisfied(cpu, &self.waiters, bits);
    }

    pub fn clear(&'static self, mask: u32) {
        crate::klock::with_lock(|cpu| {
            let bits = self.bits.get(cpu) & !mask;
            self.bits.set(cpu, bits);
        });
    }

    /// Block until `mask` is satisfied per `all` (AND vs OR), for at most
    /// `delay` ticks. Returns the bitmask observed at the moment the
    /// condition became true. If `auto_clear` is set, the matched bits
    /// (`mask` itself if `all`, else whichever of `mask`'s bits were set)
    /// are cleared before returning, so a waiter that only wants an
    /// edge-triggered notification doesn't have to `clear` separately.
    pub fn wait(&'static self, mask: u32, all: bool, auto_clear: bool, delay: Tick) -> Result<u32, Error> {
        let me;
        {
            let mut guard = crate::klock::lock();
            let cpu = guard.cpu();
            me = system::current(cpu);
            let bits = self.bits.get(cpu);
            let ok = if all { bits & mask == mask } else { bits & mask != 0 };
            if ok {
                if auto_clear {
                    self.bits.set(cpu, bits & !mask);
                }
                return Ok(bits);
            }
            if delay == IMMEDIATE {
                return Err(Error::Timeout);
            }
            me.wait_mask.set(cpu, mask);
            me.wait_all.set(cpu, all);
        }
        wait::wait_for(me, Some(&self.waiters), delay).into_result()?;
        crate::klock::with_lock(|cpu| {
            let bits = self.bits.get(cpu);
            if auto_clear {
                self.bits.set(cpu, bits & !mask);
            }
            Ok(bits)
        })
    }

    /// Reset: wake every current waiter with [`Error::Stopped`] and restore
    /// the bitmask to `initial`.
    pub fn reset(&'static self, initial: u32) {
        crate::klock::with_lock(|cpu| {
            self.bits.set(cpu, initial);
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

fn wake_satisfied(cpu: Cpu<'_>, waiters: &'static WaitQueue, bits: u32) {
    // `wait::wakeup` splices the woken task out of the list, so collect the
    // ones to wake before mutating it rather than walking while unlinking.
    // Capped at 32 simultaneously-satisfied waiters per `set` call; a 33rd
    // satisfied waiter is picked up on the next `set`/`wait` re-check.
    let mut to_wake: arrayvec::ArrayVec<&'static crate::task::TaskCb, 32> = arrayvec::ArrayVec::new();
    let mut cursor = waiters.peek(cpu);
    while let Some(task) = cursor {
        if satisfied(cpu, bits, task) && to_wake.try_push(task).is_err() {
            break;
        }
        cursor = task_next(cpu, task);
    }
    for task in to_wake {
        wait::wakeup(cpu, task, crate::error::Event::Success);
    }
}

fn task_next(cpu: Cpu<'_>, task: &'static crate::task::TaskCb) -> Option<&'static crate::task::TaskCb> {
    task.wait_next.get(cpu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskCb;

    fn noop(_arg: usize) {}

    fn as_current(task: &'static TaskCb) {
        crate::klock::with_lock(|cpu| system::set_current(cpu, task));
    }

    static FLAGS: FlagGroup = FlagGroup::new(0);
    static TASK_FLAG: TaskCb = TaskCb::new("flag-task", 5, noop, 0);

    #[test]
    fn wait_any_returns_as_soon_as_one_requested_bit_is_set() {
        let _g = crate::test_support::setup();
        as_current(&TASK_FLAG);
        FLAGS.clear(u32::MAX);
        FLAGS.set(0b010);
        assert_eq!(FLAGS.wait(0b011, false, false, IMMEDIATE), Ok(0b010));
    }

    #[test]
    fn wait_all_times_out_until_every_requested_bit_is_set() {
        let _g = crate::test_support::setup();
        as_current(&TASK_FLAG);
        FLAGS.clear(u32::MAX);
        FLAGS.set(0b010);
        assert_eq!(FLAGS.wait(0b011, true, false, IMMEDIATE), Err(Error::Timeout));
        FLAGS.set(0b001);
        assert_eq!(FLAGS.wait(0b011, true, false, IMMEDIATE), Ok(0b011));
    }

    #[test]
    fn auto_clear_consumes_only_the_matched_bits() {
        let _g = crate::test_support::setup();
        as_current(&TASK_FLAG);
        FLAGS.clear(u32::MAX);
        FLAGS.set(0b110);
        assert_eq!(FLAGS.wait(0b010, false, true, IMMEDIATE), Ok(0b110));
        assert_eq!(FLAGS.get(), 0b100);
    }
}
