//! Counting semaphore.
use crate::clock::{Tick, IMMEDIATE};
use crate::error::Error;
use crate::klock::CpuLockCell;
use crate::system;
use crate::wait::{self, WaitQueue};

pub struct Semaphore {
    count: CpuLockCell<u32>,
    limit: u32,
    waiters: WaitQueue,
}

impl Semaphore {
    pub const fn new(initial: u32, limit: u32) -> Self {
        Self {
            count: CpuLockCell::new(initial),
            limit,
            waiters: WaitQueue::new(),
        }
    }

    /// Take one count, blocking for at most `delay` ticks if none are
    /// available.
    pub fn wait(&'static self, delay: Tick) -> Result<(), Error> {
        let me;
        {
            let mut guard = crate::klock::lock();
            let cpu = guard.cpu();
            me = system::current(cpu);
            let count = self.count.get(cpu);
            if count > 0 {
                self.count.set(cpu, count - 1);
                return Ok(());
            }
            if delay == IMMEDIATE {
                return Err(Error::Timeout);
            }
        }
        wait::wait_for(me, Some(&self.waiters), delay).into_result()
    }

    pub fn try_wait(&'static self) -> Result<(), Error> {
        self.wait(IMMEDIATE)
    }

    /// Release one count: handed directly to the highest-priority waiter if
    /// one is blocked, otherwise added to the count (capped at `limit`).
    pub fn signal(&'static self) -> Result<(), Error> {
        let mut guard = crate::klock::lock();
        let cpu = guard.cpu();
        if wait::wakeup_one(cpu, &self.waiters, crate::error::Event::Success).is_some() {
            return Ok(());
        }
        let count = self.count.get(cpu);
        if count >= self.limit {
            return Err(Error::Failure);
        }
        self.count.set(cpu, count + 1);
        Ok(())
    }

    pub fn count(&'static self) -> u32 {
        crate::klock::with_lock(|cpu| self.count.get(cpu))
    }

    /// Reset: wake every current waiter with [`Error::Stopped`] and restore
    /// the count to `initial`. A future `wait`/`signal` behaves as if the
    /// semaphore had just been constructed.
    pub fn reset(&'static self, initial: u32) {
        crate::klock::with_lock(|cpu| {
            self.count.set(cpu, initial);
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

    static SEM: Semaphore = Semaphore::new(1, 1);
    static TASK_SEM: TaskCb = TaskCb::new("semaphore-task", 5, noop, 0);

    #[test]
    fn wait_takes_a_unit_and_signal_gives_one_back() {
        let _g = crate::test_support::setup();
        as_current(&TASK_SEM);
        SEM.reset(1);
        SEM.wait(IMMEDIATE).unwrap();
        assert_eq!(SEM.count(), 0);
        assert_eq!(SEM.wait(IMMEDIATE), Err(Error::Timeout));
        SEM.signal().unwrap();
        assert_eq!(SEM.count(), 1);
    }

    #[test]
    fn signal_past_the_limit_fails() {
        let _g = crate::test_support::setup();
        as_current(&TASK_SEM);
        SEM.reset(1);
        assert_eq!(SEM.signal(), Err(Error::Failure));
    }
}
