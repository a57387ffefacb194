//! Condition variable: always used together with a [`crate::mutex::MutexCb`],
//! exactly like `pthread_cond_t`. `wait` atomically (with respect to other
//! kernel operations) releases the mutex and blocks, then reacquires the
//! mutex before returning — regardless of whether it woke by signal,
//! timeout, or the object being reset.
use crate::clock::{Tick, IMMEDIATE};
use crate::error::{Error, Event};
use crate::mutex::MutexCb;
use crate::system;
use crate::wait::{self, WaitQueue};

pub struct CondVar {
    waiters: WaitQueue,
}

impl CondVar {
    pub const fn new() -> Self {
        Self {
            waiters: WaitQueue::new(),
        }
    }

    /// Release `mtx`, block for at most `delay` ticks, then reacquire `mtx`
    /// before returning (even on timeout or error). A condvar has no
    /// already-true condition to poll — it only ever wakes on a `signal`/
    /// `broadcast` that happens while blocked — so `delay == IMMEDIATE`
    /// always times out without actually registering a wait.
    pub fn wait(&'static self, mtx: &'static MutexCb, delay: Tick) -> Result<(), Error> {
        crate::mutex::unlock(mtx)?;

        let event = if delay == IMMEDIATE {
            Event::Timeout
        } else {
            let me = crate::klock::with_lock(system::current);
            wait::wait_for(me, Some(&self.waiters), delay)
        };

        crate::mutex::lock(mtx, crate::clock::INFINITE)?;
        event.into_result()
    }

    pub fn signal(&'static self) {
        crate::klock::with_lock(|cpu| {
            wait::wakeup_one(cpu, &self.waiters, crate::error::Event::Success);
        });
    }

    pub fn broadcast(&'static self) {
        crate::klock::with_lock(|cpu| {
            wait::wakeup_all(cpu, &self.waiters, crate::error::Event::Success);
        });
    }

    /// Reset: wake every current waiter with [`Error::Stopped`] (it still
    /// reacquires `mtx` before returning, exactly like a signaled wakeup).
    pub fn reset(&'static self) {
        crate::klock::with_lock(|cpu| {
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
    use crate::mutex::{self, Protocol};
    use crate::task::TaskCb;

    fn noop(_arg: usize) {}

    fn as_current(task: &'static TaskCb) {
        crate::klock::with_lock(|cpu| system::set_current(cpu, task));
    }

    static CV: CondVar = CondVar::new();
    static M: MutexCb = MutexCb::new("condvar-mtx", Protocol::None, false, false);
    static TASK_CV: TaskCb = TaskCb::new("condvar-task", 5, noop, 0);

    #[test]
    fn immediate_wait_times_out_and_still_reacquires_the_mutex() {
        let _g = crate::test_support::setup();
        as_current(&TASK_CV);
        mutex::lock(&M, IMMEDIATE).unwrap();
        assert_eq!(CV.wait(&M, IMMEDIATE), Err(Error::Timeout));
        // The mutex is held again by the caller, exactly as on a real wake.
        assert_eq!(mutex::unlock(&M), Ok(()));
    }
}
