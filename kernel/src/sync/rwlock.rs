//! A reader/writer lock (`rwl`, §4.8) with writer preference: once a writer
//! is waiting, new readers queue up behind it rather than continuing to
//! join existing readers, so a steady stream of readers cannot starve a
//! writer.
use crate::clock::{Tick, IMMEDIATE};
use crate::error::Error;
use crate::klock::CpuLockCell;
use crate::system;
use crate::wait::{self, WaitQueue};

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Free,
    Read(u32),
    Write,
}

pub struct RwLock {
    state: CpuLockCell<State>,
    readers: WaitQueue,
    writers: WaitQueue,
}

impl RwLock {
    pub const fn new() -> Self {
        Self {
            state: CpuLockCell::new(State::Free),
            readers: WaitQueue::new(),
            writers: WaitQueue::new(),
        }
    }

    pub fn read_lock(&'static self, delay: Tick) -> Result<(), Error> {
        let me;
        {
            let mut guard = crate::klock::lock();
            let cpu = guard.cpu();
            me = system::current(cpu);
            if self.writers.is_empty(cpu) {
                match self.state.get(cpu) {
                    State::Free => {
                        self.state.set(cpu, State::Read(1));
                        return Ok(());
                    }
                    State::Read(n) => {
                        self.state.set(cpu, State::Read(n + 1));
                        return Ok(());
                    }
                    State::Write => {}
                }
            }
            if delay == IMMEDIATE {
                return Err(Error::Timeout);
            }
        }
        wait::wait_for(me, Some(&self.readers), delay).into_result()
    }

    pub fn write_lock(&'static self, delay: Tick) -> Result<(), Error> {
        let me;
        {
            let mut guard = crate::klock::lock();
            let cpu = guard.cpu();
            me = system::current(cpu);
            if self.state.get(cpu) == State::Free {
                self.state.set(cpu, State::Write);
                return Ok(());
            }
            if delay == IMMEDIATE {
                return Err(Error::Timeout);
            }
        }
        wait::wait_for(me, Some(&self.writers), delay).into_result()
    }

    pub fn read_unlock(&'static self) {
        let mut guard = crate::klock::lock();
        let cpu = guard.cpu();
        match self.state.get(cpu) {
            State::Read(n) if n > 1 => self.state.set(cpu, State::Read(n - 1)),
            _ => {
                self.state.set(cpu, State::Free);
                self.release_next(cpu);
            }
        }
    }

    pub fn write_unlock(&'static self) {
        let mut guard = crate::klock::lock();
        let cpu = guard.cpu();
        self.state.set(cpu, State::Free);
        self.release_next(cpu);
    }

    /// Prefer waking a waiting writer; otherwise release every waiting
    /// reader together.
    fn release_next(&'static self, cpu: crate::klock::Cpu<'_>) {
        if let Some(_writer) = wait::wakeup_one(cpu, &self.writers, crate::error::Event::Success) {
            self.state.set(cpu, State::Write);
            return;
        }
        let mut n = 0;
        while wait::wakeup_one(cpu, &self.readers, crate::error::Event::Success).is_some() {
            n += 1;
        }
        if n > 0 {
            self.state.set(cpu, State::Read(n));
        }
    }

    /// Reset: wake every current reader and writer with [`Error::Stopped`]
    /// and release whatever lock is held.
    pub fn reset(&'static self) {
        crate::klock::with_lock(|cpu| {
            self.state.set(cpu, State::Free);
            wait::wakeup_all(cpu, &self.readers, crate::error::Event::Stopped);
            wait::wakeup_all(cpu, &self.writers, crate::error::Event::Stopped);
        });
    }

    /// Destroy: wake every current reader and writer with
    /// [`Error::Deleted`].
    pub fn destroy(&'static self) {
        crate::klock::with_lock(|cpu| {
            wait::wakeup_all(cpu, &self.readers, crate::error::Event::Deleted);
            wait::wakeup_all(cpu, &self.writers, crate::error::Event::Deleted);
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

    static RW: RwLock = RwLock::new();
    static TASK_RW: TaskCb = TaskCb::new("rwlock-task", 5, noop, 0);

    #[test]
    fn multiple_readers_share_the_lock() {
        let _g = crate::test_support::setup();
        as_current(&TASK_RW);
        RW.reset();
        RW.read_lock(IMMEDIATE).unwrap();
        RW.read_lock(IMMEDIATE).unwrap();
        crate::klock::with_lock(|cpu| assert_eq!(RW.state.get(cpu), State::Read(2)));
        RW.read_unlock();
        RW.read_unlock();
        crate::klock::with_lock(|cpu| assert_eq!(RW.state.get(cpu), State::Free));
    }

    #[test]
    fn a_held_read_lock_blocks_a_writer() {
        let _g = crate::test_support::setup();
        as_current(&TASK_RW);
        RW.reset();
        RW.read_lock(IMMEDIATE).unwrap();
        assert_eq!(RW.write_lock(IMMEDIATE), Err(Error::Timeout));
        RW.read_unlock();
    }

    #[test]
    fn writer_preference_routes_new_readers_behind_a_waiting_writer() {
        let _g = crate::test_support::setup();
        as_current(&TASK_RW);
        RW.reset();
        RW.read_lock(IMMEDIATE).unwrap();
        // A writer queues directly (bypassing the blocking path, which needs
        // a real second execution context to resume).
        crate::klock::with_lock(|cpu| wait::append(cpu, &TASK_RW, &RW.writers));
        assert_eq!(RW.read_lock(IMMEDIATE), Err(Error::Timeout));
        crate::klock::with_lock(|cpu| wait::unlink(cpu, &TASK_RW, crate::error::Event::Stopped));
    }
}
