//! A cyclic barrier (`bar`, §4.8): blocks every caller until exactly
//! `parties` of them have arrived, then releases them all together and
//! resets for the next generation.
use crate::clock::{Tick, IMMEDIATE};
use crate::error::Error;
use crate::klock::CpuLockCell;
use crate::system;
use crate::wait::{self, WaitQueue};

pub struct Barrier {
    parties: u32,
    waiting: CpuLockCell<u32>,
    waiters: WaitQueue,
}

impl Barrier {
    pub const fn new(parties: u32) -> Self {
        Self {
            parties,
            waiting: CpuLockCell::new(0),
            waiters: WaitQueue::new(),
        }
    }

    /// Arrive at the barrier. Returns `Ok(true)` for the one caller whose
    /// arrival completed the generation (useful for electing that caller to
    /// do post-barrier cleanup), `Ok(false)` for everyone else. A caller that
    /// would have to block and passes `delay == IMMEDIATE` does not count as
    /// having arrived at all — a non-blocking poll must not silently consume
    /// a party's slot in the generation it declined to wait for.
    pub fn wait(&'static self, delay: Tick) -> Result<bool, Error> {
        let me;
        {
            let mut guard = crate::klock::lock();
            let cpu = guard.cpu();
            me = system::current(cpu);
            let count = self.waiting.get(cpu) + 1;
            if count >= self.parties {
                self.waiting.set(cpu, 0);
                wait::wakeup_all(cpu, &self.waiters, crate::error::Event::Success);
                return Ok(true);
            }
            if delay == IMMEDIATE {
                return Err(Error::Timeout);
            }
            self.waiting.set(cpu, count);
        }
        wait::wait_for(me, Some(&self.waiters), delay).into_result()?;
        Ok(false)
    }

    /// Reset: wake every current waiter with [`Error::Stopped`] and start a
    /// fresh generation.
    pub fn reset(&'static self) {
        crate::klock::with_lock(|cpu| {
            self.waiting.set(cpu, 0);
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
