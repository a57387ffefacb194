//! A bounded FIFO queue of small event codes (`evq`, §4.8): `send` enqueues
//! and never blocks the producer beyond capacity, `wait` dequeues in FIFO
//! order and blocks only when the queue is empty.
use arrayvec::ArrayVec;

use crate::clock::{Tick, IMMEDIATE};
use crate::error::Error;
use crate::klock::CpuLockCell;
use crate::system;
use crate::wait::{self, WaitQueue};

pub struct EventQueue<const N: usize> {
    buf: CpuLockCell<ArrayVec<u32, N>>,
    waiters: WaitQueue,
}

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> Self {
        Self {
            buf: CpuLockCell::new(ArrayVec::new_const()),
            waiters: WaitQueue::new(),
        }
    }

    /// Enqueue `value`. Fails with [`Error::Failure`] if the queue is full.
    pub fn send(&'static self, value: u32) -> Result<(), Error> {
        let mut guard = crate::klock::lock();
        let cpu = guard.cpu();
        let mut result = Ok(());
        self.buf.with(cpu, |buf| {
            if buf.try_push(value).is_err() {
                result = Err(Error::Failure);
            }
        });
        if result.is_ok() {
            wait::wakeup_one(cpu, &self.waiters, crate::error::Event::Success);
        }
        result
    }

    /// Dequeue the oldest event, blocking for at most `delay` ticks if the
    /// queue is empty.
    pub fn wait(&'static self, delay: Tick) -> Result<u32, Error> {
        let deadline = crate::system::Deadline::new(delay);
        loop {
            let me;
            let remaining;
            {
                let mut guard = crate::klock::lock();
                let cpu = guard.cpu();
                let popped = self.buf.with(cpu, |buf| {
                    if buf.is_empty() {
                        None
                    } else {
                        Some(buf.remove(0))
                    }
                });
                if let Some(value) = popped {
                    return Ok(value);
                }
                remaining = deadline.remaining(cpu);
                if remaining == IMMEDIATE {
                    return Err(Error::Timeout);
                }
                me = system::current(cpu);
            }
            // Woke because a sender pushed (or the object was reset/deleted,
            // in which case `into_result` already returns below); re-check
            // the buffer rather than assuming our element is still at the
            // front if several waiters raced, using whatever time is left.
            wait::wait_for(me, Some(&self.waiters), remaining).into_result()?;
        }
    }

    /// Reset: wake every current waiter with [`Error::Stopped`] and drop
    /// whatever is still queued.
    pub fn reset(&'static self) {
        crate::klock::with_lock(|cpu| {
            self.buf.with(cpu, |buf| buf.clear());
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
