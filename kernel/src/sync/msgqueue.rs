//! A bounded FIFO queue of variable-length, size-tagged messages up to a
//! fixed maximum length (`msg`, §4.8). Unlike
//! [`EventQueue`](crate::sync::eventqueue::EventQueue), each element is an
//! opaque byte frame copied into the object's own backing storage — there is
//! no pointer-staging into a sender's stack (see `DESIGN.md` for why this
//! crate simplifies away from that reference-kernel technique).
use arrayvec::ArrayVec;

use crate::clock::{Tick, IMMEDIATE};
use crate::error::Error;
use crate::klock::CpuLockCell;
use crate::system;
use crate::wait::{self, WaitQueue};

/// A single frame: up to `LEN` bytes of payload plus the length actually
/// used, so `send`/`recv` can carry messages shorter than the configured
/// maximum without wasting the unused tail on the wire.
#[derive(Clone, Copy)]
struct Frame<const LEN: usize> {
    data: [u8; LEN],
    len: usize,
}

pub struct MessageQueue<const SLOTS: usize, const LEN: usize> {
    buf: CpuLockCell<ArrayVec<Frame<LEN>, SLOTS>>,
    send_waiters: WaitQueue,
    recv_waiters: WaitQueue,
}

impl<const SLOTS: usize, const LEN: usize> MessageQueue<SLOTS, LEN> {
    pub const fn new() -> Self {
        Self {
            buf: CpuLockCell::new(ArrayVec::new_const()),
            send_waiters: WaitQueue::new(),
            recv_waiters: WaitQueue::new(),
        }
    }

    /// The maximum payload length this queue accepts.
    pub const fn max_len(&self) -> usize {
        LEN
    }

    /// Enqueue a copy of `msg`, blocking for at most `delay` ticks if the
    /// queue is full. Fails with [`Error::Failure`] (without blocking) if
    /// `msg` is longer than [`max_len`](Self::max_len) — that is a
    /// precondition violation, not a capacity one.
    pub fn send(&'static self, msg: &[u8], delay: Tick) -> Result<(), Error> {
        if msg.len() > LEN {
            return Err(Error::Failure);
        }
        let mut frame = Frame {
            data: [0u8; LEN],
            len: msg.len(),
        };
        frame.data[..msg.len()].copy_from_slice(msg);

        let deadline = system::Deadline::new(delay);
        loop {
            let me;
            let remaining;
            {
                let mut guard = crate::klock::lock();
                let cpu = guard.cpu();
                let pushed = self.buf.with(cpu, |buf| buf.try_push(frame).is_ok());
                if pushed {
                    wait::wakeup_one(cpu, &self.recv_waiters, crate::error::Event::Success);
                    return Ok(());
                }
                remaining = deadline.remaining(cpu);
                if remaining == IMMEDIATE {
                    return Err(Error::Timeout);
                }
                me = system::current(cpu);
            }
            wait::wait_for(me, Some(&self.send_waiters), remaining).into_result()?;
        }
    }

    /// Dequeue the oldest message into `out`, blocking for at most `delay`
    /// ticks if the queue is empty. Returns the number of bytes written.
    /// Fails with [`Error::Failure`] if `out` is shorter than the head
    /// frame — the frame is left in place, un-consumed, so a retry with a
    /// bigger buffer still sees it.
    pub fn recv(&'static self, out: &mut [u8], delay: Tick) -> Result<usize, Error> {
        let deadline = system::Deadline::new(delay);
        loop {
            let me;
            let remaining;
            {
                let mut guard = crate::klock::lock();
                let cpu = guard.cpu();
                let head_len = self.buf.with(cpu, |buf| buf.first().map(|f| f.len));
                if let Some(len) = head_len {
                    if out.len() < len {
                        return Err(Error::Failure);
                    }
                    let frame = self.buf.with(cpu, |buf| buf.remove(0));
                    out[..len].copy_from_slice(&frame.data[..len]);
                    wait::wakeup_one(cpu, &self.send_waiters, crate::error::Event::Success);
                    return Ok(len);
                }
                remaining = deadline.remaining(cpu);
                if remaining == IMMEDIATE {
                    return Err(Error::Timeout);
                }
                me = system::current(cpu);
            }
            wait::wait_for(me, Some(&self.recv_waiters), remaining).into_result()?;
        }
    }

    /// Reset: wake every current sender and receiver with [`Error::Stopped`]
    /// and drop whatever is still queued.
    pub fn reset(&'static self) {
        crate::klock::with_lock(|cpu| {
            self.buf.with(cpu, |buf| buf.clear());
            wait::wakeup_all(cpu, &self.send_waiters, crate::error::Event::Stopped);
            wait::wakeup_all(cpu, &self.recv_waiters, crate::error::Event::Stopped);
        });
    }

    /// Destroy: wake every current sender and receiver with
    /// [`Error::Deleted`].
    pub fn destroy(&'static self) {
        crate::klock::with_lock(|cpu| {
            wait::wakeup_all(cpu, &self.send_waiters, crate::error::Event::Deleted);
            wait::wakeup_all(cpu, &self.recv_waiters, crate::error::Event::Deleted);
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

    static Q: MessageQueue<2, 8> = MessageQueue::new();
    static TASK_MSG: TaskCb = TaskCb::new("msgqueue-task", 5, noop, 0);

    #[test]
    fn round_trips_a_short_message() {
        let _g = crate::test_support::setup();
        as_current(&TASK_MSG);
        Q.reset();
        Q.send(b"hi", IMMEDIATE).unwrap();
        let mut out = [0u8; 8];
        let n = Q.recv(&mut out, IMMEDIATE).unwrap();
        assert_eq!(&out[..n], b"hi");
    }

    #[test]
    fn oversized_send_is_rejected_without_blocking() {
        let _g = crate::test_support::setup();
        as_current(&TASK_MSG);
        Q.reset();
        assert_eq!(Q.send(&[0u8; 9], IMMEDIATE), Err(Error::Failure));
    }

    #[test]
    fn undersized_recv_buffer_is_rejected_and_leaves_the_frame_queued() {
        let _g = crate::test_support::setup();
        as_current(&TASK_MSG);
        Q.reset();
        Q.send(b"hello", IMMEDIATE).unwrap();
        let mut small = [0u8; 2];
        assert_eq!(Q.recv(&mut small, IMMEDIATE), Err(Error::Failure));
        let mut big = [0u8; 8];
        let n = Q.recv(&mut big, IMMEDIATE).unwrap();
        assert_eq!(&big[..n], b"hello");
    }
}
