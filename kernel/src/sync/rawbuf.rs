//! An unstructured byte-stream ring buffer (`raw`, §4.8), pipe-like: `write`
//! blocks only if the buffer is completely full, `read` blocks only if it is
//! completely empty, and both return as soon as *any* progress can be made
//! rather than waiting for the full request to be satisfied.
use arrayvec::ArrayVec;

use crate::clock::{Tick, IMMEDIATE};
use crate::error::Error;
use crate::klock::CpuLockCell;
use crate::system;
use crate::wait::{self, WaitQueue};

pub struct RawBuffer<const CAP: usize> {
    buf: CpuLockCell<ArrayVec<u8, CAP>>,
    readers: WaitQueue,
    writers: WaitQueue,
}

impl<const CAP: usize> RawBuffer<CAP> {
    pub const fn new() -> Self {
        Self {
            buf: CpuLockCell::new(ArrayVec::new_const()),
            readers: WaitQueue::new(),
            writers: WaitQueue::new(),
        }
    }

    /// Copy as many bytes of `data` as fit into the buffer right now,
    /// blocking for at most `delay` ticks if it starts out completely full.
    /// Returns the number of bytes actually written.
    pub fn write(&'static self, data: &[u8], delay: Tick) -> Result<usize, Error> {
        let deadline = system::Deadline::new(delay);
        loop {
            let me;
            let remaining;
            {
                let mut guard = crate::klock::lock();
                let cpu = guard.cpu();
                let n = self.buf.with(cpu, |buf| {
                    let room = CAP - buf.len();
                    let n = room.min(data.len());
                    buf.try_extend_from_slice(&data[..n]).ok();
                    n
                });
                if n > 0 {
                    wait::wakeup_one(cpu, &self.readers, crate::error::Event::Success);
                    return Ok(n);
                }
                remaining = deadline.remaining(cpu);
                if remaining == IMMEDIATE {
                    return Err(Error::Timeout);
                }
                me = system::current(cpu);
            }
            wait::wait_for(me, Some(&self.writers), remaining).into_result()?;
        }
    }

    /// Copy as many bytes as are available right now into `out`, blocking
    /// for at most `delay` ticks if the buffer starts out completely empty.
    /// Returns the number of bytes actually read.
    pub fn read(&'static self, out: &mut [u8], delay: Tick) -> Result<usize, Error> {
        let deadline = system::Deadline::new(delay);
        loop {
            let me;
            let remaining;
            {
                let mut guard = crate::klock::lock();
                let cpu = guard.cpu();
                let n = self.buf.with(cpu, |buf| {
                    let n = out.len().min(buf.len());
                    for (slot, byte) in out[..n].iter_mut().zip(buf.drain(..n)) {
                        *slot = byte;
                    }
                    n
                });
                if n > 0 {
                    wait::wakeup_one(cpu, &self.writers, crate::error::Event::Success);
                    return Ok(n);
                }
                remaining = deadline.remaining(cpu);
                if remaining == IMMEDIATE {
                    return Err(Error::Timeout);
                }
                me = system::current(cpu);
            }
            wait::wait_for(me, Some(&self.readers), remaining).into_result()?;
        }
    }

    /// Reset: wake every current reader and writer with [`Error::Stopped`]
    /// and drop whatever is still buffered.
    pub fn reset(&'static self) {
        crate::klock::with_lock(|cpu| {
            self.buf.with(cpu, |buf| buf.clear());
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

    static BUF: RawBuffer<4> = RawBuffer::new();
    static TASK_RAW: TaskCb = TaskCb::new("rawbuf-task", 5, noop, 0);

    #[test]
    fn write_short_of_capacity_then_read_it_all_back() {
        let _g = crate::test_support::setup();
        as_current(&TASK_RAW);
        BUF.reset();
        assert_eq!(BUF.write(b"ab", IMMEDIATE), Ok(2));
        let mut out = [0u8; 4];
        assert_eq!(BUF.read(&mut out, IMMEDIATE), Ok(2));
        assert_eq!(&out[..2], b"ab");
    }

    #[test]
    fn write_past_capacity_is_partial_not_blocking_when_some_room_remains() {
        let _g = crate::test_support::setup();
        as_current(&TASK_RAW);
        BUF.reset();
        assert_eq!(BUF.write(b"abc", IMMEDIATE), Ok(3));
        // Only one byte of room left; a 3-byte write takes just that byte.
        assert_eq!(BUF.write(b"xyz", IMMEDIATE), Ok(1));
        assert_eq!(BUF.write(b"more", IMMEDIATE), Err(Error::Timeout));
    }

    #[test]
    fn read_from_an_empty_buffer_times_out_immediately() {
        let _g = crate::test_support::setup();
        as_current(&TASK_RAW);
        BUF.reset();
        let mut out = [0u8; 4];
        assert_eq!(BUF.read(&mut out, IMMEDIATE), Err(Error::Timeout));
    }
}
