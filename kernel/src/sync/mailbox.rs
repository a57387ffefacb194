//! A single-slot rendezvous mailbox (`box`, §4.8): the degenerate,
//! capacity-one case of [`MessageQueue`](crate::sync::msgqueue::MessageQueue),
//! kept as its own small type since a single slot is the common case for a
//! one-shot result handoff between two tasks.
use crate::clock::Tick;
use crate::error::Error;
use crate::sync::msgqueue::MessageQueue;

pub struct Mailbox<const LEN: usize> {
    inner: MessageQueue<1, LEN>,
}

impl<const LEN: usize> Mailbox<LEN> {
    pub const fn new() -> Self {
        Self {
            inner: MessageQueue::new(),
        }
    }

    /// Post a message up to `LEN` bytes, blocking for at most `delay` ticks
    /// if the slot is already full. Fails with [`Error::Failure`] if `msg`
    /// is longer than `LEN`.
    pub fn post(&'static self, msg: &[u8], delay: Tick) -> Result<(), Error> {
        self.inner.send(msg, delay)
    }

    /// Take the pending message into `out`, blocking for at most `delay`
    /// ticks if the slot is empty. Returns the number of bytes written;
    /// fails with [`Error::Failure`] if `out` is shorter than the pending
    /// message.
    pub fn take(&'static self, out: &mut [u8], delay: Tick) -> Result<usize, Error> {
        self.inner.recv(out, delay)
    }

    /// Reset: wake every current poster/taker with [`Error::Stopped`] and
    /// drop any pending message.
    pub fn reset(&'static self) {
        self.inner.reset();
    }

    /// Destroy: wake every current poster/taker with [`Error::Deleted`].
    pub fn destroy(&'static self) {
        self.inner.destroy();
    }
}
