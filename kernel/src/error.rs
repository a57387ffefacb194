//! Error and wakeup-event taxonomy.
//!
//! The kernel never panics on a recoverable precondition violation (a
//! taken/untaken mutex, a full queue, a reset object): every such case is
//! reported through [`Error`]. Programmer errors (null object, blocking from
//! an ISR) are `debug_assert!`-checked and are undefined behavior in release
//! builds, matching the reference kernel's `assert`-in-debug convention.
use core::fmt;

/// The outcome of a blocking or non-blocking kernel operation.
///
/// `E_SUCCESS` from the reference kernel is not a variant here: success is
/// `Ok(())` (or `Ok(value)`). `OWNERDEAD` is likewise not an error — see
/// [`crate::mutex::LockOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A precondition was violated: not the owner on unlock, a message too
    /// large for a fixed-slot queue, a robust mutex still inconsistent, a
    /// priority-protect mutex acquired above its ceiling, or similar.
    Failure,
    /// The deadline passed before the operation completed.
    Timeout,
    /// The object was reset while the caller was waiting on it.
    Stopped,
    /// The object was destroyed while the caller was waiting on it.
    Deleted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Error::Failure => "precondition failed",
            Error::Timeout => "operation timed out",
            Error::Stopped => "object was reset while waiting",
            Error::Deleted => "object was destroyed while waiting",
        };
        f.write_str(s)
    }
}

/// The reason a blocked task was woken, recorded on the task itself
/// (`task.event` in the reference kernel) and translated to a [`Result`] at
/// the public API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Success,
    Timeout,
    Stopped,
    Deleted,
    /// Only ever produced by a mutex handoff: the mutex was locked, but its
    /// previous owner was reset while holding it.
    OwnerDead,
}

impl Event {
    /// Translate a wakeup event into the plain `Result<(), Error>` most
    /// objects use. Lifecycle outcomes (`Stopped`/`Deleted`) always take
    /// precedence over a concurrent success per the reported-outcome
    /// ordering rule; by construction only one event is ever recorded, so
    /// there is nothing to prioritize here beyond the conversion itself.
    pub fn into_result(self) -> Result<(), Error> {
        match self {
            Event::Success => Ok(()),
            Event::Timeout => Err(Error::Timeout),
            Event::Stopped => Err(Error::Stopped),
            Event::Deleted => Err(Error::Deleted),
            Event::OwnerDead => Ok(()),
        }
    }
}
