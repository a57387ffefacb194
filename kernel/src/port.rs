//! The platform port interface.
//!
//! This is the seam between the portable kernel core and a concrete MCU (or,
//! for testing, a hosted simulator such as the `rt_kernel_sim` crate). A port
//! never calls back into the kernel except through [`crate::system::tick`]
//! (from its tick ISR) and [`crate::system::on_context_switch_request`]-style
//! dispatch; everything else is the kernel calling *out* to the port.
use crate::clock::Tick;

/// Operations a platform port must provide.
///
/// All methods are called with the kernel's critical section already held
/// unless documented otherwise, and must not themselves block.
pub trait Port: Sync {
    /// Nest-counted disable of the preemption source (interrupts, or the
    /// scheduler tick). The first level of nesting actually disables it; the
    /// matching [`Port::clr_lock`] that returns the nest count to zero
    /// re-enables it.
    fn set_lock(&self);

    /// The inverse of [`Port::set_lock`].
    fn clr_lock(&self);

    /// Whether the preemption source is currently disabled by this port
    /// (nest count > 0). Used only for debug-mode context assertions.
    fn is_locked(&self) -> bool;

    /// Pend a context switch if the task at the head of the ready queue is
    /// not the currently running task. Non-blocking; takes effect at the
    /// next opportunity (typically on leaving the critical section).
    fn ctx_switch(&self);

    /// Force an immediate context switch. Used when the running task has
    /// just left the ready queue and must not be resumed.
    fn ctx_switch_now(&self);

    /// Program the one-shot hardware timer to fire at the given absolute
    /// tick (tickless mode only).
    fn tmr_start(&self, deadline: Tick);

    /// Stop the one-shot hardware timer (tickless mode only).
    fn tmr_stop(&self);

    /// Force the one-shot hardware timer to fire immediately (tickless
    /// mode only), used after inserting a timer that might expire sooner
    /// than the one currently programmed.
    fn tmr_force(&self);

    /// Hint to idle the CPU until the next interrupt (used by the idle
    /// task).
    fn wfi(&self);
}

static mut PORT: Option<&'static dyn Port> = None;

/// Install the platform port. Must be called exactly once, before any other
/// kernel operation — this is the kernel's one-shot global-state latch (see
/// the reference kernel's `System`/`MAIN`/`IDLE`/`WAIT` singletons).
///
/// # Safety
/// Must not be called concurrently with itself or with any other kernel
/// operation that might read the port.
pub unsafe fn set_port(port: &'static dyn Port) {
    // Safety: caller guarantees exclusive access during the one-shot latch.
    unsafe {
        PORT = Some(port);
    }
}

/// Fetch the installed platform port.
///
/// # Panics
/// Panics if [`set_port`] has not been called yet.
#[inline]
pub(crate) fn port() -> &'static dyn Port {
    // Safety: `PORT` is written exactly once by `set_port` before any other
    // kernel code runs, and never mutated afterward.
    unsafe { PORT.expect("rt_kernel: set_port() must be called before any kernel operation") }
}
