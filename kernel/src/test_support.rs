//! Test-only scaffolding shared by unit tests across this crate: a `Port`
//! that does nothing but count lock nesting, and a process-wide mutex that
//! serializes tests touching the kernel singleton (`system::boot` runs once;
//! every test after that shares the same `IDLE` ring and tick counter).
#![cfg(test)]
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::clock::Tick;
use crate::port::Port;

struct NoopPort {
    depth: AtomicU32,
}

impl Port for NoopPort {
    fn set_lock(&self) {
        self.depth.fetch_add(1, Ordering::SeqCst);
    }

    fn clr_lock(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }

    fn is_locked(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    // Unit tests never run more than one task's code at a time, so there is
    // nothing for a switch to actually do here.
    fn ctx_switch(&self) {}
    fn ctx_switch_now(&self) {}

    fn tmr_start(&self, _deadline: Tick) {}
    fn tmr_stop(&self) {}
    fn tmr_force(&self) {}
    fn wfi(&self) {}
}

static PORT: NoopPort = NoopPort {
    depth: AtomicU32::new(0),
};
static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Call at the top of every test that touches kernel state. Installs the
/// no-op port and boots the kernel singleton (both idempotent), then holds
/// a process-wide lock for the rest of the test so unrelated tests can't
/// interleave on the shared `IDLE` ring / tick counter / wait queues.
#[must_use]
pub fn setup() -> std::sync::MutexGuard<'static, ()> {
    let _ = env_logger::try_init();
    let guard = TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    // Safety: serialized by `TEST_LOCK`, and always installs the same port.
    unsafe {
        crate::port::set_port(&PORT);
    }
    log::trace!("test harness: booting kernel singleton");
    crate::system::boot();
    guard
}
