//! Shared plumbing for the scenario tests (§8's six end-to-end properties):
//! spin up a [`SimPort`] on a periodic clock, then poll a condition with a
//! generous timeout rather than trying to join threads that may be parked
//! forever on purpose (an un-joined, un-started task's thread just sits
//! parked until the process exits).
use std::time::{Duration, Instant};

use rt_kernel_sim::{Clock, SimPort};

pub fn install() -> &'static SimPort {
    let _ = env_logger::builder().is_test(true).try_init();
    let port = SimPort::new(Clock::Periodic(Duration::from_micros(100)));
    port.install();
    port
}

/// Poll `done` every millisecond for up to 5 seconds; panic if it never
/// becomes true, so a stalled scheduler fails the test instead of hanging.
pub fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "scenario did not complete in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}
