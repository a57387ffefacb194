//! §8 scenario: a 100 Hz periodic timer (P5/P6 — tick monotonicity, no
//! cumulative drift). No task is needed here; the timer fires straight out
//! of the tick handler.
mod support;

use std::sync::atomic::{AtomicU32, Ordering};

use rt_kernel::system;
use rt_kernel::timer::{self, TimerCb};

const PERIOD: u32 = 10; // ticks between fires ("100 Hz" against a 1 kHz tick base)

static FIRES: AtomicU32 = AtomicU32::new(0);
static TMR: TimerCb = TimerCb::new("100hz", on_fire, 0);

fn on_fire(_arg: usize) {
    FIRES.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn periodic_timer_fires_without_drift() {
    support::install();
    timer::start_periodic(&TMR, PERIOD, PERIOD);

    support::wait_until(|| FIRES.load(Ordering::SeqCst) >= 50);

    let now = system::now_tick();
    let fires = FIRES.load(Ordering::SeqCst);
    let expected = now / PERIOD;
    let drift = expected.abs_diff(fires);
    assert!(
        drift <= 1,
        "periodic timer drifted: now={now} fires={fires} expected={expected}"
    );
}
