//! §8 scenario: a barrier of four. Four tasks arrive at a cyclic barrier at
//! staggered times; exactly one of them should see its arrival complete the
//! generation, and all four should be released.
mod support;

use std::sync::atomic::{AtomicUsize, Ordering};

use rt_kernel::sync::Barrier;
use rt_kernel::task::{self, TaskCb};

static GATE: Barrier = Barrier::new(4);
static ARRIVALS: AtomicUsize = AtomicUsize::new(0);
static TRIGGERS: AtomicUsize = AtomicUsize::new(0);

static T0: TaskCb = TaskCb::new("party-0", 5, party_entry::<0>, 0);
static T1: TaskCb = TaskCb::new("party-1", 5, party_entry::<1>, 0);
static T2: TaskCb = TaskCb::new("party-2", 5, party_entry::<2>, 0);
static T3: TaskCb = TaskCb::new("party-3", 5, party_entry::<3>, 0);

fn party_entry<const STAGGER: u32>(_arg: usize) {
    if STAGGER > 0 {
        task::sleep_for(STAGGER).unwrap();
    }
    let triggered = GATE.wait(rt_kernel::clock::INFINITE).unwrap();
    if triggered {
        TRIGGERS.fetch_add(1, Ordering::SeqCst);
    }
    ARRIVALS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn exactly_one_party_completes_the_generation() {
    let port = support::install();
    port.spawn(&T0);
    port.spawn(&T1);
    port.spawn(&T2);
    port.spawn(&T3);
    task::start(&T0);
    task::start(&T1);
    task::start(&T2);
    task::start(&T3);

    support::wait_until(|| ARRIVALS.load(Ordering::SeqCst) >= 4);
    assert_eq!(TRIGGERS.load(Ordering::SeqCst), 1);
}
