//! §8 scenario: robust-mutex owner dies (P9). A task locks a robust mutex
//! and then simply exits without releasing it — `task::stop` treats that the
//! same way it treats a reset, handing the mutex to the next waiter with
//! `Event::OwnerDead` rather than leaving it stuck forever.
mod support;

use std::sync::atomic::{AtomicBool, Ordering};

use rt_kernel::clock::INFINITE;
use rt_kernel::mutex::{self, LockOutcome, MutexCb, Protocol};
use rt_kernel::task::{self, TaskCb};

static MTX: MutexCb = MutexCb::new("robust", Protocol::None, true, false);
static RECOVERED: AtomicBool = AtomicBool::new(false);
static DONE: AtomicBool = AtomicBool::new(false);

static DOOMED: TaskCb = TaskCb::new("doomed", 5, doomed_entry, 0);
static WAITER: TaskCb = TaskCb::new("waiter", 5, waiter_entry, 0);

fn doomed_entry(_arg: usize) {
    mutex::lock(&MTX, INFINITE).unwrap();
    // No unlock, no `mark_consistent` — this task just disappears while
    // holding the mutex, as if it had crashed.
}

fn waiter_entry(_arg: usize) {
    task::sleep_for(2).unwrap(); // let `doomed` acquire and die first
    let outcome = mutex::lock(&MTX, INFINITE).unwrap();
    if outcome == LockOutcome::Recovered {
        mutex::mark_consistent(&MTX).unwrap();
        mutex::unlock(&MTX).unwrap();
        RECOVERED.store(true, Ordering::SeqCst);
    }
    DONE.store(true, Ordering::SeqCst);
}

#[test]
fn waiter_recovers_mutex_after_owner_dies() {
    let port = support::install();
    port.spawn(&DOOMED);
    port.spawn(&WAITER);
    task::start(&DOOMED);
    task::start(&WAITER);

    support::wait_until(|| DONE.load(Ordering::SeqCst));
    assert!(RECOVERED.load(Ordering::SeqCst), "waiter never saw LockOutcome::Recovered");
}
