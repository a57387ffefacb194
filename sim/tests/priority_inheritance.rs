//! §8 scenario: priority-inheritance unblock (P3/P4). A low-priority task
//! holds a mutex; a high-priority task blocks on it; a medium-priority task
//! is ready the whole time and would otherwise starve both of them. With
//! inheritance, the low task is boosted above medium for as long as high is
//! waiting, so it finishes and hands the mutex to high before medium's loop
//! has run to completion.
mod support;

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use rt_kernel::clock::INFINITE;
use rt_kernel::mutex::{self, MutexCb, Protocol};
use rt_kernel::task::{self, TaskCb};

static MTX: MutexCb = MutexCb::new("pi-mutex", Protocol::Inherit, false, false);
static LOG: StdMutex<Vec<&'static str>> = StdMutex::new(Vec::new());

const MEDIUM_ITERS: u32 = 30;

static LOW: TaskCb = TaskCb::new("low", 1, low_entry, 0);
static MEDIUM: TaskCb = TaskCb::new("medium", 5, medium_entry, 0);
static HIGH: TaskCb = TaskCb::new("high", 10, high_entry, 0);

fn low_entry(_arg: usize) {
    mutex::lock(&MTX, INFINITE).unwrap();
    // Hold it long enough for `high` to block on it and for `medium` to
    // start its loop.
    task::sleep_for(5).unwrap();
    LOG.lock().unwrap().push("low-done");
    mutex::unlock(&MTX).unwrap();
}

fn medium_entry(_arg: usize) {
    // Periodic, sleep_for-yielding busy work: without inheritance this runs
    // ahead of `low` (same-or-lower priority) for its whole duration.
    for _ in 0..MEDIUM_ITERS {
        task::sleep_for(1).unwrap();
    }
    LOG.lock().unwrap().push("medium-done");
}

fn high_entry(_arg: usize) {
    task::sleep_for(1).unwrap(); // let `low` take the mutex first
    mutex::lock(&MTX, INFINITE).unwrap();
    LOG.lock().unwrap().push("high-acquired");
    mutex::unlock(&MTX).unwrap();
}

#[test]
fn low_priority_holder_is_boosted_past_medium() {
    let port = support::install();
    port.spawn(&LOW);
    port.spawn(&MEDIUM);
    port.spawn(&HIGH);
    task::start(&LOW);
    task::start(&MEDIUM);
    task::start(&HIGH);

    support::wait_until(|| LOG.lock().unwrap().len() >= 3);
    std::thread::sleep(Duration::from_millis(10));

    let log = LOG.lock().unwrap();
    let pos = |name: &str| log.iter().position(|&s| s == name).unwrap();
    assert!(
        pos("low-done") < pos("high-acquired"),
        "high acquired before low released: {log:?}"
    );
    assert!(
        pos("high-acquired") < pos("medium-done"),
        "medium finished before the boosted low/high handoff: {log:?}"
    );
}
