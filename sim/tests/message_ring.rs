//! §8 scenario: a ring of three tasks passing a lap counter through a chain
//! of message queues. Exercises `MessageQueue` send/recv blocking and, since
//! the token only ever has one owner at a time, doubles as a mutual-
//! exclusion sanity check: the lap counter must advance by exactly one per
//! trip around the ring, never more.
mod support;

use std::sync::atomic::{AtomicU32, Ordering};

use rt_kernel::clock::INFINITE;
use rt_kernel::sync::MessageQueue;
use rt_kernel::task::{self, TaskCb};

const TARGET_LAPS: u32 = 50;

static Q_TO_B: MessageQueue<1, 4> = MessageQueue::new();
static Q_TO_C: MessageQueue<1, 4> = MessageQueue::new();
static Q_TO_A: MessageQueue<1, 4> = MessageQueue::new();

static LAPS: AtomicU32 = AtomicU32::new(0);

static TASK_A: TaskCb = TaskCb::new("ring-a", 5, task_a_entry, 0);
static TASK_B: TaskCb = TaskCb::new("ring-b", 5, task_b_entry, 0);
static TASK_C: TaskCb = TaskCb::new("ring-c", 5, task_c_entry, 0);

fn task_a_entry(_arg: usize) {
    let mut buf = [0u8; 4];
    Q_TO_B.send(&0u32.to_le_bytes(), INFINITE).unwrap();
    loop {
        Q_TO_A.recv(&mut buf, INFINITE).unwrap();
        let count = u32::from_le_bytes(buf) + 1;
        LAPS.store(count, Ordering::SeqCst);
        if count >= TARGET_LAPS {
            return;
        }
        Q_TO_B.send(&count.to_le_bytes(), INFINITE).unwrap();
    }
}

fn task_b_entry(_arg: usize) {
    let mut buf = [0u8; 4];
    loop {
        Q_TO_B.recv(&mut buf, INFINITE).unwrap();
        Q_TO_C.send(&buf, INFINITE).unwrap();
    }
}

fn task_c_entry(_arg: usize) {
    let mut buf = [0u8; 4];
    loop {
        Q_TO_C.recv(&mut buf, INFINITE).unwrap();
        Q_TO_A.send(&buf, INFINITE).unwrap();
    }
}

#[test]
fn ring_of_three_advances_one_lap_at_a_time() {
    let port = support::install();
    port.spawn(&TASK_A);
    port.spawn(&TASK_B);
    port.spawn(&TASK_C);
    task::start(&TASK_A);
    task::start(&TASK_B);
    task::start(&TASK_C);

    support::wait_until(|| LAPS.load(Ordering::SeqCst) >= TARGET_LAPS);
}
