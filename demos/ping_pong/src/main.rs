//! A minimal demo: two tasks trade a token back and forth over a pair of
//! binary semaphores, tracing each handoff through `log`. Run with
//! `RUST_LOG=trace` to watch the scheduler's decisions, `RUST_LOG=info` for
//! just the volley count.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use log::info;

use rt_kernel::clock::INFINITE;
use rt_kernel::sync::Semaphore;
use rt_kernel::task::{self, TaskCb};
use rt_kernel_sim::{Clock, SimPort};

static SEM_PING: Semaphore = Semaphore::new(1, 1);
static SEM_PONG: Semaphore = Semaphore::new(0, 1);
static VOLLEYS: AtomicUsize = AtomicUsize::new(0);
const TARGET: usize = 10;

static DONE_TX: StdMutex<Option<mpsc::Sender<()>>> = StdMutex::new(None);

static PING: TaskCb = TaskCb::new("ping", 10, ping_entry, 0);
static PONG: TaskCb = TaskCb::new("pong", 10, pong_entry, 0);

fn ping_entry(_arg: usize) {
    loop {
        SEM_PING.wait(INFINITE).unwrap();
        let n = VOLLEYS.fetch_add(1, Ordering::SeqCst) + 1;
        info!("ping: volley {n}");
        if n >= TARGET {
            if let Some(tx) = DONE_TX.lock().unwrap().take() {
                let _ = tx.send(());
            }
            return;
        }
        SEM_PONG.signal().unwrap();
    }
}

fn pong_entry(_arg: usize) {
    loop {
        SEM_PONG.wait(INFINITE).unwrap();
        let n = VOLLEYS.fetch_add(1, Ordering::SeqCst) + 1;
        info!("pong: volley {n}");
        SEM_PING.signal().unwrap();
    }
}

fn main() {
    env_logger::init();
    let (tx, rx) = mpsc::channel();
    *DONE_TX.lock().unwrap() = Some(tx);

    let port = SimPort::new(Clock::Periodic(Duration::from_millis(1)));
    port.install();
    port.spawn(&PING);
    port.spawn(&PONG);
    task::start(&PING);
    task::start(&PONG);

    rx.recv_timeout(Duration::from_secs(5))
        .expect("ping-pong demo stalled");
    info!("done after {} volleys", VOLLEYS.load(Ordering::SeqCst));
}
