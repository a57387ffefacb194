//! A hosted [`rt_kernel::port::Port`] for tests and demos: every task gets a
//! real OS thread, but at most one of them is ever actually running — the
//! rest are parked on a condition variable, woken one at a time the same way
//! a bare-metal port swaps stacks. This buys single-core semantics by
//! baton-passing instead of true user-mode/fiber-based scheduling.
//!
//! A single reentrant lock (built on [`Mutex`] + [`Condvar`], keyed by
//! [`ThreadId`]) backs [`Port::set_lock`]/[`Port::clr_lock`] and doubles as
//! the real mutual-exclusion primitive that makes it sound for
//! [`rt_kernel::klock::CpuLockCell`] to assume only one OS thread ever
//! touches kernel state at a time, even though the tick thread and whichever
//! task is running are genuinely concurrent OS threads.
use std::sync::atomic::Ordering;
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use log::trace;

use rt_kernel::clock::Tick;
use rt_kernel::port::Port;
use rt_kernel::task::TaskCb;

/// How the background clock thread advances the kernel's tick counter.
pub enum Clock {
    /// Call [`rt_kernel::system::tick`] once every `period` of wall-clock
    /// time, forever. What every demo and test in this crate uses.
    Periodic(Duration),
    /// Advance the counter only when [`Port::tmr_start`] schedules a
    /// deadline, for the kernel's `tickless` feature. Since
    /// [`rt_kernel::system::tick`] only ever advances the counter by one,
    /// the clock thread gets there by calling it `delta` times back to back
    /// just before the deadline rather than jumping the counter directly.
    Tickless { tick_period: Duration },
}

struct LockState {
    owner: Option<ThreadId>,
    depth: u32,
}

/// A park/wake point for one host thread standing in for a task (or, for
/// index 0, for whichever thread is currently playing the idle task — see
/// [`SimPort::ctx_switch_now`]).
struct Slot {
    ready: Mutex<bool>,
    cv: Condvar,
}

impl Slot {
    fn new() -> Self {
        Self {
            ready: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn park(&self) {
        let mut ready = self.ready.lock().unwrap();
        while !*ready {
            ready = self.cv.wait(ready).unwrap();
        }
        *ready = false;
    }

    fn wake(&self) {
        *self.ready.lock().unwrap() = true;
        self.cv.notify_one();
    }
}

pub struct SimPort {
    lock_state: Mutex<LockState>,
    lock_cv: Condvar,
    slots: Mutex<Vec<&'static Slot>>,
    clock: Clock,
    tmr_deadline: Mutex<Option<Tick>>,
    tmr_cv: Condvar,
}

impl SimPort {
    /// Build a port and leak it to `'static` — every kernel object in this
    /// crate's model is `'static`, ports are no exception (see `klock.rs`).
    pub fn new(clock: Clock) -> &'static SimPort {
        let port = Box::leak(Box::new(SimPort {
            lock_state: Mutex::new(LockState {
                owner: None,
                depth: 0,
            }),
            lock_cv: Condvar::new(),
            slots: Mutex::new(Vec::new()),
            clock,
            tmr_deadline: Mutex::new(None),
            tmr_cv: Condvar::new(),
        }));
        // Slot 0 is reserved for whichever thread is currently playing idle;
        // it is never handed out by `new_slot`.
        let idle_slot: &'static Slot = Box::leak(Box::new(Slot::new()));
        port.slots.lock().unwrap().push(idle_slot);
        port
    }

    /// Install `self` as the kernel's port, boot the scheduler, and start the
    /// background clock. Must be called exactly once, before spawning or
    /// starting any task.
    pub fn install(&'static self) {
        // Safety: called once, before any other kernel operation.
        unsafe { rt_kernel::port::set_port(self) };
        rt_kernel::system::boot();
        self.spawn_clock_thread();
    }

    /// Give `task` a dedicated host thread. The thread parks immediately and
    /// does not run until the kernel actually schedules `task` (via
    /// [`rt_kernel::task::start`]); it runs `task`'s entry point once it does,
    /// exactly like a bare-metal port dispatching onto a freshly stacked task.
    pub fn spawn(&'static self, task: &'static TaskCb) {
        let slot = self.new_slot();
        task.port_scratch.store(slot, Ordering::Release);
        let name = task.name.to_string();
        thread::Builder::new()
            .name(name)
            .spawn(move || {
                self.slot(slot).park();
                rt_kernel::system::on_switched_in(task);
                trace!("sim: dispatching {}", task.name);
                rt_kernel::system::dispatch(task);
            })
            .expect("rt_kernel_sim: failed to spawn task thread");
    }

    fn new_slot(&self) -> usize {
        let mut slots = self.slots.lock().unwrap();
        let slot: &'static Slot = Box::leak(Box::new(Slot::new()));
        slots.push(slot);
        slots.len() - 1
    }

    fn slot(&self, index: usize) -> &'static Slot {
        self.slots.lock().unwrap()[index]
    }

    fn wake_slot(&self, index: usize) {
        self.slot(index).wake();
    }

    /// Give up the virtual CPU without blocking the caller: the calling
    /// thread does not park, so it keeps running — whatever it does next
    /// (typically dropping its `CpuLockGuard`) is what actually lets the
    /// newly woken thread proceed, since that thread immediately tries to
    /// reacquire this same lock in [`Self::spawn`]'s `on_switched_in` call.
    fn release_virtual_cpu(&self) -> u32 {
        let mut s = self.lock_state.lock().unwrap();
        let depth = s.depth;
        s.depth = 0;
        s.owner = None;
        self.lock_cv.notify_all();
        depth
    }

    fn reacquire_virtual_cpu(&self, depth: u32) {
        let me = thread::current().id();
        let mut s = self.lock_state.lock().unwrap();
        while s.owner.is_some() {
            s = self.lock_cv.wait(s).unwrap();
        }
        s.owner = Some(me);
        s.depth = depth;
    }

    fn spawn_clock_thread(&'static self) {
        match &self.clock {
            Clock::Periodic(period) => {
                let period = *period;
                thread::spawn(move || loop {
                    thread::sleep(period);
                    rt_kernel::system::tick();
                });
            }
            Clock::Tickless { tick_period } => {
                let tick_period = *tick_period;
                thread::spawn(move || loop {
                    let deadline = {
                        let mut guard = self.tmr_deadline.lock().unwrap();
                        while guard.is_none() {
                            guard = self.tmr_cv.wait(guard).unwrap();
                        }
                        guard.take().unwrap()
                    };
                    let now = rt_kernel::system::now_tick();
                    let delta = deadline.wrapping_sub(now);
                    if delta > 0 && delta < Tick::MAX / 2 {
                        thread::sleep(tick_period.saturating_mul(delta));
                    }
                    for _ in 0..delta.max(1) {
                        rt_kernel::system::tick();
                    }
                });
            }
        }
    }
}

impl Port for SimPort {
    fn set_lock(&self) {
        let me = thread::current().id();
        let mut s = self.lock_state.lock().unwrap();
        loop {
            match s.owner {
                Some(owner) if owner == me => break,
                None => {
                    s.owner = Some(me);
                    break;
                }
                Some(_) => s = self.lock_cv.wait(s).unwrap(),
            }
        }
        s.depth += 1;
    }

    fn clr_lock(&self) {
        let mut s = self.lock_state.lock().unwrap();
        s.depth -= 1;
        if s.depth == 0 {
            s.owner = None;
            self.lock_cv.notify_all();
        }
    }

    fn is_locked(&self) -> bool {
        self.lock_state.lock().unwrap().depth > 0
    }

    /// Wake the scheduled task's thread if it differs from the one currently
    /// running, without blocking the caller. Soundness here leans on the
    /// woken thread immediately trying to reacquire the kernel lock (see
    /// [`Self::spawn`]): it cannot actually proceed until the caller's own
    /// critical section ends, even though both OS threads are briefly alive
    /// at once.
    fn ctx_switch(&self) {
        let current = rt_kernel::system::current_task();
        let target = rt_kernel::system::scheduled_task();
        if core::ptr::eq(current, target) {
            return;
        }
        self.wake_slot(target.port_scratch.load(Ordering::Acquire));
    }

    /// Hand the virtual CPU to the scheduled task and block the caller until
    /// it is handed back. This is the one `Port` method that genuinely
    /// blocks the calling OS thread — there is no separate "switch stacks"
    /// primitive in a hosted binary, so the switch and the wait for it to
    /// come back are the same operation here.
    fn ctx_switch_now(&self) {
        let current = rt_kernel::system::current_task();
        let target = rt_kernel::system::scheduled_task();
        if core::ptr::eq(current, target) {
            return;
        }
        let current_slot = current.port_scratch.load(Ordering::Acquire);
        let target_slot = target.port_scratch.load(Ordering::Acquire);

        trace!("sim: {} -> {}", current.name, target.name);
        let depth = self.release_virtual_cpu();
        self.wake_slot(target_slot);
        self.slot(current_slot).park();
        self.reacquire_virtual_cpu(depth);
        rt_kernel::system::on_switched_in(current);
        trace!("sim: {} resumed", current.name);
    }

    fn tmr_start(&self, deadline: Tick) {
        *self.tmr_deadline.lock().unwrap() = Some(deadline);
        self.tmr_cv.notify_one();
    }

    fn tmr_stop(&self) {
        *self.tmr_deadline.lock().unwrap() = None;
    }

    fn tmr_force(&self) {
        *self.tmr_deadline.lock().unwrap() = Some(0);
        self.tmr_cv.notify_one();
    }

    /// Nothing to idle into — the thread that calls this is, by definition,
    /// the one currently playing idle, and it is the `ctx_switch_now` dance
    /// above that actually parks it until something else is ready. This
    /// hook only exists so a port-level trace line shows up.
    fn wfi(&self) {
        trace!("sim: idle");
    }
}
