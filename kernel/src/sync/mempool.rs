//! A fixed-block memory pool (`mem`, §4.8): `N` blocks of `BLOCK` bytes,
//! handed out and returned through a free-index stack rather than a general
//! allocator. `alloc` blocks when the pool is exhausted; `free` hands the
//! block straight to a waiter if one exists.
//!
//! The free-index stack is the only state the kernel lock actually
//! protects; once a block is popped off it, the caller has exclusive access
//! to the bytes behind it until it calls [`free`](Self::free) — the pool
//! never hands the same index out twice while it is outstanding.
use core::cell::UnsafeCell;

use arrayvec::ArrayVec;

use crate::clock::{Tick, IMMEDIATE};
use crate::error::Error;
use crate::klock::CpuLockCell;
use crate::system;
use crate::wait::{self, WaitQueue};

pub struct MemoryPool<const N: usize, const BLOCK: usize> {
    storage: UnsafeCell<[[u8; BLOCK]; N]>,
    free: CpuLockCell<ArrayVec<u16, N>>,
    waiters: WaitQueue,
}

// Safety: `storage` is only ever touched through a block index popped off
// `free`, and the pool never hands the same index out twice concurrently
// (see module docs), so there is never more than one live reference to a
// given block.
unsafe impl<const N: usize, const BLOCK: usize> Sync for MemoryPool<N, BLOCK> {}

impl<const N: usize, const BLOCK: usize> MemoryPool<N, BLOCK> {
    pub const fn new() -> Self {
        Self {
            storage: UnsafeCell::new([[0u8; BLOCK]; N]),
            free: CpuLockCell::new(ArrayVec::new_const()),
            waiters: WaitQueue::new(),
        }
    }

    /// Populate the free list with every block index. Must be called once,
    /// before the first `alloc`.
    pub fn init(&'static self) {
        crate::klock::with_lock(|cpu| {
            self.free.with(cpu, |free| {
                free.clear();
                for i in 0..N as u16 {
                    let _ = free.try_push(i);
                }
            });
        });
    }

    /// Claim a block, blocking for at most `delay` ticks if the pool is
    /// exhausted.
    pub fn alloc(&'static self, delay: Tick) -> Result<&'static mut [u8; BLOCK], Error> {
        let deadline = system::Deadline::new(delay);
        loop {
            let me;
            let remaining;
            {
                let mut guard = crate::klock::lock();
                let cpu = guard.cpu();
                if let Some(idx) = self.free.with(cpu, |free| free.pop()) {
                    return Ok(self.block_mut(idx));
                }
                remaining = deadline.remaining(cpu);
                if remaining == IMMEDIATE {
                    return Err(Error::Timeout);
                }
                me = system::current(cpu);
            }
            wait::wait_for(me, Some(&self.waiters), remaining).into_result()?;
        }
    }

    /// Return a block obtained from [`alloc`](Self::alloc).
    pub fn free(&'static self, block: &'static mut [u8; BLOCK]) {
        let idx = self.index_of(block);
        let mut guard = crate::klock::lock();
        let cpu = guard.cpu();
        self.free.with(cpu, |free| {
            let _ = free.try_push(idx);
        });
        // The freed index is already on the list by the time the highest-
        // priority waiter (if any) is put back on the ready queue, so its
        // `alloc` retry finds it there.
        wait::wakeup_one(cpu, &self.waiters, crate::error::Event::Success);
    }

    fn block_mut(&'static self, idx: u16) -> &'static mut [u8; BLOCK] {
        // Safety: see the `Sync` impl's justification above.
        unsafe { &mut (*self.storage.get())[idx as usize] }
    }

    fn index_of(&'static self, block: &mut [u8; BLOCK]) -> u16 {
        let base = self.storage.get() as usize;
        let addr = block as *mut [u8; BLOCK] as usize;
        ((addr - base) / core::mem::size_of::<[u8; BLOCK]>()) as u16
    }

    /// Reset: wake every current waiter with [`Error::Stopped`]. Does not
    /// reclaim blocks still outstanding from a prior `alloc` — there is no
    /// way to know they are safe to hand out again.
    pub fn reset(&'static self) {
        crate::klock::with_lock(|cpu| {
            wait::wakeup_all(cpu, &self.waiters, crate::error::Event::Stopped);
        });
    }

    /// Destroy: wake every current waiter with [`Error::Deleted`].
    pub fn destroy(&'static self) {
        crate::klock::with_lock(|cpu| {
            wait::wakeup_all(cpu, &self.waiters, crate::error::Event::Deleted);
        });
    }
}
