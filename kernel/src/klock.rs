//! Kernel-wide critical-section locking.
//!
//! Every kernel data structure (ready queue, timed-wait queue, per-object
//! waiter lists, mutex ownership) is mutated only while the kernel-wide
//! preemption lock is held — there is no per-object lock, by design (§5 of
//! the design document this crate implements). [`CpuLockCell`] is the cell
//! type that enforces this at compile time: its contents can only be read or
//! written by presenting a [`Cpu`] token, and the only way to obtain one is
//! to actually hold the lock.
//!
//! Built on the same foundation as the reference kernel's `klock.rs`:
//! [`tokenlock::UnsyncTokenLock`] keyed by a singleton
//! [`tokenlock::UnsyncSingletonToken`], rather than a hand-rolled
//! `UnsafeCell`. Unlike the reference kernel, this crate has no `Traits`
//! indirection (see `DESIGN.md`), so there is exactly one keyhole tag for
//! the whole crate instead of one per target configuration, and a fresh
//! token is minted on every cell access — proven sound by the caller
//! presenting a [`Cpu`] token — rather than threading one token value
//! through the whole critical section by mutable reborrow.
use core::marker::PhantomData;

use tokenlock::{SingletonTokenId, UnsyncSingletonToken, UnsyncTokenLock};

use crate::port::port;

/// Tag identifying this crate's single kernel-wide lock keyhole.
struct CpuLockTag(());

/// The key that "unlocks" [`CpuLockCell`].
type Token = UnsyncSingletonToken<CpuLockTag>;

/// The keyhole type for [`UnsyncTokenLock`] that can be "unlocked" by
/// [`Token`].
type Keyhole = SingletonTokenId<CpuLockTag>;

/// Proof that the kernel-wide critical section is currently held.
///
/// `Cpu` is a zero-sized, `!Send`/`!Sync`, borrowed-lifetime token — the only
/// way to obtain one is [`lock`], and it cannot outlive the critical section
/// it was born in.
#[derive(Clone, Copy)]
pub struct Cpu<'a> {
    _marker: PhantomData<&'a mut ()>,
    _not_send_sync: PhantomData<*mut ()>,
}

/// Manufacture the token that unlocks a [`CpuLockCell`].
///
/// Safety: `cpu` proves the kernel-wide critical section is held, which this
/// crate uses in place of tracking one token value for the critical
/// section's entire lifetime — the same substitution the reference kernel
/// makes in `assume_cpu_lock`, which likewise mints a fresh
/// `CpuLockToken::new_unchecked()` on every lock acquisition rather than
/// reusing one.
#[inline]
fn assume_token(_cpu: Cpu<'_>) -> Token {
    // Safety: see above — `_cpu` is the proof.
    unsafe { Token::new_unchecked() }
}

/// A cell that can only be accessed while holding a [`Cpu`] token.
pub struct CpuLockCell<T>(UnsyncTokenLock<T, Keyhole>);

impl<T> CpuLockCell<T> {
    pub const fn new(value: T) -> Self {
        Self(UnsyncTokenLock::new(Keyhole::INIT, value))
    }

    #[inline]
    pub fn get(&self, cpu: Cpu<'_>) -> T
    where
        T: Copy,
    {
        *self.0.read(&assume_token(cpu))
    }

    #[inline]
    pub fn set(&self, cpu: Cpu<'_>, value: T) {
        *self.0.write(&mut assume_token(cpu)) = value;
    }

    #[inline]
    pub fn with<R>(&self, cpu: Cpu<'_>, f: impl FnOnce(&mut T) -> R) -> R {
        f(self.0.write(&mut assume_token(cpu)))
    }

    #[inline]
    pub fn get_ref<'a>(&'a self, cpu: Cpu<'a>) -> &'a T {
        self.0.read(&assume_token(cpu))
    }
}

/// RAII guard for the kernel-wide critical section.
///
/// Dropping the guard releases the lock via [`crate::port::Port::clr_lock`].
/// [`Cpu`] tokens borrowed from it cannot outlive it.
pub struct CpuLockGuard {
    _not_send_sync: PhantomData<*mut ()>,
}

impl CpuLockGuard {
    #[inline]
    pub fn cpu(&mut self) -> Cpu<'_> {
        Cpu {
            _marker: PhantomData,
            _not_send_sync: PhantomData,
        }
    }
}

impl Drop for CpuLockGuard {
    fn drop(&mut self) {
        port().clr_lock();
    }
}

/// Enter the kernel-wide critical section. Nestable: the port is expected to
/// maintain its own nesting counter (see [`crate::port::Port::set_lock`]).
#[inline]
#[must_use]
pub fn lock() -> CpuLockGuard {
    port().set_lock();
    CpuLockGuard {
        _not_send_sync: PhantomData,
    }
}

/// Run `f` with the kernel-wide critical section held.
#[inline]
pub fn with_lock<R>(f: impl FnOnce(Cpu<'_>) -> R) -> R {
    let mut guard = lock();
    f(guard.cpu())
}
