//! # Kernel synchronization primitives
//!
//! A lock is split into a *raw* part that only knows how to acquire and
//! release ([`RawLock`] / [`RawUnlock`]) and a data-owning [`Mutex`] that hands
//! out RAII guards. [`SpinMutex`] is the busy-waiting flavor used at the
//! lowest layers of the kernel (physical memory manager, early boot), where
//! nothing may sleep.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod mutex;
mod raw_spin;

pub use mutex::{Mutex, MutexGuard};
pub use raw_spin::RawSpin;

pub type SpinMutex<T> = Mutex<T, RawSpin>;

impl<T> SpinMutex<T> {
    /// Creates an unlocked spin mutex; usable in `static` initializers.
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSpin::new(), value)
    }
}

pub trait RawLock {
    fn raw_lock(&self);
    fn raw_try_lock(&self) -> bool;

    /// Snapshot of the lock state; only meaningful for assertions.
    fn raw_is_locked(&self) -> bool;
}

pub trait RawUnlock {
    /// # Safety
    /// The caller must hold the lock.
    unsafe fn raw_unlock(&self);
}
