//! # Kernel synchronization primitives
//!
//! A single primitive lives here: [`SpinLock`], a test-and-test-and-set lock
//! for short, non-blocking critical sections. On top of plain mutual exclusion
//! it carries a sticky *halt latch*: once a holder decides the protected state
//! can no longer be trusted, it latches the lock and every later acquisition
//! fails with [`Halted`] instead of handing out the corrupted value.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{Halted, SpinLock, SpinLockGuard, TryLockError};
