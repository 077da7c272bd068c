use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// The lock was latched by an earlier holder; the protected value is off limits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("lock is halted")]
pub struct Halted;

/// Why [`SpinLock::try_lock`] did not hand out a guard.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TryLockError {
    #[error("lock is currently held")]
    WouldBlock,
    #[error(transparent)]
    Halted(#[from] Halted),
}

/// A TATAS spin lock with a sticky halt latch.
///
/// Acquisition through [`lock`](Self::lock), [`try_lock`](Self::try_lock) and
/// [`with_lock`](Self::with_lock) fails once [`halt`](Self::halt) (or
/// [`SpinLockGuard::halt`]) was called. [`inspect`](Self::inspect) still
/// grants shared access so the latched state can be examined.
pub struct SpinLock<T> {
    /// lock state
    /// * `false`: unlocked
    /// * `true`: locked
    locked: AtomicBool,
    /// Set once, never cleared.
    halted: AtomicBool,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    /// Latch the lock. Guards already handed out stay valid until dropped.
    #[inline]
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Try once; returns immediately.
    ///
    /// # Errors
    /// [`TryLockError::WouldBlock`] while another guard is alive,
    /// [`TryLockError::Halted`] once the lock was latched.
    #[inline]
    pub fn try_lock(&self) -> Result<SpinLockGuard<'_, T>, TryLockError> {
        if self.is_halted() {
            return Err(TryLockError::Halted(Halted));
        }
        if !self.try_acquire() {
            return Err(TryLockError::WouldBlock);
        }
        let guard = SpinLockGuard { lock: self };
        if self.is_halted() {
            // Latched while we raced for it; dropping releases again.
            return Err(TryLockError::Halted(Halted));
        }
        Ok(guard)
    }

    /// Spin until acquired (TATAS), then return a guard.
    ///
    /// # Errors
    /// [`Halted`] if the lock was latched before or while waiting.
    #[inline]
    pub fn lock(&self) -> Result<SpinLockGuard<'_, T>, Halted> {
        if self.is_halted() {
            return Err(Halted);
        }
        self.acquire();
        let guard = SpinLockGuard { lock: self };
        if self.is_halted() {
            return Err(Halted);
        }
        Ok(guard)
    }

    /// Closure convenience, built on the guard.
    ///
    /// # Errors
    /// [`Halted`] if the lock was latched; `f` is not called in that case.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, Halted> {
        let mut g = self.lock()?;
        Ok(f(&mut g))
    }

    /// Shared access that ignores the halt latch, still mutually exclusive
    /// with every guard.
    #[inline]
    pub fn inspect<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.acquire();
        let g = SpinLockGuard { lock: self };
        f(&g)
    }

    /// Mutable access when you have `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn acquire(&self) {
        // Fast path: take the lock if it looks free.
        if self.try_acquire() {
            return;
        }
        // Contended path: spin on a read, then retry CAS.
        loop {
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
            if self.try_acquire() {
                return;
            }
        }
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> SpinLockGuard<'_, T> {
    /// Latch the lock from inside the critical section.
    ///
    /// The current guard keeps working; the next acquisition fails.
    #[inline]
    pub fn halt(&self) {
        self.lock.halt();
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // Release publishes the critical section.
        self.lock.locked.store(false, Ordering::Release);
    }
}
