//! Locking primitives that do not poison.
//!
//! [`std::sync::Mutex`] poisons itself when a thread panics while holding the lock. A panicking
//! unit must not take every other unit sharing the queue down with it, so these wrappers recover
//! the guard from the poison error. The queue's `VecDeque` is never left half-updated across a
//! panic point.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync,
    time::Duration,
};

#[derive(Default)]
pub struct Mutex<T: ?Sized> {
    inner: sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub const fn new(t: T) -> Mutex<T> {
        Self {
            inner: sync::Mutex::new(t),
        }
    }
}

impl<T: ?Sized> Mutex<T> {
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };

        MutexGuard { inner: guard }
    }

    /// Returns `None` instead of blocking when another thread holds the lock.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(sync::TryLockError::Poisoned(poison)) => poison.into_inner(),
            Err(sync::TryLockError::WouldBlock) => return None,
        };

        Some(MutexGuard { inner: guard })
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Mutex");
        match self.try_lock() {
            Some(val) => s.field("data", &&*val),
            None => s.field("data", &"<locked>"),
        }
        .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct MutexGuard<'a, T: ?Sized + 'a> {
    inner: sync::MutexGuard<'a, T>,
}

impl<'a, T: ?Sized + 'a> Deref for MutexGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'a, T: ?Sized + 'a> DerefMut for MutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[derive(Debug, Default)]
pub struct Condvar {
    inner: sync::Condvar,
}

impl Condvar {
    pub const fn new() -> Condvar {
        Self {
            inner: sync::Condvar::new(),
        }
    }

    /// Waits while `condition` holds, for at most `dur` in total.
    ///
    /// Spurious wakeups re-check `condition` but do not restart the timer.
    pub fn wait_timeout_while<'a, T, F>(
        &self,
        guard: MutexGuard<'a, T>,
        dur: Duration,
        condition: F,
    ) -> (MutexGuard<'a, T>, sync::WaitTimeoutResult)
    where
        F: FnMut(&mut T) -> bool,
    {
        let (guard, timeout) = match self.inner.wait_timeout_while(guard.inner, dur, condition) {
            Ok(out) => out,
            Err(poison) => poison.into_inner(),
        };
        (MutexGuard { inner: guard }, timeout)
    }

    pub fn notify_one(&self) {
        self.inner.notify_one();
    }
}
