use crate::{Scheduler, SpinLock};
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
};

/// Long-term lock whose waiters sleep instead of spinning.
///
/// Suitable for holding across device I/O. The holder is recorded as the
/// [`Scheduler::current`] context so ownership can be checked with
/// [`holding`](Self::holding).
pub struct SleepLock<T> {
    /// Context id of the holder, if any.
    holder: SpinLock<Option<usize>>,
    inner: UnsafeCell<T>,
}

// Safety: access to `inner` is serialized through `holder`.
unsafe impl<T: Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    #[must_use]
    pub const fn new(inner: T) -> Self {
        Self {
            holder: SpinLock::new(None),
            inner: UnsafeCell::new(inner),
        }
    }

    /// Acquires the lock, sleeping on contention.
    #[must_use]
    pub fn lock<'a, S: Scheduler>(&'a self, sched: &'a S) -> SleepLockGuard<'a, T, S> {
        let mut holder = self.holder.lock();
        while holder.is_some() {
            holder = sched.sleep(self.channel(), holder);
        }
        *holder = Some(sched.current());
        SleepLockGuard { lock: self, sched }
    }

    /// Whether the calling context holds the lock.
    #[must_use]
    pub fn holding<S: Scheduler>(&self, sched: &S) -> bool {
        *self.holder.lock() == Some(sched.current())
    }

    #[inline]
    fn channel(&self) -> usize {
        core::ptr::from_ref(self).addr()
    }
}

pub struct SleepLockGuard<'a, T, S: Scheduler> {
    lock: &'a SleepLock<T>,
    sched: &'a S,
}

impl<T, S: Scheduler> Deref for SleepLockGuard<'_, T, S> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T, S: Scheduler> DerefMut for SleepLockGuard<'_, T, S> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T, S: Scheduler> Drop for SleepLockGuard<'_, T, S> {
    fn drop(&mut self) {
        let mut holder = self.lock.holder.lock();
        *holder = None;
        // Wake under the spin lock so a sleeper cannot miss it.
        self.sched.wakeup(self.lock.channel());
    }
}
