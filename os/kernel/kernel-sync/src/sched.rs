//! Scheduler hooks needed by blocking locks.

use crate::SpinLockGuard;

/// The parts of the process scheduler that blocking primitives rely on.
///
/// A *channel* is an arbitrary address-sized token; sleepers on a channel are
/// woken by a [`wakeup`](Scheduler::wakeup) on the same token. Callers always
/// re-check their condition after waking, so an implementation may wake
/// spuriously.
pub trait Scheduler {
    /// Identifier of the running execution context.
    ///
    /// Must be unique among all contexts alive at the same time.
    fn current(&self) -> usize;

    /// Suspends the caller on `chan`.
    ///
    /// `guard` protects the condition the caller waits for. The
    /// implementation must register the caller as asleep on `chan` before
    /// releasing it, so a wake-up issued under that lock cannot be lost.
    /// Returns with the same lock held again.
    fn sleep<'a, T>(&self, chan: usize, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T>;

    /// Makes every context sleeping on `chan` runnable.
    fn wakeup(&self, chan: usize);
}
