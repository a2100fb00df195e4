//! Timer tick counter.

use crate::{Cpu, SpinLock};

/// A monotonically non-decreasing clock.
pub trait TickSource {
    /// Current tick count.
    fn now(&self) -> u64;
}

impl<T: TickSource + ?Sized> TickSource for &T {
    #[inline]
    fn now(&self) -> u64 {
        (**self).now()
    }
}

/// Tick counter advanced by the timer interrupt.
///
/// Reads and increments both go through one spin lock taken with interrupts
/// masked, so a reader never observes the counter moving backwards and the
/// timer handler never spins on a lock held by the code it interrupted.
pub struct Ticks<C> {
    cpu: C,
    count: SpinLock<u64>,
}

impl<C: Cpu> Ticks<C> {
    #[must_use]
    pub const fn new(cpu: C) -> Self {
        Self {
            cpu,
            count: SpinLock::new(0),
        }
    }

    /// Advances the clock by one tick. Called from the timer interrupt.
    #[inline]
    pub fn tick(&self) {
        let mut count = self.count.lock_irq(&self.cpu);
        *count = count.wrapping_add(1);
    }
}

impl<C: Cpu> TickSource for Ticks<C> {
    #[inline]
    fn now(&self) -> u64 {
        *self.count.lock_irq(&self.cpu)
    }
}
