//! Per-core identity and interrupt suppression.

use crate::{SpinLock, SpinLockGuard};
use core::ops::{Deref, DerefMut};

/// The current processor, as seen by per-core data structures.
///
/// Code that indexes per-core state by [`id`](Cpu::id) must keep
/// interrupts disabled for as long as it uses the result, otherwise it
/// may be migrated to another core halfway through.
pub trait Cpu {
    /// Index of the executing core, in `0..NCPU`.
    fn id(&self) -> usize;

    /// Whether interrupts are currently enabled on this core.
    fn interrupts_enabled(&self) -> bool;

    /// Masks interrupts on this core.
    fn disable_interrupts(&self);

    /// Unmasks interrupts on this core.
    fn enable_interrupts(&self);
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// The guard snapshots the interrupt state first. If interrupts were enabled
/// they are masked, and on drop they are re-enabled **only** in that case,
/// so guards nest and preserve the original state.
///
/// # Examples
///
/// ```
/// use kernel_sync::{Cpu, IrqGuard};
/// use std::cell::Cell;
///
/// struct Single(Cell<bool>);
///
/// impl Cpu for Single {
///     fn id(&self) -> usize { 0 }
///     fn interrupts_enabled(&self) -> bool { self.0.get() }
///     fn disable_interrupts(&self) { self.0.set(false) }
///     fn enable_interrupts(&self) { self.0.set(true) }
/// }
///
/// let cpu = Single(Cell::new(true));
/// {
///     let _outer = IrqGuard::new(&cpu);
///     {
///         let _inner = IrqGuard::new(&cpu);
///     }
///     assert!(!cpu.interrupts_enabled());
/// }
/// assert!(cpu.interrupts_enabled());
/// ```
pub struct IrqGuard<'a, C: Cpu + ?Sized> {
    cpu: &'a C,
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl<'a, C: Cpu + ?Sized> IrqGuard<'a, C> {
    #[inline]
    #[must_use]
    pub fn new(cpu: &'a C) -> Self {
        let enabled = cpu.interrupts_enabled();
        if enabled {
            cpu.disable_interrupts();
        }
        Self {
            cpu,
            were_enabled: enabled,
        }
    }

    /// Core id, stable for the lifetime of the guard.
    #[inline]
    #[must_use]
    pub fn cpu_id(&self) -> usize {
        self.cpu.id()
    }
}

impl<C: Cpu + ?Sized> Drop for IrqGuard<'_, C> {
    fn drop(&mut self) {
        if self.were_enabled {
            self.cpu.enable_interrupts();
        }
    }
}

/// A [`SpinLock`] guard taken with interrupts masked on the current core.
///
/// Dropping it releases the lock first and then restores the interrupt
/// state, so an interrupt handler on this core can never find the lock
/// held by the code it interrupted.
pub struct IrqSpinGuard<'a, T, C: Cpu + ?Sized> {
    guard: SpinLockGuard<'a, T>,
    _irq: IrqGuard<'a, C>,
}

impl<T> SpinLock<T> {
    /// Masks interrupts on `cpu`, then spins until the lock is acquired.
    ///
    /// Use this for every lock an interrupt handler may also take.
    #[inline]
    #[must_use]
    pub fn lock_irq<'a, C: Cpu + ?Sized>(&'a self, cpu: &'a C) -> IrqSpinGuard<'a, T, C> {
        let irq = IrqGuard::new(cpu);
        IrqSpinGuard {
            guard: self.lock(),
            _irq: irq,
        }
    }

    /// Like [`lock_irq`](Self::lock_irq) but tries once. On failure the
    /// interrupt state is restored before returning.
    #[inline]
    #[must_use]
    pub fn try_lock_irq<'a, C: Cpu + ?Sized>(&'a self, cpu: &'a C) -> Option<IrqSpinGuard<'a, T, C>> {
        let irq = IrqGuard::new(cpu);
        let guard = self.try_lock()?;
        Some(IrqSpinGuard { guard, _irq: irq })
    }
}

impl<T, C: Cpu + ?Sized> Deref for IrqSpinGuard<'_, T, C> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, C: Cpu + ?Sized> DerefMut for IrqSpinGuard<'_, T, C> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(target_arch = "x86_64")]
pub use x86::X86Cpu;

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::Cpu;

    /// [`Cpu`] backed by the executing x86-64 core.
    ///
    /// # Privilege
    ///
    /// Uses `cli`/`sti` and therefore must only be used at CPL0.
    #[derive(Debug, Default, Copy, Clone)]
    pub struct X86Cpu;

    const RFLAGS_IF: u64 = 1 << 9;

    impl Cpu for X86Cpu {
        /// Initial APIC id from `CPUID.01H:EBX[31:24]`.
        #[inline]
        fn id(&self) -> usize {
            let ebx: u32;
            unsafe {
                core::arch::asm!(
                    "push rbx",
                    "cpuid",
                    "mov {ebx_out:e}, ebx",
                    "pop rbx",
                    ebx_out = lateout(reg) ebx,
                    inlateout("eax") 1u32 => _,
                    inlateout("ecx") 0u32 => _,
                    lateout("edx") _,
                    options(nomem, preserves_flags),
                );
            }
            (ebx >> 24) as usize
        }

        #[inline]
        fn interrupts_enabled(&self) -> bool {
            let r: u64;
            unsafe {
                core::arch::asm!("pushfq; pop {}", out(reg) r, options(nomem, preserves_flags));
            }
            r & RFLAGS_IF != 0
        }

        #[inline]
        fn disable_interrupts(&self) {
            unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
        }

        #[inline]
        fn enable_interrupts(&self) {
            unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Flag(Cell<bool>);

    impl Cpu for Flag {
        fn id(&self) -> usize {
            0
        }
        fn interrupts_enabled(&self) -> bool {
            self.0.get()
        }
        fn disable_interrupts(&self) {
            self.0.set(false);
        }
        fn enable_interrupts(&self) {
            self.0.set(true);
        }
    }

    #[test]
    fn lock_irq_masks_until_released() {
        let cpu = Flag(Cell::new(true));
        let lock = SpinLock::new(0_u32);
        {
            let mut g = lock.lock_irq(&cpu);
            *g += 1;
            assert!(!cpu.interrupts_enabled());
            assert!(lock.is_locked());
        }
        assert!(cpu.interrupts_enabled());
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn failed_try_lock_irq_restores_interrupts() {
        let cpu = Flag(Cell::new(true));
        let lock = SpinLock::new(());
        let held = lock.lock();
        assert!(lock.try_lock_irq(&cpu).is_none());
        assert!(cpu.interrupts_enabled());
        drop(held);

        let g = lock.try_lock_irq(&cpu);
        assert!(g.is_some());
        assert!(!cpu.interrupts_enabled());
    }

    #[test]
    fn already_masked_stays_masked() {
        let cpu = Flag::default();
        let lock = SpinLock::new(());
        drop(lock.lock_irq(&cpu));
        assert!(!cpu.interrupts_enabled());
    }
}
