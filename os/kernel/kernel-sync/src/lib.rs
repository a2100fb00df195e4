//! # Kernel synchronization primitives
//!
//! * [`SpinLock`] for short critical sections, with a non-blocking
//!   [`try_lock`](SpinLock::try_lock).
//! * [`SleepLock`] for long-held locks; waiters go to sleep through the
//!   [`Scheduler`].
//! * [`IrqGuard`] masks interrupts on the current [`Cpu`] for a scope;
//!   [`SpinLock::lock_irq`] pairs it with a spin lock.
//! * [`Ticks`] is the timer-driven [`TickSource`].
//! * [`SyncOnceCell`] for write-once globals.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod sched;
mod sleep_lock;
mod spin_lock;
mod sync_once_cell;
mod ticks;

pub use irq::{Cpu, IrqGuard, IrqSpinGuard};
pub use sched::Scheduler;
pub use sleep_lock::{SleepLock, SleepLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
pub use ticks::{TickSource, Ticks};
