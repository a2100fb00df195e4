//! # Kernel block cache
//!
//! Keeps recently used device blocks in memory so that the file system
//! reads each block from disk at most once while it stays hot, and so that
//! concurrent users of the same block share one copy.
//!
//! ```text
//!  file system
//!      │ read / write / release / pin / unpin
//! ┌────▼──────────────────────────────┐
//! │ BufferCache                        │
//! │  buckets (spin locks, metadata)    │
//! │  slots   (sleep locks, bytes)      │
//! └────┬──────────────────────────────┘
//!      │ BlockDevice::read / write
//!  disk driver / RamDisk
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use kernel_bio::{BufferCache, RamDisk};
//! # use kernel_sync::{Cpu, Scheduler, SpinLockGuard, Ticks};
//! # #[derive(Clone, Copy)]
//! # struct OneCore;
//! # impl Cpu for OneCore {
//! #     fn id(&self) -> usize { 0 }
//! #     fn interrupts_enabled(&self) -> bool { false }
//! #     fn disable_interrupts(&self) {}
//! #     fn enable_interrupts(&self) {}
//! # }
//! # struct OneTask;
//! # impl Scheduler for OneTask {
//! #     fn current(&self) -> usize { 1 }
//! #     fn sleep<'a, T>(&self, _: usize, g: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> { g }
//! #     fn wakeup(&self, _: usize) {}
//! # }
//!
//! let cache: BufferCache<_, _, _, _, 4, 2> =
//!     BufferCache::new(RamDisk::<8>::new(1), OneCore, OneTask, Ticks::new(OneCore));
//!
//! let mut buf = cache.read(1, 3);
//! buf[0] = 0xaa;
//! buf.write();
//! buf.release();
//!
//! assert_eq!(cache.read(1, 3)[0], 0xaa);
//! assert_eq!(cache.device().reads(), 1);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod bucket;
mod cache;
mod device;
mod ramdisk;

pub use cache::{Buf, BufferCache};
pub use device::{BlockDevice, BlockId};
pub use ramdisk::RamDisk;
