//! # Kernel physical memory allocation
//!
//! Hands out 4 KiB physical frames to the rest of the kernel.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Page Allocator                         │
//! │    • one LIFO free list per core                    │
//! │    • stealing from siblings when the local list     │
//! │      runs dry                                       │
//! │    • poison fill on allocate and free               │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Physical Mapper                        │
//! │    • physical-to-virtual translation (HHDM or       │
//! │      identity)                                      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure model
//!
//! Running out of frames is expected and reported as `None`. Freeing a
//! frame that the allocator could never have handed out is a kernel bug and
//! panics.
//!
//! ## Usage
//! ```rust,no_run
//! use kernel_alloc::{DirectMapper, PageAllocator};
//! use kernel_info::memory::PHYS_TOP;
//! use kernel_sync::irq::X86Cpu;
//!
//! static PAGES: PageAllocator<DirectMapper, X86Cpu> =
//!     PageAllocator::new(DirectMapper::hhdm(), X86Cpu);
//!
//! # let kernel_end = 0x40_0000;
//! unsafe { PAGES.init(kernel_end, PHYS_TOP) }.expect("valid memory range");
//! if let Some(frame) = PAGES.allocate() {
//!     unsafe { PAGES.free(frame) };
//! }
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod page_alloc;
pub mod phys_mapper;

pub use page_alloc::{FrameError, FrameRange, PageAllocator, PhysFrame, RangeError};
pub use phys_mapper::{DirectMapper, PhysMapper};
