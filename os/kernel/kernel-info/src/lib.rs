//! # Kernel Configuration
//!
//! Compile-time constants shared by the memory and storage subsystems. This
//! crate is the single source of truth for page geometry, the managed physical
//! memory range, the number of cores and the shape of the block cache.
//!
//! ## Modules
//!
//! ### Memory Layout ([`memory`])
//! * **Page Geometry**: frame size and alignment
//! * **Physical Range**: where RAM managed by the page allocator ends
//! * **Direct Map**: the fixed offset at which physical memory is visible
//! * **Poison Bytes**: fill patterns written on allocate and free
//!
//! ### Processors ([`cpu`])
//! * **Core Count**: upper bound on the number of cores, one free list each
//!
//! ### Block Cache ([`bio`])
//! * **Block Size**: bytes per cached device block
//! * **Pool Shape**: number of cache slots and hash buckets
//!
//! ```text
//! Physical Memory Layout:
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory (< 1MiB)         │
//! PHYS_LOAD   ├─────────────────────────────────┤ 0x0010_0000 (1 MiB)
//!             │       Kernel Image              │
//!             │   (Text, Data, BSS)             │
//!  kernel end ├─────────────────────────────────┤
//!             │    Page Allocator Pool          │
//!             │  (4 KiB frames, per-core lists) │
//! PHYS_TOP    └─────────────────────────────────┘ 0x0800_0000 (128 MiB)
//! ```
//!
//! All values are `const` and validated by compile-time assertions, so an
//! inconsistent configuration fails the build instead of the boot.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod bio;
pub mod cpu;
pub mod memory;
