//! # Physical Memory Layout
//!
//! Constants describing the RAM handed to the page allocator and how the
//! kernel reaches it.

/// Size of one physical page frame in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Where the kernel image is placed in *physical* memory.
///
/// The page allocator manages everything between the end of the image
/// and [`PHYS_TOP`].
pub const PHYS_LOAD: u64 = 0x0010_0000; // 1 MiB

/// First physical address past the RAM managed by the page allocator.
pub const PHYS_TOP: u64 = 0x0800_0000; // 128 MiB

/// Number of frames below [`PHYS_TOP`]; sizes the allocator's link table.
#[allow(clippy::cast_possible_truncation)]
pub const MAX_FRAMES: usize = (PHYS_TOP / PAGE_SIZE) as usize;

/// Byte written over a frame when it is returned to the allocator.
pub const FREE_FILL: u8 = 1;

/// Byte written over a frame when it is handed out.
pub const ALLOC_FILL: u8 = 5;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(PHYS_LOAD.is_multiple_of(PAGE_SIZE));
    assert!(PHYS_TOP.is_multiple_of(PAGE_SIZE));
    assert!(PHYS_TOP > PHYS_LOAD);
    // Frame indices are stored as u32 with u32::MAX reserved.
    assert!(MAX_FRAMES < u32::MAX as usize);
    assert!(FREE_FILL != ALLOC_FILL);
};
