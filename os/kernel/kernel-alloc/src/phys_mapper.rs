//! # Physical-to-virtual access
//!
//! The page allocator writes poison bytes into the frames it manages, which
//! requires turning a physical address into something the CPU can
//! dereference. How that works differs between the kernel (higher-half
//! direct map), early boot (identity map) and host tests (the "physical"
//! address is a host pointer), so the strategy is abstracted here.

use kernel_info::memory::HHDM_BASE;

/// Converts physical addresses into references in the current address space.
pub trait PhysMapper {
    /// Returns a mutable reference to the `T` stored at physical address `pa`.
    ///
    /// # Safety
    /// - `pa` must be mapped, writable and suitably aligned for `T`.
    /// - The caller must guarantee exclusive access for the lifetime `'a`.
    unsafe fn phys_to_mut<'a, T>(&self, pa: u64) -> &'a mut T;
}

/// [`PhysMapper`] for mappings where physical memory appears at a fixed offset.
///
/// Covers both the kernel's higher-half direct map and plain identity
/// mapping (offset zero).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DirectMapper {
    offset: u64,
}

impl DirectMapper {
    /// Physical memory visible at `offset + pa`.
    #[must_use]
    pub const fn with_offset(offset: u64) -> Self {
        Self { offset }
    }

    /// Physical addresses are virtual addresses.
    #[must_use]
    pub const fn identity() -> Self {
        Self::with_offset(0)
    }

    /// The kernel's higher-half direct map at [`HHDM_BASE`].
    #[must_use]
    pub const fn hhdm() -> Self {
        Self::with_offset(HHDM_BASE)
    }

    #[inline]
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }
}

impl PhysMapper for DirectMapper {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn phys_to_mut<'a, T>(&self, pa: u64) -> &'a mut T {
        let va = core::ptr::with_exposed_provenance_mut::<T>(self.offset.wrapping_add(pa) as usize);
        // SAFETY: Caller must ensure the physical address is valid and mapped at `offset`.
        unsafe { &mut *va }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_points_at_the_same_memory() {
        let mut word = 0_u64;
        let pa = core::ptr::from_mut(&mut word).expose_provenance() as u64;
        let r: &mut u64 = unsafe { DirectMapper::identity().phys_to_mut(pa) };
        *r = 0xdead_beef;
        assert_eq!(word, 0xdead_beef);
    }

    #[test]
    fn hhdm_uses_configured_base() {
        assert_eq!(DirectMapper::hhdm().offset(), HHDM_BASE);
    }
}
