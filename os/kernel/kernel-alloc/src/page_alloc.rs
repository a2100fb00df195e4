//! # Per-core physical page allocator
//!
//! Every core owns a LIFO free list behind its own [`SpinLock`]. Frees always
//! go to the list of the core that executes them; allocations pop from the
//! local list first and only touch sibling lists when the local one is empty.
//! Cores that allocate and free at a similar rate therefore never contend.
//!
//! ```text
//!  core 0          core 1          core 2
//! ┌───────┐       ┌───────┐       ┌───────┐
//! │ head ─┼─► 17  │ head ─┼─► 4   │ head  │ (empty: steals from 0, then 1)
//! └───────┘   │   └───────┘   │   └───────┘
//!             ▼               ▼
//! links:     [.., 17 → 9, .., 4 → NIL, .., 9 → NIL, ..]
//! ```
//!
//! List links live in a separate table indexed by frame number instead of
//! inside the free frames, so freed memory is never reinterpreted as list
//! nodes. A link slot is only touched under the lock of the list that
//! currently holds the frame.

use crate::phys_mapper::PhysMapper;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};
use kernel_info::cpu::NCPU;
use kernel_info::memory::{ALLOC_FILL, FREE_FILL, MAX_FRAMES, PAGE_SIZE};
use kernel_sync::{Cpu, IrqGuard, SpinLock, SyncOnceCell};
use log::{debug, error, info};

#[allow(clippy::cast_possible_truncation)]
const PAGE_BYTES: usize = PAGE_SIZE as usize;

/// End-of-list marker in the link table.
const NIL: u32 = u32::MAX;

/// A 4 KiB physical page frame, identified by its start address.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysFrame(u64);

impl PhysFrame {
    /// Wraps a physical address. No alignment check happens here;
    /// [`PageAllocator::free`] rejects misaligned frames.
    #[inline]
    #[must_use]
    pub const fn new(start: u64) -> Self {
        Self(start)
    }

    #[inline]
    #[must_use]
    pub const fn start(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned(self) -> bool {
        self.0.is_multiple_of(PAGE_SIZE)
    }
}

impl fmt::Debug for PhysFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysFrame({:#x})", self.0)
    }
}

/// Physical memory handed to the allocator at initialization.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameRange {
    /// End of the kernel image; nothing below it may be freed.
    pub kernel_end: u64,
    /// First managed frame, `kernel_end` rounded up to a page boundary.
    pub start: u64,
    /// Exclusive upper bound of managed memory.
    pub top: u64,
}

impl FrameRange {
    /// Number of frames between `start` and `top`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn frames(&self) -> usize {
        ((self.top - self.start) / PAGE_SIZE) as usize
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn index_of(&self, frame: PhysFrame) -> u32 {
        ((frame.start() - self.start) / PAGE_SIZE) as u32
    }

    fn frame_at(&self, index: u32) -> PhysFrame {
        PhysFrame::new(self.start + u64::from(index) * PAGE_SIZE)
    }

    fn check(&self, frame: PhysFrame) -> Result<(), FrameError> {
        if !frame.is_aligned() {
            return Err(FrameError::Misaligned(frame.start()));
        }
        if frame.start() < self.kernel_end {
            return Err(FrameError::BelowKernelEnd {
                addr: frame.start(),
                kernel_end: self.kernel_end,
            });
        }
        if frame.start() >= self.top {
            return Err(FrameError::AboveMemoryTop {
                addr: frame.start(),
                top: self.top,
            });
        }
        Ok(())
    }
}

/// Invalid allocator configuration passed to [`PageAllocator::init`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("memory top {0:#x} is not page aligned")]
    UnalignedTop(u64),
    #[error("no whole frame between kernel end {kernel_end:#x} and memory top {top:#x}")]
    Empty { kernel_end: u64, top: u64 },
    #[error("{frames} frames exceed the link table capacity of {capacity}")]
    TooManyFrames { frames: usize, capacity: usize },
    #[error("page allocator already initialized")]
    AlreadyInitialized,
}

/// A frame that must never be handed back to the allocator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("{0:#x} is not page aligned")]
    Misaligned(u64),
    #[error("{addr:#x} lies below the kernel end {kernel_end:#x}")]
    BelowKernelEnd { addr: u64, kernel_end: u64 },
    #[error("{addr:#x} lies at or above the memory top {top:#x}")]
    AboveMemoryTop { addr: u64, top: u64 },
    #[error("page allocator not initialized")]
    Uninitialized,
}

/// One core's free list; the links live in the allocator's link table.
struct FreeList {
    head: u32,
    len: usize,
}

impl FreeList {
    const EMPTY: Self = Self { head: NIL, len: 0 };

    fn push(&mut self, index: u32, links: &[AtomicU32]) {
        links[index as usize].store(self.head, Ordering::Relaxed);
        self.head = index;
        self.len += 1;
    }

    fn pop(&mut self, links: &[AtomicU32]) -> Option<u32> {
        if self.head == NIL {
            return None;
        }
        let index = self.head;
        self.head = links[index as usize].swap(NIL, Ordering::Relaxed);
        self.len -= 1;
        Some(index)
    }
}

/// Physical page allocator with one free list per core.
///
/// * `M` maps frames so they can be filled with poison bytes.
/// * `C` reports the executing core and masks its interrupts.
/// * `NCPU_MAX` bounds the core ids `C` may report.
/// * `NFRAMES` is the capacity of the link table and bounds the managed range.
pub struct PageAllocator<M, C, const NCPU_MAX: usize = NCPU, const NFRAMES: usize = MAX_FRAMES> {
    mapper: M,
    cpu: C,
    range: SyncOnceCell<FrameRange>,
    lists: [SpinLock<FreeList>; NCPU_MAX],
    links: [AtomicU32; NFRAMES],
}

impl<M, C, const NCPU_MAX: usize, const NFRAMES: usize> PageAllocator<M, C, NCPU_MAX, NFRAMES>
where
    M: PhysMapper,
    C: Cpu,
{
    const _NONEMPTY: () = assert!(NCPU_MAX > 0 && NFRAMES > 0);

    /// Creates an allocator with no memory; call [`init`](Self::init) next.
    #[must_use]
    pub const fn new(mapper: M, cpu: C) -> Self {
        let () = Self::_NONEMPTY;
        Self {
            mapper,
            cpu,
            range: SyncOnceCell::new(),
            lists: [const { SpinLock::new(FreeList::EMPTY) }; NCPU_MAX],
            links: [const { AtomicU32::new(NIL) }; NFRAMES],
        }
    }

    /// Hands `[kernel_end, top)` to the allocator and returns the number of
    /// frames made available.
    ///
    /// Every whole frame in the range is freed onto the list of the calling
    /// core; other cores obtain their first frames by stealing.
    ///
    /// # Errors
    /// See [`RangeError`]. Nothing is freed when an error is returned.
    ///
    /// # Safety
    /// The range must be unused RAM, reachable through the mapper, and owned
    /// exclusively by this allocator from now on.
    pub unsafe fn init(&self, kernel_end: u64, top: u64) -> Result<usize, RangeError> {
        if !top.is_multiple_of(PAGE_SIZE) {
            return Err(RangeError::UnalignedTop(top));
        }
        let start = kernel_end.next_multiple_of(PAGE_SIZE);
        if start >= top {
            return Err(RangeError::Empty { kernel_end, top });
        }
        let range = FrameRange {
            kernel_end,
            start,
            top,
        };
        let frames = range.frames();
        if frames > NFRAMES {
            return Err(RangeError::TooManyFrames {
                frames,
                capacity: NFRAMES,
            });
        }
        let range = *self
            .range
            .set(range)
            .map_err(|_| RangeError::AlreadyInitialized)?;

        for start in (range.start..range.top).step_by(PAGE_BYTES) {
            // SAFETY: the caller hands the whole range over to us.
            unsafe { self.free(PhysFrame::new(start)) };
        }

        info!(
            "page allocator: {frames} frames in [{:#x}, {:#x}) on core {}",
            range.start,
            range.top,
            self.cpu.id()
        );
        Ok(frames)
    }

    /// The managed range, once initialized.
    #[inline]
    #[must_use]
    pub fn range(&self) -> Option<&FrameRange> {
        self.range.get()
    }

    /// Allocates one frame, filled with [`ALLOC_FILL`].
    ///
    /// Pops from the calling core's list, or steals from the first sibling
    /// (in core order) that has a free frame. Returns `None` once every list
    /// is empty.
    ///
    /// # Panics
    /// If the core id reported by `C` is out of range.
    #[must_use]
    pub fn allocate(&self) -> Option<PhysFrame> {
        let range = self.range.get()?;

        let frame = {
            let irq = IrqGuard::new(&self.cpu);
            let core = Self::core_index(irq.cpu_id());
            let local = self.lists[core].with_lock(|l| l.pop(&self.links));
            local.or_else(|| self.steal(core))
        }
        .map(|index| range.frame_at(index))?;

        // SAFETY: the frame came off a free list, so it is managed and unused.
        let page: &mut [u8; PAGE_BYTES] = unsafe { self.mapper.phys_to_mut(frame.start()) };
        page.fill(ALLOC_FILL);
        Some(frame)
    }

    /// Returns `frame` to the calling core's list after filling it with
    /// [`FREE_FILL`].
    ///
    /// # Panics
    /// If the frame is misaligned, below the kernel end, at or above the
    /// memory top, or the allocator was never initialized. These are kernel
    /// bugs and halt the system.
    ///
    /// # Safety
    /// `frame` must have been obtained from this allocator (or be part of the
    /// initial range) and must not be used after this call.
    pub unsafe fn free(&self, frame: PhysFrame) {
        let range = match self.range.get().ok_or(FrameError::Uninitialized) {
            Ok(range) => range,
            Err(err) => Self::reject(err),
        };
        if let Err(err) = range.check(frame) {
            Self::reject(err);
        }

        // Fill with junk to catch dangling refs.
        // SAFETY: the caller gives up the frame; it lies in the managed range.
        let page: &mut [u8; PAGE_BYTES] = unsafe { self.mapper.phys_to_mut(frame.start()) };
        page.fill(FREE_FILL);

        let index = range.index_of(frame);
        let irq = IrqGuard::new(&self.cpu);
        let core = Self::core_index(irq.cpu_id());
        self.lists[core].with_lock(|l| l.push(index, &self.links));
    }

    /// Total number of free frames across all cores.
    ///
    /// Each list is sampled under its own lock, so the sum is only exact
    /// when no other core is allocating or freeing.
    #[must_use]
    pub fn free_pages(&self) -> usize {
        self.lists.iter().map(|l| l.lock_irq(&self.cpu).len).sum()
    }

    /// Number of free frames on `core`'s list.
    ///
    /// # Panics
    /// If `core` is out of range.
    #[must_use]
    pub fn free_pages_on(&self, core: usize) -> usize {
        self.lists[Self::core_index(core)].lock_irq(&self.cpu).len
    }

    /// Pops one frame from the first non-empty sibling list.
    ///
    /// The local lock is not held here, and each sibling lock is released
    /// before the next is taken, so two cores stealing from each other
    /// cannot deadlock.
    fn steal(&self, core: usize) -> Option<u32> {
        (0..NCPU_MAX).filter(|&other| other != core).find_map(|other| {
            let index = self.lists[other].with_lock(|l| l.pop(&self.links))?;
            debug!("page allocator: core {core} took a frame from core {other}");
            Some(index)
        })
    }

    fn core_index(core: usize) -> usize {
        if core >= NCPU_MAX {
            error!("page allocator: core id {core} exceeds {NCPU_MAX} cores");
            panic!("page allocator: core id {core} out of range");
        }
        core
    }

    #[cold]
    fn reject(err: FrameError) -> ! {
        error!("kfree: {err}");
        panic!("kfree: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_list_is_lifo_and_counts() {
        let links: [AtomicU32; 4] = [const { AtomicU32::new(NIL) }; 4];
        let mut list = FreeList::EMPTY;
        list.push(2, &links);
        list.push(0, &links);
        list.push(3, &links);
        assert_eq!(list.len, 3);
        assert_eq!(list.pop(&links), Some(3));
        assert_eq!(list.pop(&links), Some(0));
        assert_eq!(list.pop(&links), Some(2));
        assert_eq!(list.pop(&links), None);
        assert_eq!(list.len, 0);
        assert!(links.iter().all(|l| l.load(Ordering::Relaxed) == NIL));
    }

    #[test]
    fn range_rounds_kernel_end_up() {
        let r = FrameRange {
            kernel_end: 0x10_0123,
            start: 0x10_1000,
            top: 0x10_5000,
        };
        assert_eq!(r.frames(), 4);
        assert_eq!(r.frame_at(0), PhysFrame::new(0x10_1000));
        assert_eq!(r.index_of(PhysFrame::new(0x10_4000)), 3);
    }

    #[test]
    fn range_check_reports_each_violation() {
        let r = FrameRange {
            kernel_end: 0x10_0123,
            start: 0x10_1000,
            top: 0x10_5000,
        };
        assert_eq!(r.check(PhysFrame::new(0x10_2000)), Ok(()));
        assert_eq!(
            r.check(PhysFrame::new(0x10_2008)),
            Err(FrameError::Misaligned(0x10_2008))
        );
        assert!(matches!(
            r.check(PhysFrame::new(0x10_0000)),
            Err(FrameError::BelowKernelEnd { .. })
        ));
        assert!(matches!(
            r.check(PhysFrame::new(0x10_5000)),
            Err(FrameError::AboveMemoryTop { .. })
        ));
    }

    #[test]
    fn frame_debug_is_hex() {
        assert_eq!(format!("{:?}", PhysFrame::new(0x2000)), "PhysFrame(0x2000)");
    }
}
