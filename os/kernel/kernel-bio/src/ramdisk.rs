//! Memory-backed block device.

use crate::{BlockDevice, BlockId};
use core::sync::atomic::{AtomicUsize, Ordering};
use kernel_info::bio::BSIZE;
use kernel_sync::SpinLock;
use log::error;

/// A device of `NBLOCKS` blocks kept in memory.
///
/// Answers to a single device number. Transfers are counted so callers can
/// tell cache hits from device traffic.
pub struct RamDisk<const NBLOCKS: usize> {
    dev: u32,
    blocks: SpinLock<[[u8; BSIZE]; NBLOCKS]>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl<const NBLOCKS: usize> RamDisk<NBLOCKS> {
    /// A zero-filled disk registered as device `dev`.
    #[must_use]
    pub const fn new(dev: u32) -> Self {
        Self {
            dev,
            blocks: SpinLock::new([[0; BSIZE]; NBLOCKS]),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    #[inline]
    #[must_use]
    pub const fn dev(&self) -> u32 {
        self.dev
    }

    /// Number of blocks read from the device so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of blocks written to the device so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Overwrites block `blockno` without going through the counters.
    ///
    /// # Panics
    /// If `blockno` is past the end of the disk.
    pub fn load(&self, blockno: u32, data: &[u8; BSIZE]) {
        let index = self.index(BlockId::new(self.dev, blockno));
        self.blocks.lock()[index] = *data;
    }

    fn index(&self, id: BlockId) -> usize {
        let index = id.blockno as usize;
        if id.dev != self.dev || index >= NBLOCKS {
            error!("ramdisk {}: no block {id:?}", self.dev);
            panic!("ramdisk: block {id:?} out of range");
        }
        index
    }
}

impl<const NBLOCKS: usize> BlockDevice for RamDisk<NBLOCKS> {
    fn read(&self, id: BlockId, data: &mut [u8; BSIZE]) {
        let index = self.index(id);
        *data = self.blocks.lock()[index];
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    fn write(&self, id: BlockId, data: &[u8; BSIZE]) {
        let index = self.index(id);
        self.blocks.lock()[index] = *data;
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        let disk = RamDisk::<4>::new(1);
        let mut block = [0u8; BSIZE];
        block[..3].copy_from_slice(b"abc");
        disk.write(BlockId::new(1, 2), &block);

        let mut out = [0xffu8; BSIZE];
        disk.read(BlockId::new(1, 2), &mut out);
        assert_eq!(&out[..3], b"abc");
        assert!(out[3..].iter().all(|&b| b == 0));
        assert_eq!((disk.reads(), disk.writes()), (1, 1));
    }

    #[test]
    fn load_is_not_counted() {
        let disk = RamDisk::<2>::new(0);
        disk.load(1, &[7; BSIZE]);
        let mut out = [0u8; BSIZE];
        disk.read(BlockId::new(0, 1), &mut out);
        assert_eq!(out, [7; BSIZE]);
        assert_eq!((disk.reads(), disk.writes()), (1, 0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn foreign_device_is_fatal() {
        let disk = RamDisk::<2>::new(0);
        let mut out = [0u8; BSIZE];
        disk.read(BlockId::new(1, 0), &mut out);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn block_past_end_is_fatal() {
        let disk = RamDisk::<2>::new(0);
        disk.write(BlockId::new(0, 2), &[0; BSIZE]);
    }
}
