use core::fmt;
use kernel_info::bio::BSIZE;

/// Identity of one device block.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlockId {
    pub dev: u32,
    pub blockno: u32,
}

impl BlockId {
    #[inline]
    #[must_use]
    pub const fn new(dev: u32, blockno: u32) -> Self {
        Self { dev, blockno }
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.blockno)
    }
}

/// A synchronous block device driver.
///
/// Both calls block until the transfer is complete. Drivers treat I/O
/// failure as fatal, so neither returns an error.
pub trait BlockDevice {
    /// Fills `data` with the contents of block `id`.
    fn read(&self, id: BlockId, data: &mut [u8; BSIZE]);

    /// Stores `data` as the new contents of block `id`.
    fn write(&self, id: BlockId, data: &[u8; BSIZE]);
}
