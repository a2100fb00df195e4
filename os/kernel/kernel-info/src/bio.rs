//! # Block Cache Geometry

/// Size of one device block in bytes.
pub const BSIZE: usize = 1024;

/// Maximum number of blocks a single file system operation writes.
pub const MAXOPBLOCKS: usize = 10;

/// Number of slots in the block cache.
pub const NBUF: usize = MAXOPBLOCKS * 3;

/// Number of hash buckets the cache slots are spread over.
///
/// A prime keeps consecutive block numbers from piling into few buckets.
pub const NBUCKET: usize = 13;

const _: () = {
    assert!(BSIZE > 0);
    assert!(NBUF > 0);
    assert!(NBUCKET > 0);
    assert!(NBUCKET <= NBUF);
};
