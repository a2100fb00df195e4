/// Maximum number of cores the kernel brings up.
///
/// Per-core structures are sized by this value; a core reporting an id at
/// or above it is a configuration error.
pub const NCPU: usize = 8;

const _: () = assert!(NCPU > 0);
