//! # Bucketed block cache
//!
//! A fixed pool of `NBUF` slots, each able to hold one device block. Slots
//! are spread over `NBUCKET` buckets by `blockno % NBUCKET`, and every bucket
//! has its own spin lock, taken with interrupts masked, so lookups of blocks
//! in different buckets never contend.
//!
//! ```text
//!  bucket 0        bucket 1        bucket 2
//! ┌────────┐      ┌────────┐      ┌────────┐
//! │ 1:0  ──┼─► s3 │ 1:4  ──┼─► s0 │ (none)─┼─► s2
//! │ 1:9  ──┼─► s5 │ (none)─┼─► s1 │ 1:14 ──┼─► s4
//! └────────┘      └────────┘      └────────┘
//!   metadata (id, refcnt, stamp) under the bucket lock
//!
//! slots: [s0 .. s5]  valid flag + content sleep lock + BSIZE bytes
//! ```
//!
//! A miss recycles the unreferenced slot with the oldest stamp. The search
//! starts at the home bucket and walks the others round-robin, probing each
//! with `try_lock` so that two cores evicting into each other's buckets never
//! wait on one another. The winning slot moves into the home bucket.
//!
//! Byte access always happens under the slot's [`SleepLock`], which is only
//! taken after the bucket lock has been dropped.

use crate::bucket::{Bucket, Entry};
use crate::{BlockDevice, BlockId};
use core::hint::spin_loop;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_info::bio::{self, BSIZE};
use kernel_sync::{Cpu, IrqSpinGuard, Scheduler, SleepLock, SleepLockGuard, SpinLock, TickSource};
use log::{debug, error, info, trace};

/// One cached block's storage.
struct Slot {
    /// Whether `data` holds the device contents for the slot's current
    /// block. Cleared under the bucket lock on reassignment, set under the
    /// content lock after the device read.
    valid: AtomicBool,
    data: SleepLock<[u8; BSIZE]>,
}

impl Slot {
    const fn new() -> Self {
        Self {
            valid: AtomicBool::new(false),
            data: SleepLock::new([0; BSIZE]),
        }
    }
}

/// Eviction candidate found during a rotation.
enum Victim<'a, C: Cpu, const NBUF: usize> {
    /// Lives in the (already locked) home bucket.
    Home { pos: usize, stamp: u64 },
    /// Lives in another bucket, whose lock is held until the move.
    Away {
        bucket: usize,
        guard: IrqSpinGuard<'a, Bucket<NBUF>, C>,
        pos: usize,
        stamp: u64,
    },
}

impl<C: Cpu, const NBUF: usize> Victim<'_, C, NBUF> {
    const fn stamp(&self) -> u64 {
        match self {
            Self::Home { stamp, .. } | Self::Away { stamp, .. } => *stamp,
        }
    }
}

/// Outcome of one rotation over the buckets.
enum Search<'a, C: Cpu, const NBUF: usize> {
    Found(Victim<'a, C, NBUF>),
    /// Nothing free in the buckets visited, but some were busy and skipped.
    Incomplete,
    /// Every bucket was visited and every slot is referenced.
    Exhausted,
}

/// Block cache over device `D`.
///
/// * `C` masks interrupts while a bucket lock is held.
/// * `S` supplies the context ids and sleep/wakeup for the content locks.
/// * `T` stamps slots for recency.
pub struct BufferCache<
    D,
    C,
    S,
    T,
    const NBUF: usize = { bio::NBUF },
    const NBUCKET: usize = { bio::NBUCKET },
> {
    device: D,
    cpu: C,
    sched: S,
    clock: T,
    buckets: [SpinLock<Bucket<NBUF>>; NBUCKET],
    slots: [Slot; NBUF],
}

impl<D, C, S, T, const NBUF: usize, const NBUCKET: usize> BufferCache<D, C, S, T, NBUF, NBUCKET>
where
    D: BlockDevice,
    C: Cpu,
    S: Scheduler,
    T: TickSource,
{
    const _GEOMETRY: () = assert!(NBUF > 0 && NBUCKET > 0);

    /// Creates the cache with every slot unused.
    ///
    /// Slot `i` starts out in bucket `i % NBUCKET`.
    #[must_use]
    pub const fn new(device: D, cpu: C, sched: S, clock: T) -> Self {
        let () = Self::_GEOMETRY;
        let mut buckets = [const { SpinLock::new(Bucket::EMPTY) }; NBUCKET];
        let mut slot = 0;
        while slot < NBUF {
            buckets[slot % NBUCKET].get_mut().push(Entry::fresh(slot));
            slot += 1;
        }
        Self {
            device,
            cpu,
            sched,
            clock,
            buckets,
            slots: [const { Slot::new() }; NBUF],
        }
    }

    /// Logs the cache geometry.
    pub fn log_geometry(&self) {
        info!("bcache: {NBUF} buffers of {BSIZE} bytes in {NBUCKET} buckets");
    }

    #[inline]
    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    #[must_use]
    pub const fn clock(&self) -> &T {
        &self.clock
    }

    /// Returns a locked buffer holding the contents of block `blockno` on
    /// `dev`, reading it from the device if it is not cached.
    ///
    /// Blocks the caller while another context holds the same buffer.
    ///
    /// # Panics
    /// If every buffer is referenced (`bget: no buffers`).
    #[must_use]
    pub fn read(&self, dev: u32, blockno: u32) -> Buf<'_, D, C, S, T, NBUF, NBUCKET> {
        let id = BlockId::new(dev, blockno);
        let slot = self.get(id);
        let mut data = self.slots[slot].data.lock(&self.sched);
        if !self.slots[slot].valid.load(Ordering::Acquire) {
            self.device.read(id, &mut data);
            self.slots[slot].valid.store(true, Ordering::Release);
        }
        Buf {
            cache: self,
            id,
            slot,
            armed: true,
            data: ManuallyDrop::new(data),
        }
    }

    /// Reference count of `(dev, blockno)`, or `None` if it is not cached.
    #[must_use]
    pub fn refcount(&self, dev: u32, blockno: u32) -> Option<u32> {
        let id = BlockId::new(dev, blockno);
        let bucket = self.buckets[Self::home_of(id)].lock_irq(&self.cpu);
        bucket.find(id).map(|pos| bucket.members()[pos].refcnt)
    }

    /// Whether `(dev, blockno)` currently occupies a slot.
    #[must_use]
    pub fn is_cached(&self, dev: u32, blockno: u32) -> bool {
        self.refcount(dev, blockno).is_some()
    }

    #[inline]
    const fn home_of(id: BlockId) -> usize {
        id.blockno as usize % NBUCKET
    }

    /// Looks up `id`, assigning a slot on a miss, and returns the slot with
    /// its reference count raised. The slot's content lock is not taken.
    fn get(&self, id: BlockId) -> usize {
        let home = Self::home_of(id);
        loop {
            let mut bucket = self.buckets[home].lock_irq(&self.cpu);

            if let Some(pos) = bucket.find(id) {
                let entry = bucket.get_mut(pos);
                entry.refcnt += 1;
                entry.stamp = self.clock.now();
                trace!("bcache: hit {id:?} in slot {}", entry.slot);
                return entry.slot;
            }

            let victim = match self.search(home, &bucket) {
                Search::Found(victim) => victim,
                Search::Incomplete => {
                    // Drop our own bucket so the busy ones can make progress.
                    drop(bucket);
                    spin_loop();
                    continue;
                }
                Search::Exhausted => {
                    error!("bcache: every buffer is in use, cannot cache {id:?}");
                    panic!("bget: no buffers");
                }
            };

            let pos = match victim {
                Victim::Home { pos, .. } => pos,
                Victim::Away {
                    bucket: from,
                    mut guard,
                    pos,
                    ..
                } => {
                    let entry = guard.swap_remove(pos);
                    drop(guard);
                    debug!("bcache: slot {} moves from bucket {from} to {home}", entry.slot);
                    bucket.push(entry)
                }
            };

            let entry = bucket.get_mut(pos);
            trace!("bcache: miss {id:?}, recycling slot {} ({:?})", entry.slot, entry.id);
            entry.id = Some(id);
            entry.refcnt = 1;
            entry.stamp = self.clock.now();
            self.slots[entry.slot].valid.store(false, Ordering::Release);
            return entry.slot;
        }
    }

    /// One rotation over all buckets, starting at `home`, for the globally
    /// oldest unreferenced slot.
    ///
    /// Only the bucket of the best candidate so far stays locked; a bucket
    /// that is busy is skipped rather than waited for.
    fn search<'a>(&'a self, home: usize, home_bucket: &Bucket<NBUF>) -> Search<'a, C, NBUF> {
        let mut best = home_bucket
            .oldest_free()
            .map(|(pos, stamp)| Victim::Home { pos, stamp });
        let mut skipped = false;

        for step in 1..NBUCKET {
            let index = (home + step) % NBUCKET;
            let Some(guard) = self.buckets[index].try_lock_irq(&self.cpu) else {
                skipped = true;
                continue;
            };
            let Some((pos, stamp)) = guard.oldest_free() else {
                continue;
            };
            if best.as_ref().is_none_or(|b| stamp < b.stamp()) {
                // Replacing an away candidate releases its bucket here.
                best = Some(Victim::Away {
                    bucket: index,
                    guard,
                    pos,
                    stamp,
                });
            }
        }

        match best {
            Some(victim) => Search::Found(victim),
            None if skipped => Search::Incomplete,
            None => Search::Exhausted,
        }
    }

    /// Applies `f` to the metadata of `id`, which must be referenced.
    fn with_entry<R>(&self, id: BlockId, op: &str, f: impl FnOnce(&mut Entry) -> R) -> R {
        let mut bucket = self.buckets[Self::home_of(id)].lock_irq(&self.cpu);
        let Some(pos) = bucket.find(id) else {
            error!("bcache: {op} on {id:?}, which is not cached");
            panic!("{op}: buffer not cached");
        };
        f(bucket.get_mut(pos))
    }
}

/// A locked, referenced buffer returned by [`BufferCache::read`].
///
/// Dereferences to the block's bytes. Dropping the handle releases it
/// (`brelse`); [`release`](Self::release) does the same explicitly.
///
/// Handles may be sent to other threads, but only the context that
/// acquired the buffer may write or release it; anyone else panics.
pub struct Buf<'a, D, C, S, T, const NBUF: usize, const NBUCKET: usize>
where
    D: BlockDevice,
    C: Cpu,
    S: Scheduler,
    T: TickSource,
{
    cache: &'a BufferCache<D, C, S, T, NBUF, NBUCKET>,
    id: BlockId,
    slot: usize,
    /// Cleared once a discipline check failed; a disarmed handle leaks its
    /// lock instead of releasing somebody else's.
    armed: bool,
    data: ManuallyDrop<SleepLockGuard<'a, [u8; BSIZE], S>>,
}

impl<D, C, S, T, const NBUF: usize, const NBUCKET: usize> Buf<'_, D, C, S, T, NBUF, NBUCKET>
where
    D: BlockDevice,
    C: Cpu,
    S: Scheduler,
    T: TickSource,
{
    #[inline]
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    #[inline]
    #[must_use]
    pub const fn dev(&self) -> u32 {
        self.id.dev
    }

    #[inline]
    #[must_use]
    pub const fn blockno(&self) -> u32 {
        self.id.blockno
    }

    /// Writes the buffer's bytes through to the device.
    ///
    /// # Panics
    /// If the calling context does not hold the buffer (`bwrite`).
    pub fn write(&mut self) {
        self.check_holder("bwrite");
        self.cache.device.write(self.id, &self.data);
    }

    /// Releases the buffer; same as dropping it.
    ///
    /// # Panics
    /// If the calling context does not hold the buffer (`brelse`).
    pub fn release(self) {
        drop(self);
    }

    /// Keeps the block cached after this handle is released, until
    /// [`unpin`](Self::unpin).
    pub fn pin(&self) {
        self.cache.with_entry(self.id, "bpin", |e| {
            e.refcnt += 1;
            e.pins += 1;
        });
    }

    /// Drops a reference taken with [`pin`](Self::pin).
    ///
    /// # Panics
    /// If the block has no outstanding pin (`bunpin`). References held by
    /// handles, including waiting readers, are never dropped here.
    pub fn unpin(&self) {
        self.cache.with_entry(self.id, "bunpin", |e| {
            if e.pins == 0 {
                error!("bcache: unpin of {:?} without a pin", self.id);
                panic!("bunpin: {:?} is not pinned", self.id);
            }
            e.pins -= 1;
            e.refcnt -= 1;
        });
    }

    fn check_holder(&mut self, op: &str) {
        let slot = &self.cache.slots[self.slot];
        if !slot.data.holding(&self.cache.sched) {
            self.armed = false;
            error!("bcache: {op} on {:?} by a context not holding it", self.id);
            panic!("{op}: buffer {:?} not held by caller", self.id);
        }
    }
}

impl<D, C, S, T, const NBUF: usize, const NBUCKET: usize> Deref for Buf<'_, D, C, S, T, NBUF, NBUCKET>
where
    D: BlockDevice,
    C: Cpu,
    S: Scheduler,
    T: TickSource,
{
    type Target = [u8; BSIZE];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<D, C, S, T, const NBUF: usize, const NBUCKET: usize> DerefMut for Buf<'_, D, C, S, T, NBUF, NBUCKET>
where
    D: BlockDevice,
    C: Cpu,
    S: Scheduler,
    T: TickSource,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl<D, C, S, T, const NBUF: usize, const NBUCKET: usize> Drop for Buf<'_, D, C, S, T, NBUF, NBUCKET>
where
    D: BlockDevice,
    C: Cpu,
    S: Scheduler,
    T: TickSource,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.check_holder("brelse");

        // SAFETY: armed, so the guard is still ours and dropped exactly once.
        unsafe { ManuallyDrop::drop(&mut self.data) };

        self.cache.with_entry(self.id, "brelse", |e| {
            e.refcnt -= 1;
            e.stamp = self.cache.clock.now();
        });
    }
}
