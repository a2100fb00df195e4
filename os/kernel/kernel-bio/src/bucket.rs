use crate::BlockId;

/// Per-slot bookkeeping, owned by the bucket the slot belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    /// Index into the cache's slot arena.
    pub slot: usize,
    /// Block currently cached in the slot; `None` until first use.
    pub id: Option<BlockId>,
    /// Outstanding handles and pins. Zero means the slot may be reassigned.
    pub refcnt: u32,
    /// How many of `refcnt` are pins rather than handles.
    pub pins: u32,
    /// Tick of the last lookup or release.
    pub stamp: u64,
}

impl Entry {
    const UNUSED: Self = Self {
        slot: usize::MAX,
        id: None,
        refcnt: 0,
        pins: 0,
        stamp: 0,
    };

    pub(crate) const fn fresh(slot: usize) -> Self {
        Self { slot, ..Self::UNUSED }
    }
}

/// The slots hashed to one bucket.
///
/// Members are kept unordered in the first `len` entries; removal swaps in
/// the last member, so every operation but the scans is O(1).
pub(crate) struct Bucket<const NBUF: usize> {
    members: [Entry; NBUF],
    len: usize,
}

impl<const NBUF: usize> Bucket<NBUF> {
    pub(crate) const EMPTY: Self = Self {
        members: [Entry::UNUSED; NBUF],
        len: 0,
    };

    /// # Panics
    /// If the bucket already holds every slot of the cache.
    pub(crate) const fn push(&mut self, entry: Entry) -> usize {
        assert!(self.len < NBUF, "bucket overflow");
        self.members[self.len] = entry;
        self.len += 1;
        self.len - 1
    }

    pub(crate) fn swap_remove(&mut self, pos: usize) -> Entry {
        debug_assert!(pos < self.len);
        let entry = self.members[pos];
        self.len -= 1;
        self.members[pos] = self.members[self.len];
        self.members[self.len] = Entry::UNUSED;
        entry
    }

    #[inline]
    pub(crate) fn members(&self) -> &[Entry] {
        &self.members[..self.len]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, pos: usize) -> &mut Entry {
        &mut self.members[..self.len][pos]
    }

    pub(crate) fn find(&self, id: BlockId) -> Option<usize> {
        self.members().iter().position(|e| e.id == Some(id))
    }

    /// Position and stamp of the least recently used unreferenced member.
    ///
    /// Ties go to the member found first.
    pub(crate) fn oldest_free(&self) -> Option<(usize, u64)> {
        self.members()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.refcnt == 0)
            .min_by_key(|(_, e)| e.stamp)
            .map(|(pos, e)| (pos, e.stamp))
    }
}
