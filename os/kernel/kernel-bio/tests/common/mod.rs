#![allow(dead_code)]

use kernel_bio::{BlockDevice, BlockId, BufferCache};
use kernel_info::bio::BSIZE;
use kernel_sync::{Cpu, Scheduler, SpinLockGuard, Ticks};
use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

static NEXT_TASK: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static TASK: Cell<usize> = Cell::new(NEXT_TASK.fetch_add(1, Ordering::Relaxed));
    static IRQ_ON: Cell<bool> = const { Cell::new(true) };
}

/// Every host thread is its own core with its own interrupt flag.
#[derive(Default)]
pub struct HostCpu;

impl Cpu for HostCpu {
    fn id(&self) -> usize {
        0
    }

    fn interrupts_enabled(&self) -> bool {
        IRQ_ON.with(Cell::get)
    }

    fn disable_interrupts(&self) {
        IRQ_ON.with(|f| f.set(false));
    }

    fn enable_interrupts(&self) {
        IRQ_ON.with(|f| f.set(true));
    }
}

/// One host thread per task; sleeping just yields the thread.
#[derive(Default)]
pub struct Threads;

impl Scheduler for Threads {
    fn current(&self) -> usize {
        TASK.with(Cell::get)
    }

    fn sleep<'a, T>(&self, _chan: usize, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
        let lock = SpinLockGuard::source(&guard);
        drop(guard);
        thread::yield_now();
        lock.lock()
    }

    fn wakeup(&self, _chan: usize) {}
}

/// Sparse multi-device disk. Unwritten blocks read as their block number's
/// low byte repeated, so every block has distinguishable contents.
#[derive(Default)]
pub struct Disk {
    blocks: Mutex<HashMap<BlockId, [u8; BSIZE]>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl Disk {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn pattern(blockno: u32) -> u8 {
        blockno.to_le_bytes()[0]
    }

    pub fn stored(&self, dev: u32, blockno: u32) -> Option<[u8; BSIZE]> {
        self.blocks.lock().unwrap().get(&BlockId::new(dev, blockno)).copied()
    }
}

impl BlockDevice for Disk {
    fn read(&self, id: BlockId, data: &mut [u8; BSIZE]) {
        self.reads.fetch_add(1, Ordering::SeqCst);
        *data = self
            .blocks
            .lock()
            .unwrap()
            .get(&id)
            .copied()
            .unwrap_or([Self::pattern(id.blockno); BSIZE]);
    }

    fn write(&self, id: BlockId, data: &[u8; BSIZE]) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.blocks.lock().unwrap().insert(id, *data);
    }
}

pub type Cache<const NBUF: usize, const NBUCKET: usize> =
    BufferCache<Disk, HostCpu, Threads, Ticks<HostCpu>, NBUF, NBUCKET>;

pub fn cache<const NBUF: usize, const NBUCKET: usize>() -> Cache<NBUF, NBUCKET> {
    BufferCache::new(Disk::default(), HostCpu, Threads, Ticks::new(HostCpu))
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::new()
    }
}
