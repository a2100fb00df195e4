use kernel_sync::{SpinLock, SpinLockGuard};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

#[test]
fn try_lock_fails_while_held_and_succeeds_after() {
    let l = SpinLock::new(1u8);

    let g1 = l.try_lock().expect("lock is free");
    assert_eq!(*g1, 1);
    assert!(l.is_locked());
    assert!(l.try_lock().is_none());

    drop(g1);
    assert!(!l.is_locked());
    assert!(l.try_lock().is_some());
}

#[test]
fn guard_source_relocks_the_same_lock() {
    let l = SpinLock::new(vec![1, 2]);
    let mut g = l.lock();
    g.push(3);

    let src = SpinLockGuard::source(&g);
    drop(g);
    assert!(!src.is_locked());

    let g = src.lock();
    assert_eq!(g.as_slice(), &[1, 2, 3]);
}

#[test]
fn try_lock_never_blocks_under_contention() {
    let lock = Arc::new(SpinLock::new(0usize));
    let held = lock.lock();

    // Another core probing a busy lock must come back empty-handed.
    let probe = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || lock.try_lock().is_none())
    };
    assert!(probe.join().unwrap());
    drop(held);
}

#[test]
fn contended_increments_are_exact_and_exclusive() {
    let threads = 8;
    let iters = 5_000;

    let lock = Arc::new(SpinLock::new(0usize));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let lock = Arc::clone(&lock);
            let in_cs = Arc::clone(&in_cs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for n in 0..iters {
                    // Mix blocking and opportunistic acquisition.
                    let mut g = if (i + n) % 2 == 0 {
                        lock.lock()
                    } else {
                        loop {
                            if let Some(g) = lock.try_lock() {
                                break g;
                            }
                            std::hint::spin_loop();
                        }
                    };
                    assert_eq!(in_cs.fetch_add(1, Ordering::SeqCst), 0, "mutual exclusion violated");
                    *g += 1;
                    in_cs.fetch_sub(1, Ordering::SeqCst);
                    drop(g);
                    thread::yield_now();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(lock.with_lock(|v| *v), threads * iters);
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinLock::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err(), "expected panic");
    assert_eq!(l.with_lock(|v| *v), 123);
}
