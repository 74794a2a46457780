//! Stress tests with fill-pattern corruption detection.
//!
//! Allocate memory, fill it with a known pattern, pass it between threads,
//! and verify the pattern before freeing. Any corruption (use-after-free,
//! double-serve, overlapping slots) shows up as a pattern mismatch.

use fcmalloc::{allocate, free, reallocate};
use std::sync::mpsc;

/// Fill a buffer with a deterministic pattern derived from its address and size.
fn fill_pattern(ptr: *mut u8, size: usize) {
    let seed = ptr as usize ^ size;
    for i in 0..size {
        unsafe {
            *ptr.add(i) = ((seed.wrapping_add(i).wrapping_mul(0x9E37_79B9)) & 0xFF) as u8;
        }
    }
}

/// Verify the fill pattern. Returns true if intact.
fn check_pattern(ptr: *mut u8, size: usize) -> bool {
    let seed = ptr as usize ^ size;
    for i in 0..size {
        let expected = ((seed.wrapping_add(i).wrapping_mul(0x9E37_79B9)) & 0xFF) as u8;
        if unsafe { *ptr.add(i) } != expected {
            return false;
        }
    }
    true
}

#[test]
fn stress_fill_pattern_single_thread() {
    let sizes: &[usize] = &[16, 32, 64, 100, 256, 500, 1024, 4096, 8192, 65536];
    let rounds = 50;

    let mut live: Vec<(*mut u8, usize)> = Vec::new();

    for round in 0..rounds {
        // Allocate a batch
        for &size in sizes {
            let ptr = allocate(size);
            assert!(!ptr.is_null(), "allocate failed for size {size}");
            fill_pattern(ptr, size);
            live.push((ptr, size));
        }

        // Verify all live allocations
        for &(ptr, size) in &live {
            assert!(
                check_pattern(ptr, size),
                "corruption detected at round {round}, size {size}"
            );
        }

        // Free half (interleaved to stress free-list ordering)
        let drain_count = live.len() / 2;
        for _ in 0..drain_count {
            let idx = (round * 7 + 3) % live.len();
            let (ptr, size) = live.swap_remove(idx);
            assert!(
                check_pattern(ptr, size),
                "corruption before free at round {round}"
            );
            free(ptr);
        }
    }

    // Final cleanup
    for (ptr, size) in live {
        assert!(check_pattern(ptr, size));
        free(ptr);
    }
}

#[test]
fn stress_fill_pattern_cross_thread() {
    let npairs = 4;
    let ops = 200;
    let sizes: &[usize] = &[16, 64, 256, 1024];

    let mut producers = Vec::new();
    let mut consumers = Vec::new();

    for pair_id in 0..npairs {
        // Send raw addresses; ownership transfers cleanly with them.
        let (tx, rx) = mpsc::channel::<(usize, usize)>();

        producers.push(std::thread::spawn(move || {
            for i in 0..ops {
                let size = sizes[(pair_id + i) % sizes.len()];
                let ptr = allocate(size);
                assert!(!ptr.is_null());
                fill_pattern(ptr, size);
                tx.send((ptr as usize, size)).unwrap();
            }
        }));

        consumers.push(std::thread::spawn(move || {
            let mut count = 0usize;
            for (addr, size) in rx {
                let ptr = addr as *mut u8;
                assert!(
                    check_pattern(ptr, size),
                    "cross-thread corruption at pair {pair_id}, item {count}"
                );
                // Frees from the non-owning thread: every one of these goes
                // through the owner's return queue.
                free(ptr);
                count += 1;
            }
            count
        }));
    }

    for h in producers {
        h.join().unwrap();
    }

    let total: usize = consumers.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, npairs * ops);
}

/// Fill with a fixed seed (not address-dependent) so realloc moves don't
/// invalidate the pattern.
fn fill_fixed(ptr: *mut u8, size: usize, seed: usize) {
    for i in 0..size {
        unsafe {
            *ptr.add(i) = ((seed.wrapping_add(i).wrapping_mul(0x9E37_79B9)) & 0xFF) as u8;
        }
    }
}

fn check_fixed(ptr: *mut u8, size: usize, seed: usize) -> bool {
    for i in 0..size {
        let expected = ((seed.wrapping_add(i).wrapping_mul(0x9E37_79B9)) & 0xFF) as u8;
        if unsafe { *ptr.add(i) } != expected {
            return false;
        }
    }
    true
}

#[test]
fn stress_reallocate_pattern() {
    let initial_size = 64;

    for round in 0..100 {
        let seed = round * 31 + 7;
        let ptr = allocate(initial_size);
        assert!(!ptr.is_null());
        fill_fixed(ptr, initial_size, seed);

        // Grow across a class boundary; original content must survive.
        let grown = reallocate(ptr, initial_size, 256, false);
        assert!(!grown.is_null());
        assert!(
            check_fixed(grown, initial_size, seed),
            "reallocate corrupted content during grow (round {round})"
        );

        // Shrink; the prefix must survive.
        let shrunk = reallocate(grown, 256, 32, false);
        assert!(!shrunk.is_null());
        assert!(
            check_fixed(shrunk, 32, seed),
            "reallocate corrupted content during shrink (round {round})"
        );

        free(shrunk);
    }
}

#[test]
fn stress_many_threads_concurrent() {
    // Many threads doing alloc+fill+verify+free simultaneously
    let nthreads = 8;
    let ops_per_thread = 400;

    let handles: Vec<_> = (0..nthreads)
        .map(|tid| {
            std::thread::spawn(move || {
                let mut live: Vec<(*mut u8, usize)> = Vec::with_capacity(64);

                for i in 0..ops_per_thread {
                    let size = [16, 32, 64, 128, 512, 2048][(tid + i) % 6];
                    let ptr = allocate(size);
                    assert!(!ptr.is_null());
                    fill_pattern(ptr, size);
                    live.push((ptr, size));

                    // Periodically verify and free some
                    if live.len() > 32 {
                        for _ in 0..16 {
                            let (ptr, size) = live.pop().unwrap();
                            assert!(
                                check_pattern(ptr, size),
                                "thread {tid} corruption at op {i}"
                            );
                            free(ptr);
                        }
                    }
                }

                for (ptr, size) in live {
                    assert!(check_pattern(ptr, size));
                    free(ptr);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}
