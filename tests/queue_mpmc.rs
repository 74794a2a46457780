//! Multi-thread fuzz of the MPMC node queue.
//!
//! Every pushed value encodes its producer, a sequence number, and a
//! checksum byte. Poppers verify the checksum on every value; at quiescence
//! every value must have been popped exactly once and the queue must be
//! empty.

use fcmalloc::queue_mpmc::QueueMpmc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const THREADS: usize = 8;
const OPS_PER_THREAD: usize = 20_000;

fn encode(thread: usize, seq: usize) -> usize {
    let payload = (thread << 40) | (seq << 8);
    let checksum = checksum(payload);
    payload | checksum as usize
}

fn checksum(payload: usize) -> u8 {
    let mut x = payload as u64;
    x ^= x >> 33;
    x = x.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    x ^= x >> 33;
    (x & 0xFF) as u8
}

fn decode(value: usize) -> (usize, usize) {
    let payload = value & !0xFF;
    assert_eq!(
        (value & 0xFF) as u8,
        checksum(payload),
        "checksum mismatch on popped value {value:#x}"
    );
    (value >> 40, (value >> 8) & 0xFFFF_FFFF)
}

#[test]
fn fuzz_concurrent_push_pop_accounts_for_every_value() {
    let queue = Arc::new(QueueMpmc::new());
    let popped = Arc::new(AtomicUsize::new(0));

    // Each thread alternates pushes and pops, so the queue constantly grows
    // and shrinks across node page boundaries.
    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let queue = Arc::clone(&queue);
            let popped = Arc::clone(&popped);
            std::thread::spawn(move || {
                let mut seen = Vec::new();
                for seq in 0..OPS_PER_THREAD {
                    queue.push(encode(tid, seq + 1));
                    if seq % 3 != 0 {
                        if let Some(value) = queue.pop() {
                            seen.push(decode(value));
                            popped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                seen
            })
        })
        .collect();

    let mut all: Vec<(usize, usize)> = Vec::with_capacity(THREADS * OPS_PER_THREAD);
    for h in handles {
        all.extend(h.join().unwrap());
    }

    // Pops never exceed pushes.
    assert!(popped.load(Ordering::Relaxed) <= THREADS * OPS_PER_THREAD);

    // Drain the remainder at quiescence.
    while let Some(value) = queue.pop() {
        all.push(decode(value));
    }
    assert!(queue.is_empty());
    assert_eq!(queue.len(), 0);

    // Exactly once each: no value lost, none duplicated.
    assert_eq!(all.len(), THREADS * OPS_PER_THREAD);
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), THREADS * OPS_PER_THREAD);
    for tid in 0..THREADS {
        for seq in 0..OPS_PER_THREAD {
            assert!(all.binary_search(&(tid, seq + 1)).is_ok());
        }
    }

    unsafe { queue.destroy() };
}

#[test]
fn fuzz_push_heavy_then_drain() {
    let queue = Arc::new(QueueMpmc::new());

    // Push-only phase from all threads: builds a deep page chain.
    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                for seq in 0..OPS_PER_THREAD {
                    queue.push(encode(tid, seq + 1));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(queue.len(), THREADS * OPS_PER_THREAD);

    // Pop-only phase from all threads.
    let drained = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let drained = Arc::clone(&drained);
            std::thread::spawn(move || {
                while let Some(value) = queue.pop() {
                    decode(value);
                    drained.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(drained.load(Ordering::Relaxed), THREADS * OPS_PER_THREAD);
    assert!(queue.is_empty());

    unsafe { queue.destroy() };
}
