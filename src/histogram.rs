//! Per-class allocation histogram.
//!
//! Records how many allocations each size class served, plus requests above
//! the largest class. Useful for checking whether the configured class set
//! matches the workload. Only compiled with the `alloc-histogram` feature.

use crate::config::{OBJECT_SIZES, SIZE_CLASS_COUNT};
use core::sync::atomic::{AtomicU64, Ordering};

struct BucketArray([AtomicU64; SIZE_CLASS_COUNT]);

static BUCKETS: BucketArray = {
    #[allow(clippy::declare_interior_mutable_const)]
    const ZERO: AtomicU64 = AtomicU64::new(0);
    BucketArray([ZERO; SIZE_CLASS_COUNT])
};
static OVERFLOW: AtomicU64 = AtomicU64::new(0);

/// Record one allocation served by `class_index`, or an over-max request
/// when `class_index` is `None`.
///
/// Called from the `hist_record!` macro; a single atomic increment, safe on
/// the hot path.
#[inline]
pub fn record(class_index: Option<usize>) {
    match class_index {
        Some(index) => BUCKETS.0[index].fetch_add(1, Ordering::Relaxed),
        None => OVERFLOW.fetch_add(1, Ordering::Relaxed),
    };
}

/// A point-in-time snapshot of the histogram.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// `counts[i]` = allocations served by class `i`.
    pub counts: [u64; SIZE_CLASS_COUNT],
    /// Requests above the largest class (not served here).
    pub overflow: u64,
}

pub fn snapshot() -> Snapshot {
    let mut counts = [0u64; SIZE_CLASS_COUNT];
    for (i, bucket) in BUCKETS.0.iter().enumerate() {
        counts[i] = bucket.load(Ordering::Relaxed);
    }
    Snapshot {
        overflow: OVERFLOW.load(Ordering::Relaxed),
        counts,
    }
}

/// Print a human-readable report to stdout.
pub fn print_report() {
    let snap = snapshot();
    let total: u64 = snap.counts.iter().sum::<u64>() + snap.overflow;

    println!("\nAllocations per size class");
    if total == 0 {
        println!("  (no allocations recorded)");
        return;
    }

    println!("  {:>8}   {:>12}   {:>7}", "Class", "Count", "%");
    for (i, &count) in snap.counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        println!(
            "  {:>8}   {:>12}   {:>6.2}%",
            OBJECT_SIZES[i],
            count,
            count as f64 / total as f64 * 100.0,
        );
    }
    if snap.overflow > 0 {
        println!(
            "  {:>8}   {:>12}   {:>6.2}%",
            "over-max",
            snap.overflow,
            snap.overflow as f64 / total as f64 * 100.0,
        );
    }
}
