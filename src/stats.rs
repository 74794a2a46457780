//! Allocation statistics counters.
//!
//! All counters use `Relaxed` ordering — they are observational only and not
//! used as synchronization. The allocator's own atomics provide the ordering
//! guarantees for correctness.
//!
//! Counters are only bumped when the `stats` feature is enabled (via the
//! `stat_inc!`/`stat_add!` macros); [`snapshot`] always exists but reads
//! zeros otherwise.

use core::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Stats {
    // ---- Front-end ----
    /// Calls to `allocate` (including `allocate_zeroed`).
    pub alloc_count: AtomicU64,
    /// Sum of requested byte sizes passed to `allocate`.
    pub alloc_bytes: AtomicU64,
    /// Calls to `free` with a non-null pointer.
    pub free_count: AtomicU64,
    /// Frees routed to another thread's return queue.
    pub free_cross_thread_count: AtomicU64,
    /// Calls to `reallocate`.
    pub realloc_count: AtomicU64,

    // ---- Size-class allocator ----
    /// Allocations served by draining the cross-thread return queue.
    pub return_queue_drains: AtomicU64,
    /// Slices carved from fresh regions.
    pub slices_carved: AtomicU64,
    /// Slices retired (region handed back to the region cache).
    pub slices_retired: AtomicU64,

    // ---- Region cache ----
    /// Regions served from a NUMA node pool.
    pub region_cache_hits: AtomicU64,
    /// Regions returned to a NUMA node pool.
    pub region_cache_returns: AtomicU64,
    /// Fresh regions mapped from the OS.
    pub region_mmap_count: AtomicU64,
    /// Placement candidates that collided with an existing mapping.
    pub region_mmap_retries: AtomicU64,
    /// Regions unmapped because a node pool was at its cap.
    pub region_unmap_count: AtomicU64,
}

impl Stats {
    const fn new() -> Self {
        Self {
            alloc_count: AtomicU64::new(0),
            alloc_bytes: AtomicU64::new(0),
            free_count: AtomicU64::new(0),
            free_cross_thread_count: AtomicU64::new(0),
            realloc_count: AtomicU64::new(0),
            return_queue_drains: AtomicU64::new(0),
            slices_carved: AtomicU64::new(0),
            slices_retired: AtomicU64::new(0),
            region_cache_hits: AtomicU64::new(0),
            region_cache_returns: AtomicU64::new(0),
            region_mmap_count: AtomicU64::new(0),
            region_mmap_retries: AtomicU64::new(0),
            region_unmap_count: AtomicU64::new(0),
        }
    }
}

pub(crate) static STATS: Stats = Stats::new();

/// A point-in-time snapshot of the global counters.
///
/// Individual fields are each atomically read, but the snapshot as a whole is
/// not globally consistent — concurrent allocations may race between loads.
/// For monitoring purposes this is always sufficient.
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    pub alloc_count: u64,
    pub alloc_bytes: u64,
    pub free_count: u64,
    pub free_cross_thread_count: u64,
    pub realloc_count: u64,
    pub return_queue_drains: u64,
    pub slices_carved: u64,
    pub slices_retired: u64,
    pub region_cache_hits: u64,
    pub region_cache_returns: u64,
    pub region_mmap_count: u64,
    pub region_mmap_retries: u64,
    pub region_unmap_count: u64,
}

/// Load all counters with `Relaxed` ordering.
pub fn snapshot() -> Snapshot {
    let s = &STATS;
    Snapshot {
        alloc_count: s.alloc_count.load(Ordering::Relaxed),
        alloc_bytes: s.alloc_bytes.load(Ordering::Relaxed),
        free_count: s.free_count.load(Ordering::Relaxed),
        free_cross_thread_count: s.free_cross_thread_count.load(Ordering::Relaxed),
        realloc_count: s.realloc_count.load(Ordering::Relaxed),
        return_queue_drains: s.return_queue_drains.load(Ordering::Relaxed),
        slices_carved: s.slices_carved.load(Ordering::Relaxed),
        slices_retired: s.slices_retired.load(Ordering::Relaxed),
        region_cache_hits: s.region_cache_hits.load(Ordering::Relaxed),
        region_cache_returns: s.region_cache_returns.load(Ordering::Relaxed),
        region_mmap_count: s.region_mmap_count.load(Ordering::Relaxed),
        region_mmap_retries: s.region_mmap_retries.load(Ordering::Relaxed),
        region_unmap_count: s.region_unmap_count.load(Ordering::Relaxed),
    }
}
