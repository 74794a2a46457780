//! Region cache: bounded per-NUMA-node pools of free memory regions.
//!
//! Every region is `REGION_SIZE` bytes, aligned on `REGION_SIZE` — the
//! alignment is what lets `free` recover a slice header by masking a data
//! pointer. Freed regions are pooled per NUMA node (up to `cache_size` each)
//! instead of being unmapped, which keeps region turnover off the mmap path.
//!
//! On a pool miss a new region is synthesized at a chosen virtual address: a
//! random region-aligned candidate in the high half of the address space,
//! mapped with a fixed, non-overwriting mapping. Overlaps are retried with
//! fresh candidates; after a success the next candidate is the address right
//! after the new region, so back-to-back regions cluster in virtual space.

use crate::config::{REGION_CACHE_SIZE, REGION_SIZE, USE_HUGEPAGES};
use crate::platform::{self, MapFixedOutcome};
use crate::queue_mpmc::QueueMpmc;
use crate::{fatal, numa, stat_inc};
use core::cell::Cell;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Candidate window for region placement: a wide, rarely used stretch of the
/// 47-bit user address space.
const PLACEMENT_LOW: usize = 0x2000_0000_0000;
const PLACEMENT_HIGH: usize = 0x6000_0000_0000;

std::thread_local! {
    /// Next placement candidate for this thread; 0 until first use.
    static NEXT_REGION_ADDR: Cell<usize> = const { Cell::new(0) };
}

fn random_aligned_addr() -> usize {
    let r: usize = rand::random();
    let addr = PLACEMENT_LOW + r % (PLACEMENT_HIGH - PLACEMENT_LOW);
    addr & !(REGION_SIZE - 1)
}

pub struct RegionCache {
    /// One queue of free region base addresses per configured NUMA node.
    node_queues: Box<[QueueMpmc]>,
    /// Cap on free regions retained per node.
    cache_size: usize,
    use_hugepages: bool,
}

impl RegionCache {
    pub fn new(cache_size: usize, use_hugepages: bool) -> Self {
        assert!(cache_size > 0);
        let node_count = numa::configured_node_count();
        let node_queues = (0..node_count)
            .map(|_| QueueMpmc::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            node_queues,
            cache_size,
            use_hugepages,
        }
    }

    #[inline]
    pub fn region_size(&self) -> usize {
        REGION_SIZE
    }

    /// Free regions currently pooled for a NUMA node.
    pub fn cached_region_count(&self, node: usize) -> usize {
        self.node_queues[node].len()
    }

    /// Take a region for the current thread's NUMA node: from the pool if
    /// possible, otherwise freshly mapped. Returns null only when the OS is
    /// out of memory.
    pub fn pop(&self) -> *mut u8 {
        let node = numa::current_node_index();
        if let Some(addr) = self.node_queues[node].pop() {
            stat_inc!(region_cache_hits);
            return addr as *mut u8;
        }
        self.map_new_region()
    }

    /// Return a region to the current thread's NUMA node pool, unmapping it
    /// instead if the pool is at its cap.
    ///
    /// # Safety
    ///
    /// `addr` must be a live region obtained from this cache, with no live
    /// slice data reachable through it.
    pub unsafe fn push(&self, addr: *mut u8) {
        debug_assert!(!addr.is_null());
        debug_assert_eq!(addr as usize & (REGION_SIZE - 1), 0);

        let node = numa::current_node_index();
        if self.node_queues[node].len() >= self.cache_size {
            stat_inc!(region_unmap_count);
            unsafe { platform::page_free(addr, REGION_SIZE) };
        } else {
            stat_inc!(region_cache_returns);
            self.node_queues[node].push(addr as usize);
        }
    }

    /// Unmap every pooled region. The cache stays usable afterwards.
    ///
    /// # Safety
    ///
    /// No concurrent `pop`/`push`.
    pub unsafe fn drain(&self) {
        for queue in self.node_queues.iter() {
            while let Some(addr) = queue.pop() {
                unsafe { platform::page_free(addr as *mut u8, REGION_SIZE) };
            }
        }
    }

    /// Unmap pooled regions and the queue node pages.
    ///
    /// # Safety
    ///
    /// No concurrent access; the cache must never be used again.
    unsafe fn destroy(&self) {
        unsafe {
            self.drain();
            for queue in self.node_queues.iter() {
                queue.destroy();
            }
        }
    }

    #[cold]
    fn map_new_region(&self) -> *mut u8 {
        NEXT_REGION_ADDR.with(|cursor| {
            let mut candidate = cursor.get();
            if candidate == 0 {
                candidate = random_aligned_addr();
            }

            let mut retries = 0u64;
            loop {
                match unsafe {
                    platform::map_region_at(candidate as *mut u8, REGION_SIZE, self.use_hugepages)
                } {
                    MapFixedOutcome::Mapped(addr) => {
                        stat_inc!(region_mmap_count);
                        cursor.set(candidate + REGION_SIZE);
                        return addr;
                    }
                    MapFixedOutcome::Overlap => {
                        stat_inc!(region_mmap_retries);
                        retries += 1;
                        if retries % 20 == 0 {
                            // The 64-bit address space is vast, so this
                            // should never trigger; hard-fail rather than
                            // loop forever if it somehow does.
                            if retries == 100 {
                                fatal!(
                                    "unable to find a free address for a region after {} retries",
                                    retries
                                );
                            }
                            log::warn!(
                                "unable to find a free address for a region after {} retries",
                                retries
                            );
                        }
                        candidate = random_aligned_addr();
                    }
                    MapFixedOutcome::OutOfMemory => {
                        log::error!(
                            "out of memory mapping a {} byte region (hugepages: {})",
                            REGION_SIZE,
                            self.use_hugepages
                        );
                        return ptr::null_mut();
                    }
                    MapFixedOutcome::Failed(err) => {
                        fatal!(
                            "region mmap at {:#x} failed: errno {}",
                            candidate,
                            err
                        );
                    }
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Process-wide instance
// ---------------------------------------------------------------------------

static GLOBAL_CACHE: AtomicPtr<RegionCache> = AtomicPtr::new(ptr::null_mut());

/// Install the process-wide region cache with explicit parameters. If one is
/// already installed it is kept and returned.
pub fn install(cache_size: usize, use_hugepages: bool) -> &'static RegionCache {
    let cache = Box::into_raw(Box::new(RegionCache::new(cache_size, use_hugepages)));
    match GLOBAL_CACHE.compare_exchange(
        ptr::null_mut(),
        cache,
        Ordering::AcqRel,
        Ordering::Acquire,
    ) {
        Ok(_) => unsafe { &*cache },
        Err(existing) => {
            // Lost the install race; unmap the fresh cache's queue pages.
            unsafe {
                (*cache).destroy();
                drop(Box::from_raw(cache));
            }
            unsafe { &*existing }
        }
    }
}

/// The process-wide region cache, installed with the built-in configuration
/// on first use.
pub fn global() -> &'static RegionCache {
    let cache = GLOBAL_CACHE.load(Ordering::Acquire);
    if !cache.is_null() {
        return unsafe { &*cache };
    }
    install(REGION_CACHE_SIZE, USE_HUGEPAGES)
}

/// Tear down the process-wide cache so tests can reset state.
///
/// # Safety
///
/// No allocator activity may be in flight, and every thread cache that drew
/// regions from the cache must already be gone.
pub unsafe fn teardown() {
    let cache = GLOBAL_CACHE.swap(ptr::null_mut(), Ordering::AcqRel);
    if !cache.is_null() {
        unsafe {
            (*cache).destroy();
            drop(Box::from_raw(cache));
        }
    }
}
