//! OS platform abstraction for virtual memory mapping.
//!
//! Two consumers with different needs:
//! - the MPMC node queue maps plain anonymous pages (`page_alloc`),
//! - the region cache places regions at chosen virtual addresses with a
//!   fixed, non-overwriting mapping (`map_region_at`).
//!
//! All memory returned by these calls is zero-initialized by the OS on first
//! touch.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use unix as imp;
    } else {
        compile_error!("fcmalloc requires a unix mmap interface");
    }
}

/// Outcome of a fixed-address mapping attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapFixedOutcome {
    /// Mapped at the requested address.
    Mapped(*mut u8),
    /// The target range overlaps an existing mapping; pick a new address.
    Overlap,
    /// The OS is out of memory (or out of hugepages, when requested).
    OutOfMemory,
    /// Any other mmap failure; the raw errno value.
    Failed(i32),
}

/// OS page size, cached after the first query.
#[inline]
pub fn page_size() -> usize {
    imp::page_size()
}

/// Allocate `size` bytes of anonymous read/write memory, page-aligned.
/// Returns null on failure.
///
/// # Safety
/// Caller must eventually call `page_free` with the returned pointer and the
/// same `size`.
#[inline]
pub unsafe fn page_alloc(size: usize) -> *mut u8 {
    unsafe { imp::page_alloc(size) }
}

/// Unmap memory previously mapped by `page_alloc` or `map_region_at`.
///
/// # Safety
/// `ptr`/`size` must exactly describe a live mapping from this module.
#[inline]
pub unsafe fn page_free(ptr: *mut u8, size: usize) {
    unsafe { imp::page_free(ptr, size) }
}

/// Map `size` bytes of anonymous read/write memory exactly at `addr`,
/// failing (rather than overwriting) if the range overlaps an existing
/// mapping. Hugepage-backed iff `hugepages` is set.
///
/// # Safety
/// `addr` must be page-aligned (region-aligned for hugepage mappings) and
/// non-null. The mapping must later be released with `page_free`.
#[inline]
pub unsafe fn map_region_at(addr: *mut u8, size: usize, hugepages: bool) -> MapFixedOutcome {
    unsafe { imp::map_region_at(addr, size, hugepages) }
}
