//! Unix virtual memory implementation over libc mmap/munmap.

use super::MapFixedOutcome;
use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

// MAP_FIXED_NOREPLACE needs Linux 4.17+. Older kernels ignore the flag and
// fall back to hint behavior; map_region_at treats a mapping that landed
// anywhere but the requested address as an overlap.
#[cfg(target_os = "linux")]
const MAP_FIXED_NOREPLACE_FLAG: libc::c_int = libc::MAP_FIXED_NOREPLACE;
#[cfg(not(target_os = "linux"))]
const MAP_FIXED_NOREPLACE_FLAG: libc::c_int = 0;

#[cfg(target_os = "linux")]
const MAP_HUGETLB_FLAG: libc::c_int = libc::MAP_HUGETLB;
#[cfg(not(target_os = "linux"))]
const MAP_HUGETLB_FLAG: libc::c_int = 0;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

pub fn page_size() -> usize {
    let cached = PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let size = if size > 0 { size as usize } else { 4096 };
    PAGE_SIZE.store(size, Ordering::Relaxed);
    size
}

pub unsafe fn page_alloc(size: usize) -> *mut u8 {
    let raw = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if raw == libc::MAP_FAILED {
        return ptr::null_mut();
    }
    raw as *mut u8
}

pub unsafe fn page_free(ptr: *mut u8, size: usize) {
    let rc = unsafe { libc::munmap(ptr as *mut libc::c_void, size) };
    if rc != 0 {
        log::warn!(
            "munmap failed: {}, addr {:p}, size {}",
            errno::errno(),
            ptr,
            size
        );
    }
}

pub unsafe fn map_region_at(addr: *mut u8, size: usize, hugepages: bool) -> MapFixedOutcome {
    let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | MAP_FIXED_NOREPLACE_FLAG;
    if hugepages {
        flags |= MAP_HUGETLB_FLAG;
    }

    let raw = unsafe {
        libc::mmap(
            addr as *mut libc::c_void,
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            flags,
            -1,
            0,
        )
    };

    if raw == libc::MAP_FAILED {
        return match errno::errno().0 {
            libc::EEXIST => MapFixedOutcome::Overlap,
            libc::ENOMEM => MapFixedOutcome::OutOfMemory,
            other => MapFixedOutcome::Failed(other),
        };
    }

    // Hint fallback on kernels without MAP_FIXED_NOREPLACE: the kernel may
    // place the mapping elsewhere instead of failing.
    if raw as *mut u8 != addr {
        unsafe { page_free(raw as *mut u8, size) };
        return MapFixedOutcome::Overlap;
    }

    MapFixedOutcome::Mapped(raw as *mut u8)
}
