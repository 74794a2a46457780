//! Lock-free multi-producer/multi-consumer queue of pointer-sized values.
//!
//! Backs the cross-thread slot return protocol and the region cache pools,
//! so it must never recurse into the allocator it serves: node storage is
//! mapped straight from the OS, one page at a time, and pages are chained
//! with prev/next pointers and recycled lazily.
//!
//! The whole queue state lives in a packed 128-bit head word
//! `{page, node_index, version, length}` updated with double-word CAS; the
//! version defeats ABA. Push and pop both operate at the head: this is a
//! LIFO stack, not a FIFO queue. Values are nonzero; zero marks an empty
//! node slot, and slow readers/writers of a claimed slot are waited out with
//! CAS-against-zero.

use crate::fatal;
use crate::platform;
use core::hint::spin_loop;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use portable_atomic::AtomicU128;

/// Page header; the rest of the OS page is an inline array of value slots.
#[repr(C)]
struct NodePage {
    prev: AtomicPtr<NodePage>,
    next: AtomicPtr<NodePage>,
}

/// Unpacked view of the 128-bit head word.
#[derive(Clone, Copy)]
struct Head {
    page: *mut NodePage,
    /// Index of the top-of-stack slot in `page`; -1 means the page is empty.
    index: i16,
    version: u16,
    length: u32,
}

// Bit layout: [page: 64][index: 16][version: 16][length: 32], low to high
// from length.
fn pack(h: Head) -> u128 {
    (h.page as usize as u128) << 64
        | ((h.index as u16) as u128) << 48
        | (h.version as u128) << 32
        | h.length as u128
}

fn unpack(raw: u128) -> Head {
    Head {
        page: (raw >> 64) as usize as *mut NodePage,
        index: ((raw >> 48) as u16) as i16,
        version: (raw >> 32) as u16,
        length: raw as u32,
    }
}

pub struct QueueMpmc {
    head: AtomicU128,
    /// Value slots per node page, fixed by the OS page size.
    nodes_per_page: i16,
}

// SAFETY: all shared state is behind the head CAS protocol and per-slot
// atomics; node pages are plain OS memory that outlives any thread.
unsafe impl Send for QueueMpmc {}
unsafe impl Sync for QueueMpmc {}

fn page_capacity() -> i16 {
    ((platform::page_size() - size_of::<NodePage>()) / size_of::<usize>()) as i16
}

fn alloc_node_page() -> *mut NodePage {
    let page = unsafe { platform::page_alloc(platform::page_size()) };
    if page.is_null() {
        fatal!("unable to map a node page for the mpmc queue");
    }
    // OS-zeroed: prev/next null, every slot 0 (empty).
    page as *mut NodePage
}

/// The slot array starts right after the page header.
///
/// # Safety
/// `page` must be a live node page and `index` in `0..nodes_per_page`.
unsafe fn node_slot<'a>(page: *mut NodePage, index: i16) -> &'a AtomicUsize {
    unsafe {
        let base = (page as *mut u8).add(size_of::<NodePage>()) as *const AtomicUsize;
        &*base.add(index as usize)
    }
}

impl Default for QueueMpmc {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueMpmc {
    pub fn new() -> Self {
        let first_page = alloc_node_page();
        Self {
            head: AtomicU128::new(pack(Head {
                page: first_page,
                index: -1,
                version: 0,
                length: 0,
            })),
            nodes_per_page: page_capacity(),
        }
    }

    /// Number of values in the queue. Approximate under contention, exact
    /// between updates.
    #[inline]
    pub fn len(&self) -> usize {
        unpack(self.head.load(Ordering::Acquire)).length as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push a nonzero value. Never fails: running out of node pages aborts
    /// the process.
    pub fn push(&self, value: usize) {
        debug_assert!(value != 0, "zero is the empty-slot sentinel");

        let mut fresh_page: *mut NodePage = ptr::null_mut();
        let mut cur = self.head.load(Ordering::Acquire);
        let (target_page, target_index);

        loop {
            let mut h = unpack(cur);

            // Current page full: advance to the next page, reusing a
            // previously chained one if it exists.
            if h.index == self.nodes_per_page - 1 {
                let next = unsafe { (*h.page).next.load(Ordering::Acquire) };
                if !next.is_null() {
                    h.page = next;
                } else {
                    if fresh_page.is_null() {
                        fresh_page = alloc_node_page();
                    }
                    // The back link must be in place before the CAS can
                    // publish the page.
                    unsafe { (*fresh_page).prev.store(h.page, Ordering::Release) };
                    h.page = fresh_page;
                }
                h.index = -1;
            }

            h.index += 1;
            h.length += 1;
            h.version = h.version.wrapping_add(1);

            match self.head.compare_exchange_weak(
                cur,
                pack(h),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    target_page = h.page;
                    target_index = h.index;
                    break;
                }
                Err(actual) => cur = actual,
            }
        }

        if !fresh_page.is_null() {
            if target_page == fresh_page {
                // Complete the chain so poppers can walk forward again.
                unsafe {
                    let prev = (*fresh_page).prev.load(Ordering::Acquire);
                    (*prev).next.store(fresh_page, Ordering::Release);
                }
            } else {
                // Lost the race to another pusher's page; ours was never
                // published.
                unsafe { platform::page_free(fresh_page as *mut u8, platform::page_size()) };
            }
        }

        // Publish the value. The slot may still hold the previous value of a
        // slow popper that claimed this index but has not cleared it yet;
        // wait for the zero.
        let slot = unsafe { node_slot(target_page, target_index) };
        loop {
            match slot.compare_exchange_weak(0, value, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(_) => spin_loop(),
            }
        }
    }

    /// Pop the most recently pushed value, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<usize> {
        let mut cur = self.head.load(Ordering::Acquire);
        let (read_page, read_index);

        loop {
            let h0 = unpack(cur);
            if h0.length == 0 {
                return None;
            }

            let mut h = h0;
            let claim_page = h.page;
            let claim_index = h.index;

            h.index -= 1;
            if h.index == -1 {
                let prev = unsafe { (*h.page).prev.load(Ordering::Acquire) };
                if !prev.is_null() {
                    h.page = prev;
                    h.index = self.nodes_per_page - 1;
                    // A pusher that follows us must find the forward link, or
                    // it would splice in a fresh page and orphan this one.
                    // Wait for the slow pusher that is still publishing it.
                    while unsafe { (*h.page).next.load(Ordering::Acquire) }.is_null() {
                        spin_loop();
                    }
                }
            }

            h.length = h0.length - 1;
            h.version = h0.version.wrapping_add(1);

            match self.head.compare_exchange_weak(
                cur,
                pack(h),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    read_page = claim_page;
                    read_index = claim_index;
                    break;
                }
                Err(actual) => cur = actual,
            }
        }

        // The pusher that claimed this slot may not have stored the value
        // yet; wait for it, then clear the slot for the next pusher.
        let slot = unsafe { node_slot(read_page, read_index) };
        loop {
            let observed = slot.load(Ordering::Acquire);
            if observed == 0 {
                spin_loop();
                continue;
            }
            if slot
                .compare_exchange_weak(observed, 0, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(observed);
            }
        }
    }

    /// Unmap every node page.
    ///
    /// # Safety
    ///
    /// No concurrent access: the caller guarantees the queue is quiescent and
    /// never used again.
    pub unsafe fn destroy(&self) {
        let head = unpack(self.head.load(Ordering::Acquire));
        let page_size = platform::page_size();

        // Pages chained after the head page, then the head page and
        // everything before it.
        unsafe {
            let mut page = (*head.page).next.load(Ordering::Acquire);
            while !page.is_null() {
                let next = (*page).next.load(Ordering::Acquire);
                platform::page_free(page as *mut u8, page_size);
                page = next;
            }

            let mut page = head.page;
            while !page.is_null() {
                let prev = (*page).prev.load(Ordering::Acquire);
                platform::page_free(page as *mut u8, page_size);
                page = prev;
            }
        }
    }
}
