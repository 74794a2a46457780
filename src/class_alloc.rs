//! Size-class allocator: the per-thread engine for one object size.
//!
//! Owns a list of slices carved from regions, a slot list (available slots
//! at the front, in-use at the back), and an MPMC return queue for slots
//! freed by other threads. The owning thread is the only one that touches
//! the lists; foreign threads interact only through the return queue and the
//! atomic flags/counters.
//!
//! Allocation order, fastest first: the slot list head, lazily initializing
//! a tranche of slots from the newest slice, draining the return queue, and
//! finally carving a new slice from a fresh region.

use crate::config::SLOT_PREINIT_BATCH;
use crate::list::{IntrusiveList, ListLinks};
use crate::queue_mpmc::QueueMpmc;
use crate::region_cache::RegionCache;
use crate::slice::{self, SliceHeader, SlotMeta};
use crate::stat_inc;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub struct Metrics {
    /// Slots handed out and not yet returned through the local free path.
    /// A slot parked in the return queue still counts: the world holds
    /// `objects_in_use - return_queue.len()` slots.
    pub objects_in_use: AtomicU32,
}

pub struct ClassAllocator {
    /// Every initialized slot's metadata; available slots accumulate at the
    /// front, in-use slots are parked at the back.
    slots: IntrusiveList,
    /// Owned slices; the most recently carved slice sits at the back and is
    /// the one with uninitialized slots left.
    slices: IntrusiveList,
    /// Slots freed by threads that do not own this allocator.
    return_queue: QueueMpmc,
    /// Region source, captured at construction.
    region_cache: &'static RegionCache,
    object_size: usize,
    class_index: usize,
    /// The owning thread has terminated; the last foreign freer finishes
    /// teardown.
    released: AtomicBool,
    /// Single-winner gate for the destructive phase of teardown.
    teardown_claimed: AtomicBool,
    metrics: Metrics,
}

impl ClassAllocator {
    /// Allocate a new engine for `object_size`, drawing regions from
    /// `region_cache`. The record lives until [`ClassAllocator::release`]
    /// succeeds.
    pub fn new(object_size: usize, region_cache: &'static RegionCache) -> *mut ClassAllocator {
        let class_index = crate::size_class::class_index(object_size);
        let class_index = match class_index {
            Some(index) if crate::size_class::class_size(index) == object_size => index,
            _ => panic!("object_size {} is not a configured size class", object_size),
        };
        Box::into_raw(Box::new(ClassAllocator {
            slots: IntrusiveList::new(),
            slices: IntrusiveList::new(),
            return_queue: QueueMpmc::new(),
            region_cache,
            object_size,
            class_index,
            released: AtomicBool::new(false),
            teardown_claimed: AtomicBool::new(false),
            metrics: Metrics {
                objects_in_use: AtomicU32::new(0),
            },
        }))
    }

    #[inline]
    pub fn object_size(&self) -> usize {
        self.object_size
    }

    #[inline]
    pub fn class_index(&self) -> usize {
        self.class_index
    }

    #[inline]
    pub fn objects_in_use(&self) -> u32 {
        self.metrics.objects_in_use.load(Ordering::Acquire)
    }

    #[inline]
    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    #[inline]
    pub fn return_queue_len(&self) -> usize {
        self.return_queue.len()
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Slots the world still holds: in-use minus those already parked in the
    /// return queue.
    fn outstanding(&self) -> i64 {
        self.metrics.objects_in_use.load(Ordering::Acquire) as i64
            - self.return_queue.len() as i64
    }

    /// Initialize up to one tranche of slots from `slice`, pushing each onto
    /// the front of the slot list.
    unsafe fn init_slot_batch(&mut self, slice: *mut SliceHeader) {
        unsafe {
            let start = (*slice).slots_initialized;
            let end = (start + SLOT_PREINIT_BATCH).min((*slice).slots_total);
            for index in start..end {
                let slot = slice::slot_meta_at(slice, index as usize);
                (*slot).available = true;
                (*slot).data_ptr = (*slice).data_addr.add(index as usize * self.object_size);
                #[cfg(debug_assertions)]
                {
                    (*slot).allocs = 0;
                    (*slot).frees = 0;
                }
                self.slots.push_front(slot as *mut ListLinks);
                (*slice).slots_initialized += 1;
            }
        }
    }

    /// Carve `region` into a new slice and seed the slot list with its first
    /// tranche.
    unsafe fn grow(&mut self, region: *mut u8) {
        unsafe {
            let slice = SliceHeader::init(region, self as *mut ClassAllocator, self.object_size);
            (*slice).available = false;
            self.init_slot_batch(slice);
            self.slices.push_back(slice as *mut ListLinks);
            stat_inc!(slices_carved);
        }
    }

    /// Unlink an empty slice and hand its region back to the region cache.
    unsafe fn retire_slice(&mut self, slice: *mut SliceHeader) {
        unsafe {
            debug_assert_eq!((*slice).slots_in_use, 0);
            // Only initialized slots ever entered the slot list.
            for index in 0..(*slice).slots_initialized {
                let slot = slice::slot_meta_at(slice, index as usize);
                self.slots.remove(slot as *mut ListLinks);
            }
            (*slice).available = true;
            self.slices.remove(slice as *mut ListLinks);
            stat_inc!(slices_retired);
            self.region_cache.push((*slice).region_addr);
        }
    }

    /// Allocate one slot and return its data pointer, or null when no region
    /// can be obtained.
    ///
    /// # Safety
    ///
    /// Must be called on the owning thread; `sca` must be live.
    pub unsafe fn allocate(sca: *mut ClassAllocator) -> *mut u8 {
        unsafe {
            let this = &mut *sca;
            let mut slot = this.slots.head() as *mut SlotMeta;

            if slot.is_null() || !(*slot).available {
                // The newest slice is the only one that can still hold
                // uninitialized slots.
                let newest = this.slices.tail() as *mut SliceHeader;
                if !newest.is_null() && (*newest).slots_initialized < (*newest).slots_total {
                    this.init_slot_batch(newest);
                    slot = this.slots.head() as *mut SlotMeta;
                    debug_assert!(!slot.is_null() && (*slot).available);
                } else if let Some(raw) = this.return_queue.pop() {
                    // A slot coming back from another thread is still charged
                    // to this allocator's counters (the foreign free never
                    // decremented them), so hand it out as-is.
                    let slot = raw as *mut SlotMeta;
                    debug_assert!(!(*slot).data_ptr.is_null());
                    (*slot).available = false;
                    #[cfg(debug_assertions)]
                    {
                        (*slot).allocs += 1;
                    }
                    stat_inc!(return_queue_drains);
                    return (*slot).data_ptr;
                }

                if slot.is_null() || !(*slot).available {
                    let region = this.region_cache.pop();
                    if region.is_null() {
                        log::error!(
                            "unable to allocate {} bytes of memory, no region available",
                            this.object_size
                        );
                        return ptr::null_mut();
                    }
                    this.grow(region);
                    slot = this.slots.head() as *mut SlotMeta;
                }
            }

            debug_assert!(!(*slot).data_ptr.is_null());
            #[cfg(debug_assertions)]
            debug_assert_eq!((*slot).allocs, (*slot).frees);

            // Park the now in-use slot at the back of the list.
            this.slots.move_to_back(slot as *mut ListLinks);

            let slice = slice::slice_from_ptr((*slot).data_ptr);
            (*slice).slots_in_use += 1;
            this.metrics.objects_in_use.fetch_add(1, Ordering::Release);

            (*slot).available = false;
            #[cfg(debug_assertions)]
            {
                (*slot).allocs += 1;
            }

            (*slot).data_ptr
        }
    }

    /// Return a slot on the owning thread. Retires the slice when its last
    /// in-use slot comes back.
    ///
    /// # Safety
    ///
    /// Must be called on the owning thread (or during teardown, by the single
    /// release winner); `ptr` must be an in-use slot of this allocator.
    pub unsafe fn free_local(sca: *mut ClassAllocator, ptr: *mut u8) {
        unsafe {
            let this = &mut *sca;
            let slice = slice::slice_from_ptr(ptr);
            let slot = slice::slot_from_ptr(slice, this.object_size, ptr);

            debug_assert!(!(*slot).available, "double free of {:p}", ptr);
            #[cfg(debug_assertions)]
            {
                (*slot).frees += 1;
            }

            (*slice).slots_in_use -= 1;
            this.metrics.objects_in_use.fetch_sub(1, Ordering::Release);

            (*slot).available = true;
            this.slots.move_to_front(slot as *mut ListLinks);

            if (*slice).slots_in_use == 0 {
                this.retire_slice(slice);
            }
        }
    }

    /// Return a slot from a thread that does not own this allocator: park it
    /// on the return queue, and finish teardown if the owner has already
    /// released and this was the last outstanding slot.
    ///
    /// # Safety
    ///
    /// `ptr` must be an in-use slot of this allocator; `sca` stays live until
    /// its last outstanding slot is returned, which this call may be.
    pub unsafe fn free_foreign(sca: *mut ClassAllocator, ptr: *mut u8) {
        unsafe {
            let object_size = (*sca).object_size;
            let slice = slice::slice_from_ptr(ptr);
            let slot = slice::slot_from_ptr(slice, object_size, ptr);

            debug_assert!(!(*slot).available, "double free of {:p}", ptr);
            #[cfg(debug_assertions)]
            {
                (*slot).frees += 1;
            }

            stat_inc!(free_cross_thread_count);
            (*sca).return_queue.push(slot as usize);

            // The owner may be gone; the thread returning the last slot
            // finishes the teardown it deferred.
            if (*sca).released.load(Ordering::Acquire) && (*sca).outstanding() == 0 {
                ClassAllocator::release(sca);
            }
        }
    }

    /// Release the allocator. Marks it released; if slots are still held
    /// somewhere, teardown is deferred to the last foreign freer and `false`
    /// is returned. Otherwise drains the return queue, hands every region
    /// back to the region cache, and destroys the queue's node pages.
    ///
    /// The record itself is quarantined, not freed: a foreign freer that
    /// lost the teardown race may still read `released` and the counters
    /// after its push, so the three-pointer record must stay readable. All
    /// bulk memory (regions, queue pages) is reclaimed.
    ///
    /// # Safety
    ///
    /// Called by the owning thread at exit, or by the foreign freer that
    /// returned the last outstanding slot. After a `true` return only the
    /// atomic flags and counters of `sca` may be read.
    pub unsafe fn release(sca: *mut ClassAllocator) -> bool {
        unsafe {
            (*sca).released.store(true, Ordering::Release);

            if (*sca).outstanding() > 0 {
                return false;
            }

            // Exactly one caller runs the destructive phase; a racing owner
            // exit and last foreign free both reach this point.
            if (*sca).teardown_claimed.swap(true, Ordering::AcqRel) {
                return false;
            }

            // No thread holds a slot anymore, so nothing new can be pushed;
            // drain stragglers through the local free path (this retires
            // their slices as they empty).
            while let Some(raw) = (*sca).return_queue.pop() {
                let slot = raw as *mut SlotMeta;
                let data_ptr = (*slot).data_ptr;
                ClassAllocator::free_local(sca, data_ptr);
            }

            // Only never-used slices can remain; hand their regions back.
            let mut item = (*sca).slices.head();
            while !item.is_null() {
                let next = (*item).next;
                let slice = item as *mut SliceHeader;
                (*sca).region_cache.push((*slice).region_addr);
                item = next;
            }

            (*sca).return_queue.destroy();
            true
        }
    }
}
