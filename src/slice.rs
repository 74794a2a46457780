//! Slice layout: a region carved for one size class.
//!
//! Layout inside a region, in order: the 64-byte slice header, the slot
//! metadata array, padding up to an OS page boundary, then the data area.
//! Regions are size-aligned on `REGION_SIZE`, so masking any data pointer
//! recovers the header; that bijection is load-bearing for `free`.
//!
//! Slot metadata records embed their free-list links at offset zero (see
//! [`crate::list`]); the data pointer doubles as the record's payload when
//! the slot sits on the free list.

use crate::class_alloc::ClassAllocator;
use crate::config::REGION_SIZE;
use crate::list::ListLinks;
use static_assertions::const_assert_eq;

/// Metadata for one slot. Exactly 32 bytes in release builds; debug builds
/// add per-slot alloc/free counters and pad to 64.
#[repr(C)]
#[cfg_attr(debug_assertions, repr(align(64)))]
pub struct SlotMeta {
    /// Free-list links; offset 0 so a `*mut SlotMeta` is the list item.
    pub links: ListLinks,
    /// Address of this slot's storage in the data area.
    pub data_ptr: *mut u8,
    /// On the free list (or still uninitialized zero-memory) vs handed out.
    pub available: bool,
    #[cfg(debug_assertions)]
    pub allocs: u32,
    #[cfg(debug_assertions)]
    pub frees: u32,
}

#[cfg(not(debug_assertions))]
const_assert_eq!(size_of::<SlotMeta>(), 32);
#[cfg(debug_assertions)]
const_assert_eq!(size_of::<SlotMeta>(), 64);

/// Header at the base of every slice, one cache line.
#[repr(C, align(64))]
pub struct SliceHeader {
    /// Slice-list links; offset 0 so a `*mut SliceHeader` is the list item.
    pub links: ListLinks,
    /// Owning size-class allocator; set once at carve time, read by any
    /// thread that frees into this slice.
    pub owner: *mut ClassAllocator,
    /// Base address of the region (== the address of this header).
    pub region_addr: *mut u8,
    /// Base address of the data area.
    pub data_addr: *mut u8,
    pub slots_total: u32,
    pub slots_initialized: u32,
    pub slots_in_use: u32,
    /// No slot in use; the slice could be handed back to the region cache.
    pub available: bool,
}

const_assert_eq!(size_of::<SliceHeader>(), 64);
const_assert_eq!(align_of::<SliceHeader>(), 64);

/// Bytes of a region usable for slot metadata and data: the region minus the
/// header and one reserved page at the end.
#[inline]
pub fn usable_size(page_size: usize) -> usize {
    REGION_SIZE - page_size - size_of::<SliceHeader>()
}

/// Offset of the data area from the region base: header plus metadata for as
/// many slots as could naively fit, rounded up to a page boundary.
#[inline]
pub fn data_offset(usable: usize, page_size: usize, object_size: usize) -> usize {
    let raw_slots = usable / (object_size + size_of::<SlotMeta>());
    let offset = size_of::<SliceHeader>() + raw_slots * size_of::<SlotMeta>();
    offset.next_multiple_of(page_size)
}

/// Slots that actually fit once the data offset is fixed.
#[inline]
pub fn slots_total(usable: usize, data_offset: usize, object_size: usize) -> usize {
    (usable - data_offset + size_of::<SliceHeader>()) / object_size
}

/// Recover the slice header from any pointer into its region.
///
/// # Safety
///
/// `ptr` must point into a live region obtained from the region cache and
/// carved by [`SliceHeader::init`].
#[inline]
pub unsafe fn slice_from_ptr(ptr: *mut u8) -> *mut SliceHeader {
    ((ptr as usize) & !(REGION_SIZE - 1)) as *mut SliceHeader
}

/// Slot metadata record at `index`, right after the header.
///
/// # Safety
///
/// `slice` must be a carved slice and `index < slots_total`.
#[inline]
pub unsafe fn slot_meta_at(slice: *mut SliceHeader, index: usize) -> *mut SlotMeta {
    unsafe { ((slice as *mut u8).add(size_of::<SliceHeader>()) as *mut SlotMeta).add(index) }
}

/// Slot metadata for a data pointer, via its index in the data area.
///
/// # Safety
///
/// `ptr` must be a slot data pointer previously issued from `slice`, and
/// `object_size` the slice's class size.
#[inline]
pub unsafe fn slot_from_ptr(
    slice: *mut SliceHeader,
    object_size: usize,
    ptr: *mut u8,
) -> *mut SlotMeta {
    unsafe {
        let index = (ptr as usize - (*slice).data_addr as usize) / object_size;
        slot_meta_at(slice, index)
    }
}

impl SliceHeader {
    /// Carve a fresh (or recycled) region into a slice for `object_size`.
    /// Slot metadata is left untouched; slots are initialized lazily in
    /// batches as the allocator grows into the slice.
    ///
    /// # Safety
    ///
    /// `region` must be a live, `REGION_SIZE`-aligned region owned by the
    /// caller; `owner` must outlive the slice.
    pub unsafe fn init(
        region: *mut u8,
        owner: *mut ClassAllocator,
        object_size: usize,
    ) -> *mut SliceHeader {
        debug_assert_eq!(region as usize & (REGION_SIZE - 1), 0);

        let page_size = crate::platform::page_size();
        let usable = usable_size(page_size);
        let offset = data_offset(usable, page_size, object_size);
        let total = slots_total(usable, offset, object_size);

        let slice = region as *mut SliceHeader;
        unsafe {
            (*slice).links = ListLinks::new();
            (*slice).owner = owner;
            (*slice).region_addr = region;
            (*slice).data_addr = region.add(offset);
            (*slice).slots_total = total as u32;
            (*slice).slots_initialized = 0;
            (*slice).slots_in_use = 0;
            (*slice).available = true;
        }
        slice
    }
}
