//! Public allocation entry points.
//!
//! Thin dispatch over the tiers: round the size up to a class, hand the
//! request to this thread's allocator for that class; on free, mask the
//! pointer to its slice header and route to the owning allocator — locally
//! when it is ours, through its return queue when it is not.
//!
//! Sizes above the largest class are not served: `allocate` returns null and
//! the caller falls back to a general-purpose allocator. Freeing a pointer
//! that did not come from `allocate` is undefined behavior (the region mask
//! would fabricate a slice header); null is a no-op.

use crate::class_alloc::ClassAllocator;
use crate::size_class;
use crate::slice;
use crate::thread_cache;
use crate::{hist_record, stat_add, stat_inc};
use core::ptr;

/// Allocate `size` bytes, served by the smallest class that fits. Returns
/// null when the OS is out of memory or `size` exceeds the largest class.
///
/// The pointer is aligned to the class size, up to one OS page.
pub fn allocate(size: usize) -> *mut u8 {
    let Some(class_index) = size_class::class_index(size) else {
        hist_record!(None);
        return ptr::null_mut();
    };
    hist_record!(Some(class_index));
    stat_inc!(alloc_count);
    stat_add!(alloc_bytes, size as u64);

    let sca = thread_cache::allocator_for_class(class_index);
    if sca.is_null() {
        // TLS is being torn down; nothing sane to serve from.
        return ptr::null_mut();
    }
    unsafe { ClassAllocator::allocate(sca) }
}

/// Allocate `size` bytes of zeroed memory.
pub fn allocate_zeroed(size: usize) -> *mut u8 {
    let ptr = allocate(size);
    if !ptr.is_null() && size > 0 {
        unsafe { ptr::write_bytes(ptr, 0, size) };
    }
    ptr
}

/// Reallocate `ptr` from `current_size` to `new_size` bytes.
///
/// Always allocates from the class fitting `new_size`, copies
/// `min(current_size, new_size)` bytes, optionally zeroes the grown tail,
/// and frees `ptr`. On failure returns null and leaves `ptr` live. A null
/// `ptr` behaves as a plain allocation.
pub fn reallocate(ptr: *mut u8, current_size: usize, new_size: usize, zero_new: bool) -> *mut u8 {
    stat_inc!(realloc_count);

    let new_ptr = allocate(new_size);
    if new_ptr.is_null() {
        return new_ptr;
    }

    let copied = if !ptr.is_null() {
        let copied = current_size.min(new_size);
        unsafe { ptr::copy_nonoverlapping(ptr, new_ptr, copied) };
        free(ptr);
        copied
    } else {
        0
    };

    if zero_new && new_size > copied {
        unsafe { ptr::write_bytes(new_ptr.add(copied), 0, new_size - copied) };
    }

    new_ptr
}

/// Free a pointer previously returned by [`allocate`]. Null is a no-op.
pub fn free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    stat_inc!(free_count);

    unsafe {
        let slice = slice::slice_from_ptr(ptr);
        let owner = (*slice).owner;
        debug_assert!(!owner.is_null());

        // Ownership is unconditional: the slot always goes back to the
        // allocator that issued it, locally when that allocator is this
        // thread's, through its return queue otherwise.
        if owner == thread_cache::existing_allocator_for_class((*owner).class_index()) {
            ClassAllocator::free_local(owner, ptr);
        } else {
            ClassAllocator::free_foreign(owner, ptr);
        }
    }
}
