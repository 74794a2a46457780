//! Thread cache: the per-thread array of size-class allocators.
//!
//! Lazily initialized on a thread's first allocation — one
//! [`ClassAllocator`] per configured class, all created together. A
//! zero-sized guard registered in the same TLS pass releases every allocator
//! when the thread exits; allocators with slots still held by other threads
//! defer their teardown to the last foreign freer.

use crate::class_alloc::ClassAllocator;
use crate::config::SIZE_CLASS_COUNT;
use crate::region_cache;
use crate::size_class;
use core::cell::UnsafeCell;
use core::ptr;

struct Slots {
    allocators: UnsafeCell<[*mut ClassAllocator; SIZE_CLASS_COUNT]>,
}

std::thread_local! {
    static THREAD_ALLOCATORS: Slots = const {
        Slots {
            allocators: UnsafeCell::new([ptr::null_mut(); SIZE_CLASS_COUNT]),
        }
    };
    static TEARDOWN: TeardownGuard = const { TeardownGuard };
}

struct TeardownGuard;

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        // The guard drops while THREAD_ALLOCATORS may already be gone on
        // some platforms; try_with covers both orders.
        let _ = THREAD_ALLOCATORS.try_with(|slots| {
            let allocators = unsafe { &mut *slots.allocators.get() };
            for sca in allocators.iter_mut() {
                if !sca.is_null() {
                    unsafe { ClassAllocator::release(*sca) };
                    *sca = ptr::null_mut();
                }
            }
        });
    }
}

/// Populate the whole array on first touch, one allocator per class.
#[cold]
#[inline(never)]
fn init_thread_allocators(allocators: &mut [*mut ClassAllocator; SIZE_CLASS_COUNT]) {
    let cache = region_cache::global();
    for (index, slot) in allocators.iter_mut().enumerate() {
        *slot = ClassAllocator::new(size_class::class_size(index), cache);
    }
    // Register the teardown guard after the array is live: if guard
    // registration itself allocates, the reentrant call finds a usable cache.
    let _ = TEARDOWN.try_with(|_| {});
}

/// This thread's allocator for `class_index`, creating the thread cache on
/// first use. Null during TLS teardown.
pub fn allocator_for_class(class_index: usize) -> *mut ClassAllocator {
    debug_assert!(class_index < SIZE_CLASS_COUNT);
    THREAD_ALLOCATORS
        .try_with(|slots| {
            let allocators = unsafe { &mut *slots.allocators.get() };
            if allocators[class_index].is_null() {
                init_thread_allocators(allocators);
            }
            allocators[class_index]
        })
        .unwrap_or(ptr::null_mut())
}

/// This thread's allocator for `class_index` if the thread cache exists,
/// without creating it. Null before first use and during TLS teardown.
pub fn existing_allocator_for_class(class_index: usize) -> *mut ClassAllocator {
    debug_assert!(class_index < SIZE_CLASS_COUNT);
    THREAD_ALLOCATORS
        .try_with(|slots| {
            let allocators = unsafe { &*slots.allocators.get() };
            allocators[class_index]
        })
        .unwrap_or(ptr::null_mut())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OBJECT_SIZES, SIZE_CLASS_COUNT};

    #[test]
    fn test_lazy_init_creates_all_classes() {
        let first = allocator_for_class(0);
        assert!(!first.is_null());
        for index in 0..SIZE_CLASS_COUNT {
            let sca = allocator_for_class(index);
            assert!(!sca.is_null());
            assert_eq!(unsafe { (*sca).object_size() }, OBJECT_SIZES[index]);
        }
    }

    #[test]
    fn test_same_allocator_within_thread() {
        let a = allocator_for_class(1);
        let b = allocator_for_class(1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_allocators_across_threads() {
        let mine = allocator_for_class(0) as usize;
        let theirs = std::thread::spawn(move || allocator_for_class(0) as usize)
            .join()
            .unwrap();
        assert_ne!(mine, theirs);
    }

    #[test]
    fn test_existing_does_not_create() {
        std::thread::spawn(|| {
            assert!(existing_allocator_for_class(0).is_null());
            let created = allocator_for_class(0);
            assert!(!created.is_null());
            assert_eq!(existing_allocator_for_class(0), created);
        })
        .join()
        .unwrap();
    }
}
