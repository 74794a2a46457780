//! Size class table and lookup.
//!
//! Classes are the ascending powers of two from `fcmalloc.toml`; an
//! allocation is served by the smallest class that fits it. Requests below
//! the minimum class round up to it; requests above the maximum class are
//! not served here (the caller falls back to a general allocator).

use crate::config::{OBJECT_SIZE_MAX, OBJECT_SIZE_MIN, OBJECT_SIZES, SIZE_CLASS_COUNT};

/// Map an allocation size to its class index, or `None` for sizes above the
/// maximum class. Size 0 maps to the minimum class.
#[inline]
pub fn class_index(size: usize) -> Option<usize> {
    if size > OBJECT_SIZE_MAX {
        return None;
    }
    let rounded = size.max(OBJECT_SIZE_MIN).next_power_of_two();
    Some((rounded.trailing_zeros() - OBJECT_SIZE_MIN.trailing_zeros()) as usize)
}

/// Allocation size for a class index.
#[inline]
pub fn class_size(index: usize) -> usize {
    OBJECT_SIZES[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_maps_to_min_class() {
        assert_eq!(class_index(0), Some(0));
        assert_eq!(class_size(0), OBJECT_SIZE_MIN);
    }

    #[test]
    fn test_exact_sizes_round_trip() {
        for (i, &size) in OBJECT_SIZES.iter().enumerate() {
            assert_eq!(class_index(size), Some(i), "size {}", size);
            assert_eq!(class_size(i), size);
        }
    }

    #[test]
    fn test_rounds_up_to_next_class() {
        for i in 1..SIZE_CLASS_COUNT {
            let below = OBJECT_SIZES[i - 1] + 1;
            assert_eq!(class_index(below), Some(i), "size {}", below);
        }
    }

    #[test]
    fn test_below_min_served_by_min_class() {
        for size in 1..OBJECT_SIZE_MIN {
            assert_eq!(class_index(size), Some(0), "size {}", size);
        }
    }

    #[test]
    fn test_above_max_rejected() {
        assert_eq!(class_index(OBJECT_SIZE_MAX + 1), None);
        assert_eq!(class_index(usize::MAX / 2), None);
    }

    #[test]
    fn test_max_size_served_by_max_class() {
        assert_eq!(class_index(OBJECT_SIZE_MAX), Some(SIZE_CLASS_COUNT - 1));
    }
}
