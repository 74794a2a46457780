//! fcmalloc: a thread-caching, fixed-size-class memory allocator.
//!
//! Built for an in-memory key/value server whose load is dominated by small
//! objects allocated and freed across many worker threads. Three tiers:
//! - Region cache (process-wide, per NUMA node): pools of 8 MiB size-aligned
//!   regions, mapped at chosen virtual addresses
//! - Size-class allocators (per thread, per class): carve regions into
//!   slices and slices into slots, lock-free cross-thread returns
//! - Thread cache: the per-thread array of class allocators, torn down on
//!   thread exit
//!
//! # Usage
//!
//! ```ignore
//! let p = fcmalloc::allocate(64);
//! assert!(!p.is_null());
//! fcmalloc::free(p);
//! ```
//!
//! Sizes above the largest configured class are not served — `allocate`
//! returns null and the caller falls back to a general-purpose allocator.
//! Size classes and region parameters are fixed at build time via
//! `fcmalloc.toml`.

pub mod allocator;
pub mod class_alloc;
pub mod config;
#[cfg(feature = "alloc-histogram")]
pub mod histogram;
pub mod list;
mod macros;
pub mod numa;
pub mod platform;
pub mod queue_mpmc;
pub mod region_cache;
pub mod size_class;
pub mod slice;
pub mod stats;
pub mod thread_cache;

// Re-export the allocation API at the crate root for convenience
pub use allocator::{allocate, allocate_zeroed, free, reallocate};
